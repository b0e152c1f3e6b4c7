
use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::ParsedCourse;

/// Sentence terminator followed by whitespace, skipping `e.g.`-style and
/// `Dr.`-style abbreviations
static SENTENCE_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?<!\w\.\w.)(?<![A-Z][a-z]\.)(?<=[.!?])\s+").expect("regex is valid")
});

/// A chunk of lesson content ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseChunk {
    /// Chunk text, prefixed with its course and lesson context
    pub content: String,
    /// Title of the course this chunk came from
    pub course_title: String,
    /// Lesson the chunk was cut from
    pub lesson_number: u32,
    /// Position of the chunk within its course
    pub chunk_index: u32,
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Characters of trailing sentences repeated at the start of the next chunk
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

/// Context string placed in front of every chunk so it stands on its own
#[inline]
pub fn context_prefix(course_title: &str, lesson_number: u32) -> String {
    format!("Course {} Lesson {} content:", course_title, lesson_number)
}

/// Chunk every lesson of a parsed course; chunk indices keep counting across lessons
#[inline]
pub fn chunk_course(parsed: &ParsedCourse, config: &ChunkingConfig) -> Vec<CourseChunk> {
    let mut chunks = Vec::new();

    for body in &parsed.lesson_bodies {
        let lesson_chunks = chunk_lesson(
            &body.content,
            &parsed.course.title,
            body.lesson_number,
            config,
        );
        chunks.extend(lesson_chunks);
    }

    for (index, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = index as u32;
    }

    debug!(
        "Chunked course '{}' into {} chunks across {} lessons",
        parsed.course.title,
        chunks.len(),
        parsed.lesson_bodies.len()
    );

    chunks
}

/// Chunk the body text of a single lesson
#[inline]
pub fn chunk_lesson(
    text: &str,
    course_title: &str,
    lesson_number: u32,
    config: &ChunkingConfig,
) -> Vec<CourseChunk> {
    let prefix = context_prefix(course_title, lesson_number);

    chunk_text(text, config)
        .into_iter()
        .enumerate()
        .map(|(index, body)| CourseChunk {
            content: format!("{} {}", prefix, body),
            course_title: course_title.to_string(),
            lesson_number,
            chunk_index: index as u32,
        })
        .collect()
}

/// Split text into sentence-aligned windows of at most `chunk_size` characters
///
/// A sentence longer than `chunk_size` becomes a chunk of its own. Each chunk
/// after the first starts with the trailing sentences of its predecessor that
/// fit within `chunk_overlap` characters.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let sentences = split_sentences(text);
    let lengths: Vec<usize> = sentences.iter().map(|s| s.chars().count()).collect();

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < sentences.len() {
        // Greedily take sentences until the next one would overflow the window
        let mut end = start;
        let mut size = 0;
        while end < sentences.len() {
            let addition = lengths[end] + usize::from(end > start);
            if end > start && size + addition > config.chunk_size {
                break;
            }
            size += addition;
            end += 1;
        }

        chunks.push(sentences[start..end].join(" "));

        if end == sentences.len() {
            break;
        }

        let overlap = overlap_sentence_count(&lengths[start..end], config.chunk_overlap);
        start = (end - overlap).max(start + 1);
    }

    chunks
}

/// Split text into sentences after collapsing all whitespace runs
#[inline]
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let mut last = 0;
    for boundary in SENTENCE_BOUNDARY.find_iter(&normalized).flatten() {
        push_sentence(&mut sentences, &normalized[last..boundary.start()]);
        last = boundary.end();
    }
    push_sentence(&mut sentences, &normalized[last..]);

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, candidate: &str) {
    let sentence = candidate.trim();
    if !sentence.is_empty() {
        sentences.push(sentence.to_string());
    }
}

/// Number of trailing sentences whose joined length fits in `overlap` characters
fn overlap_sentence_count(window: &[usize], overlap: usize) -> usize {
    let mut size = 0;
    let mut count = 0;

    for (position, length) in window.iter().enumerate().rev() {
        let addition = length + usize::from(position + 1 < window.len());
        if size + addition > overlap {
            break;
        }
        size += addition;
        count += 1;
    }

    count
}
