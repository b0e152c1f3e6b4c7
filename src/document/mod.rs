//! Course document parsing
//!
//! Course materials arrive as plain text with a fixed header followed by
//! lesson-marked content:
//!
//! ```text
//! Course Title: Intro to X
//! Course Link: https://example.com/x
//! Course Instructor: A. Smith
//!
//! Lesson 1: Basics
//! Lesson Link: https://example.com/x/1
//! Body text of the first lesson...
//! ```


use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use fancy_regex::Regex;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

static HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^course\s+(title|link|instructor)\s*:\s*(.*)$").expect("regex is valid")
});

static LESSON_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^lesson\s+(\d+)\s*:\s*(.*)$").expect("regex is valid"));

static LESSON_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^lesson\s+link\s*:\s*(\S.*)$").expect("regex is valid"));

pub const FIELD_TITLE: &str = "Course Title";
pub const FIELD_LINK: &str = "Course Link";
pub const FIELD_INSTRUCTOR: &str = "Course Instructor";

/// Errors raised while turning a raw course document into a [`Course`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing required header field '{0}'")]
    MissingField(&'static str),
    #[error("document contains no 'Lesson <N>: <title>' markers")]
    NoLessons,
    #[error("lesson {0} appears more than once")]
    DuplicateLesson(u32),
    #[error("failed to read {}: {message}", path.display())]
    Read { path: PathBuf, message: String },
}

/// A single lesson within a course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub lesson_number: u32,
    pub title: String,
    pub lesson_link: Option<String>,
}

/// Course metadata; the title is the unique key across both indexes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub title: String,
    pub course_link: String,
    pub instructor: String,
    pub lessons: Vec<Lesson>,
}

/// Raw body text of one lesson, as found between lesson markers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonBody {
    pub lesson_number: u32,
    pub content: String,
}

/// A parsed document: course metadata plus the lesson bodies to chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCourse {
    pub course: Course,
    pub lesson_bodies: Vec<LessonBody>,
}

impl Course {
    /// Look up a lesson by its number
    #[inline]
    pub fn lesson(&self, lesson_number: u32) -> Option<&Lesson> {
        self.lessons
            .iter()
            .find(|lesson| lesson.lesson_number == lesson_number)
    }

    /// Text embedded into the catalog index for fuzzy name resolution
    #[inline]
    pub fn catalog_document(&self) -> String {
        let lesson_titles = self.lessons.iter().map(|l| l.title.as_str()).join("; ");
        format!(
            "{}\nInstructor: {}\nLessons: {}",
            self.title, self.instructor, lesson_titles
        )
    }
}

/// Parse a course document from its text contents
#[inline]
pub fn parse_course_document(text: &str) -> Result<ParsedCourse, ParseError> {
    let mut title: Option<String> = None;
    let mut course_link: Option<String> = None;
    let mut instructor: Option<String> = None;

    let mut lessons: Vec<Lesson> = Vec::new();
    let mut lesson_bodies: Vec<LessonBody> = Vec::new();
    let mut current: Option<(Lesson, Vec<&str>)> = None;
    let mut expect_lesson_link = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some((lesson_number, lesson_title)) = match_lesson_marker(trimmed) {
            if let Some(finished) = current.take() {
                finish_lesson(finished, &mut lessons, &mut lesson_bodies)?;
            }
            current = Some((
                Lesson {
                    lesson_number,
                    title: lesson_title,
                    lesson_link: None,
                },
                Vec::new(),
            ));
            expect_lesson_link = true;
            continue;
        }

        match current.as_mut() {
            None => {
                // Preamble: only header fields matter, anything else is ignored
                if let Some((field, value)) = match_header(trimmed) {
                    let slot = match field.as_str() {
                        "title" => &mut title,
                        "link" => &mut course_link,
                        _ => &mut instructor,
                    };
                    if slot.is_none() && !value.is_empty() {
                        *slot = Some(value);
                    }
                }
            }
            Some((lesson, body)) => {
                if expect_lesson_link {
                    expect_lesson_link = false;
                    if let Some(link) = match_lesson_link(trimmed) {
                        lesson.lesson_link = Some(link);
                        continue;
                    }
                }
                body.push(line);
            }
        }
    }

    if let Some(finished) = current.take() {
        finish_lesson(finished, &mut lessons, &mut lesson_bodies)?;
    }

    let title = title.ok_or(ParseError::MissingField(FIELD_TITLE))?;
    let course_link = course_link.ok_or(ParseError::MissingField(FIELD_LINK))?;
    let instructor = instructor.ok_or(ParseError::MissingField(FIELD_INSTRUCTOR))?;

    if lessons.is_empty() {
        return Err(ParseError::NoLessons);
    }

    debug!(
        "Parsed course '{}' with {} lessons",
        title,
        lessons.len()
    );

    Ok(ParsedCourse {
        course: Course {
            title,
            course_link,
            instructor,
            lessons,
        },
        lesson_bodies,
    })
}

/// Read and parse a course document from disk
#[inline]
pub async fn load_course_file(path: &Path) -> Result<ParsedCourse, ParseError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| ParseError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let text = String::from_utf8(bytes).map_err(|_| ParseError::Read {
        path: path.to_path_buf(),
        message: "file is not valid UTF-8 text".to_string(),
    })?;

    parse_course_document(&text)
}

fn finish_lesson(
    (lesson, body): (Lesson, Vec<&str>),
    lessons: &mut Vec<Lesson>,
    lesson_bodies: &mut Vec<LessonBody>,
) -> Result<(), ParseError> {
    if lessons
        .iter()
        .any(|existing| existing.lesson_number == lesson.lesson_number)
    {
        return Err(ParseError::DuplicateLesson(lesson.lesson_number));
    }

    lesson_bodies.push(LessonBody {
        lesson_number: lesson.lesson_number,
        content: body.join("\n").trim().to_string(),
    });
    lessons.push(lesson);
    Ok(())
}

fn match_header(line: &str) -> Option<(String, String)> {
    let captures = HEADER_REGEX.captures(line).ok().flatten()?;
    let field = captures.get(1)?.as_str().to_lowercase();
    let value = captures.get(2)?.as_str().trim().to_string();
    Some((field, value))
}

fn match_lesson_marker(line: &str) -> Option<(u32, String)> {
    let captures = LESSON_REGEX.captures(line).ok().flatten()?;
    let number = captures.get(1)?.as_str().parse().ok()?;
    let title = captures.get(2)?.as_str().trim().to_string();
    Some((number, title))
}

fn match_lesson_link(line: &str) -> Option<String> {
    let captures = LESSON_LINK_REGEX.captures(line).ok().flatten()?;
    Some(captures.get(1)?.as_str().trim().to_string())
}
