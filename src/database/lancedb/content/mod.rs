
use arrow::array::{StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    VectorTable, collect_batches, escape_literal, similarity_scores, string_column, u32_column,
    vector_array, vector_field,
};
use crate::embeddings::{CourseChunk, Embedder};
use crate::{RagError, Result};

pub const CONTENT_TABLE: &str = "course_content";

/// One chunk returned by a content search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub course_title: String,
    pub lesson_number: u32,
    /// `1 - cosine distance`; higher is more relevant
    pub score: f32,
}

/// Hits ordered by descending relevance; empty is a valid outcome
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

/// Chunk embeddings with course and lesson metadata
pub struct ContentIndex {
    table: VectorTable,
    embedder: Arc<dyn Embedder>,
    lock: RwLock<()>,
}

impl ContentIndex {
    #[inline]
    pub fn new(connection: Connection, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            table: VectorTable::new(connection, CONTENT_TABLE),
            embedder,
            lock: RwLock::new(()),
        }
    }

    fn schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            vector_field(dimension),
            Field::new("course_title", DataType::Utf8, false),
            Field::new("lesson_number", DataType::UInt32, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    fn course_filter(title: &str) -> String {
        format!("course_title = '{}'", escape_literal(title))
    }

    fn build_filter(course_title: Option<&str>, lesson_number: Option<u32>) -> Option<String> {
        let mut clauses = Vec::new();
        if let Some(title) = course_title {
            clauses.push(Self::course_filter(title));
        }
        if let Some(lesson) = lesson_number {
            clauses.push(format!("lesson_number = {}", lesson));
        }
        (!clauses.is_empty()).then(|| clauses.join(" AND "))
    }

    async fn embed_chunks(&self, chunks: &[CourseChunk]) -> Result<RecordBatch> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let vectors = vector_array(&vectors)?;
        let schema = Self::schema(vectors.value_length() as usize);
        let created_at = chrono::Utc::now().to_rfc3339();

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from_iter_values(
                    chunks.iter().map(|_| uuid::Uuid::new_v4().to_string()),
                )),
                Arc::new(vectors),
                Arc::new(StringArray::from_iter_values(
                    chunks.iter().map(|c| c.course_title.as_str()),
                )),
                Arc::new(UInt32Array::from_iter_values(
                    chunks.iter().map(|c| c.lesson_number),
                )),
                Arc::new(UInt32Array::from_iter_values(
                    chunks.iter().map(|c| c.chunk_index),
                )),
                Arc::new(StringArray::from_iter_values(
                    chunks.iter().map(|c| c.content.as_str()),
                )),
                Arc::new(StringArray::from_iter_values(
                    chunks.iter().map(|_| created_at.as_str()),
                )),
            ],
        )
        .map_err(|e| RagError::SearchIndex(format!("Failed to create record batch: {}", e)))
    }

    /// Append chunks to the index
    #[inline]
    pub async fn add_chunks(&self, chunks: &[CourseChunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let batch = self.embed_chunks(chunks).await?;

        let _guard = self.lock.write().await;
        let table = self.table.open_or_create(batch.schema()).await?;
        self.table.add(&table, batch).await?;

        info!("Indexed {} chunks", chunks.len());
        Ok(chunks.len())
    }

    /// Swap every chunk of one course for `chunks` in a single write
    #[inline]
    pub async fn replace_course(&self, course_title: &str, chunks: &[CourseChunk]) -> Result<usize> {
        let batch = if chunks.is_empty() {
            None
        } else {
            Some(self.embed_chunks(chunks).await?)
        };

        let _guard = self.lock.write().await;
        self.table.delete(&Self::course_filter(course_title)).await?;
        if let Some(batch) = batch {
            let table = self.table.open_or_create(batch.schema()).await?;
            self.table.add(&table, batch).await?;
        }

        info!(
            "Indexed {} chunks for course '{}'",
            chunks.len(),
            course_title
        );
        Ok(chunks.len())
    }

    /// Nearest chunks to `query_text`, optionally restricted to a course and lesson
    #[inline]
    pub async fn query(
        &self,
        query_text: &str,
        course_title: Option<&str>,
        lesson_number: Option<u32>,
        max_results: usize,
    ) -> Result<SearchResults> {
        let vector = self
            .embedder
            .embed_one(query_text)
            .await
            .map_err(|e| RagError::SearchIndex(format!("Failed to embed query: {:#}", e)))?;

        let _guard = self.lock.read().await;
        let Some(table) = self.table.open().await? else {
            debug!("Content index is empty");
            return Ok(SearchResults::default());
        };

        let mut search = table
            .vector_search(vector)
            .map_err(|e| RagError::SearchIndex(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .select(Select::columns(&["course_title", "lesson_number", "content"]))
            .limit(max_results);

        if let Some(filter) = Self::build_filter(course_title, lesson_number) {
            debug!("Applying content filter: {}", filter);
            search = search.only_if(filter);
        }

        let stream = search
            .execute()
            .await
            .map_err(|e| RagError::SearchIndex(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        for batch in collect_batches(stream).await? {
            let titles = string_column(&batch, "course_title")?;
            let lessons = u32_column(&batch, "lesson_number")?;
            let contents = string_column(&batch, "content")?;
            let scores = similarity_scores(&batch);

            for (row, score) in scores.into_iter().enumerate() {
                hits.push(SearchHit {
                    content: contents.value(row).to_string(),
                    course_title: titles.value(row).to_string(),
                    lesson_number: lessons.value(row),
                    score,
                });
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(max_results);

        debug!("Content search returned {} hits", hits.len());
        Ok(SearchResults { hits })
    }

    /// Total number of stored chunks
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        let _guard = self.lock.read().await;
        self.table.count(None).await
    }

    #[inline]
    pub async fn course_chunk_count(&self, course_title: &str) -> Result<usize> {
        let _guard = self.lock.read().await;
        self.table
            .count(Some(Self::course_filter(course_title)))
            .await
    }

    #[inline]
    pub async fn remove_course(&self, course_title: &str) -> Result<()> {
        let _guard = self.lock.write().await;
        self.table.delete(&Self::course_filter(course_title)).await
    }

    #[inline]
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.write().await;
        self.table.drop_if_exists().await
    }
}
