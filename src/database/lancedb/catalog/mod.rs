
use arrow::array::{StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    VectorTable, collect_batches, escape_literal, similarity_scores, string_column, u32_column,
    vector_array, vector_field,
};
use crate::document::{Course, Lesson};
use crate::embeddings::Embedder;
use crate::{RagError, Result};

pub const CATALOG_TABLE: &str = "course_catalog";

/// One row per course: metadata plus an embedding of its catalog document
pub struct CatalogIndex {
    table: VectorTable,
    embedder: Arc<dyn Embedder>,
    lock: RwLock<()>,
}

impl CatalogIndex {
    #[inline]
    pub fn new(connection: Connection, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            table: VectorTable::new(connection, CATALOG_TABLE),
            embedder,
            lock: RwLock::new(()),
        }
    }

    fn schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("title", DataType::Utf8, false),
            Field::new("instructor", DataType::Utf8, false),
            Field::new("course_link", DataType::Utf8, false),
            Field::new("lessons_json", DataType::Utf8, false),
            Field::new("lesson_count", DataType::UInt32, false),
            Field::new("document", DataType::Utf8, false),
            vector_field(dimension),
        ]))
    }

    fn title_filter(title: &str) -> String {
        format!("title = '{}'", escape_literal(title))
    }

    /// Store a course, replacing any existing entry with the same title
    #[inline]
    pub async fn add_course(&self, course: &Course) -> Result<()> {
        let document = course.catalog_document();
        let vector = self
            .embedder
            .embed_one(&document)
            .await
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let lessons_json = serde_json::to_string(&course.lessons)
            .map_err(|e| RagError::SearchIndex(format!("Failed to encode lessons: {}", e)))?;
        let vectors = vector_array(&[vector])?;
        let dimension = vectors.value_length() as usize;
        let schema = Self::schema(dimension);

        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(StringArray::from(vec![course.title.as_str()])),
                Arc::new(StringArray::from(vec![course.instructor.as_str()])),
                Arc::new(StringArray::from(vec![course.course_link.as_str()])),
                Arc::new(StringArray::from(vec![lessons_json])),
                Arc::new(UInt32Array::from(vec![course.lessons.len() as u32])),
                Arc::new(StringArray::from(vec![document])),
                Arc::new(vectors),
            ],
        )
        .map_err(|e| RagError::SearchIndex(format!("Failed to create record batch: {}", e)))?;

        let _guard = self.lock.write().await;
        let table = self.table.open_or_create(schema).await?;
        self.table.delete(&Self::title_filter(&course.title)).await?;
        self.table.add(&table, batch).await?;

        info!(
            "Catalogued course '{}' with {} lessons",
            course.title,
            course.lessons.len()
        );
        Ok(())
    }

    /// Resolve a possibly partial course name to the closest stored title
    ///
    /// Always returns the nearest title when the catalog has any entries;
    /// only an empty catalog yields `NotFound`.
    #[inline]
    pub async fn resolve_course_name(&self, name: &str) -> Result<String> {
        let vector = self
            .embedder
            .embed_one(name)
            .await
            .map_err(|e| RagError::SearchIndex(format!("Failed to embed course name: {:#}", e)))?;

        let _guard = self.lock.read().await;
        let Some(table) = self.table.open().await? else {
            return Err(RagError::NotFound(name.to_string()));
        };

        let stream = table
            .vector_search(vector)
            .map_err(|e| RagError::SearchIndex(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .select(Select::columns(&["title"]))
            .limit(1)
            .execute()
            .await
            .map_err(|e| RagError::SearchIndex(format!("Failed to search catalog: {}", e)))?;

        for batch in collect_batches(stream).await? {
            if batch.num_rows() > 0 {
                let title = string_column(&batch, "title")?.value(0).to_string();
                let score = similarity_scores(&batch)[0];
                debug!("Resolved '{}' to '{}' (score {:.3})", name, title, score);
                return Ok(title);
            }
        }

        Err(RagError::NotFound(name.to_string()))
    }

    /// All stored course titles, sorted
    #[inline]
    pub async fn course_titles(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read().await;
        let Some(table) = self.table.open().await? else {
            return Ok(Vec::new());
        };

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::SearchIndex(format!("Failed to count courses: {}", e)))?;

        let stream = table
            .query()
            .select(Select::columns(&["title"]))
            .limit(rows.max(1))
            .execute()
            .await
            .map_err(|e| RagError::SearchIndex(format!("Failed to list courses: {}", e)))?;

        let mut titles = Vec::new();
        for batch in collect_batches(stream).await? {
            let column = string_column(&batch, "title")?;
            titles.extend((0..batch.num_rows()).map(|row| column.value(row).to_string()));
        }
        titles.sort();
        Ok(titles)
    }

    #[inline]
    pub async fn course_count(&self) -> Result<usize> {
        let _guard = self.lock.read().await;
        self.table.count(None).await
    }

    #[inline]
    pub async fn contains(&self, title: &str) -> Result<bool> {
        let _guard = self.lock.read().await;
        Ok(self.table.count(Some(Self::title_filter(title))).await? > 0)
    }

    /// Full course metadata for an exact title
    #[inline]
    pub async fn get_course(&self, title: &str) -> Result<Option<Course>> {
        let _guard = self.lock.read().await;
        let Some(table) = self.table.open().await? else {
            return Ok(None);
        };

        let stream = table
            .query()
            .only_if(Self::title_filter(title))
            .select(Select::columns(&[
                "title",
                "instructor",
                "course_link",
                "lessons_json",
            ]))
            .limit(1)
            .execute()
            .await
            .map_err(|e| RagError::SearchIndex(format!("Failed to read course: {}", e)))?;

        for batch in collect_batches(stream).await? {
            if batch.num_rows() == 0 {
                continue;
            }

            let lessons_json = string_column(&batch, "lessons_json")?.value(0);
            let lessons: Vec<Lesson> = serde_json::from_str(lessons_json).map_err(|e| {
                RagError::SearchIndex(format!("Corrupt lesson metadata for '{}': {}", title, e))
            })?;

            return Ok(Some(Course {
                title: string_column(&batch, "title")?.value(0).to_string(),
                course_link: string_column(&batch, "course_link")?.value(0).to_string(),
                instructor: string_column(&batch, "instructor")?.value(0).to_string(),
                lessons,
            }));
        }

        Ok(None)
    }

    #[inline]
    pub async fn lesson_link(&self, title: &str, lesson_number: u32) -> Result<Option<String>> {
        Ok(self
            .get_course(title)
            .await?
            .and_then(|course| course.lesson(lesson_number)?.lesson_link.clone()))
    }

    /// Number of lessons recorded for a course, without decoding the lesson list
    #[inline]
    pub async fn lesson_count(&self, title: &str) -> Result<Option<u32>> {
        let _guard = self.lock.read().await;
        let Some(table) = self.table.open().await? else {
            return Ok(None);
        };

        let stream = table
            .query()
            .only_if(Self::title_filter(title))
            .select(Select::columns(&["lesson_count"]))
            .limit(1)
            .execute()
            .await
            .map_err(|e| RagError::SearchIndex(format!("Failed to read course: {}", e)))?;

        for batch in collect_batches(stream).await? {
            if batch.num_rows() > 0 {
                return Ok(Some(u32_column(&batch, "lesson_count")?.value(0)));
            }
        }
        Ok(None)
    }

    #[inline]
    pub async fn remove_course(&self, title: &str) -> Result<()> {
        let _guard = self.lock.write().await;
        self.table.delete(&Self::title_filter(title)).await?;
        debug!("Removed '{}' from {}", title, self.table.name());
        Ok(())
    }

    #[inline]
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.write().await;
        self.table.drop_if_exists().await
    }
}
