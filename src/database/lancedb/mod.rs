// LanceDB vector database module
// Shared table plumbing for the catalog and content indexes

#[cfg(test)]
mod tests;

pub mod catalog;
pub mod content;

pub use catalog::CatalogIndex;
pub use content::{ContentIndex, SearchHit, SearchResults};

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{Connection, Table};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{RagError, Result};

/// Open (creating if needed) the LanceDB database at `db_path`
#[inline]
pub async fn connect(db_path: &Path) -> Result<Connection> {
    std::fs::create_dir_all(db_path).map_err(|e| {
        RagError::SearchIndex(format!("Failed to create vector database directory: {}", e))
    })?;

    let uri = format!("file://{}", db_path.display());
    debug!("Connecting to LanceDB at {}", uri);

    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| RagError::SearchIndex(format!("Failed to connect to LanceDB: {}", e)))
}

/// Escape a value for use inside a single-quoted filter literal
#[inline]
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// One named table whose schema is fixed once the vector dimension is known
#[derive(Clone)]
pub(crate) struct VectorTable {
    connection: Connection,
    name: &'static str,
}

impl VectorTable {
    pub(crate) fn new(connection: Connection, name: &'static str) -> Self {
        Self { connection, name }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// The table, or `None` when nothing has been written yet
    pub(crate) async fn open(&self) -> Result<Option<Table>> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::SearchIndex(format!("Failed to list tables: {}", e)))?;

        if !table_names.iter().any(|name| name == self.name) {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(self.name)
            .execute()
            .await
            .map_err(|e| {
                RagError::SearchIndex(format!("Failed to open table {}: {}", self.name, e))
            })?;
        Ok(Some(table))
    }

    /// Open the table, creating it from `schema` on first use
    ///
    /// An existing table must have the same vector dimension as `schema`.
    pub(crate) async fn open_or_create(&self, schema: Arc<Schema>) -> Result<Table> {
        let expected = vector_dimension(&schema);

        if let Some(table) = self.open().await? {
            let existing = table.schema().await.map_err(|e| {
                RagError::SearchIndex(format!("Failed to read schema of {}: {}", self.name, e))
            })?;
            let found = vector_dimension(&existing);
            if found != expected {
                return Err(RagError::SearchIndex(format!(
                    "Vector dimension mismatch in {}: table has {:?}, embeddings have {:?}; clear the indexes and re-ingest",
                    self.name, found, expected
                )));
            }
            return Ok(table);
        }

        info!(
            "Creating table {} with {:?} dimensions",
            self.name, expected
        );
        self.connection
            .create_empty_table(self.name, schema)
            .execute()
            .await
            .map_err(|e| RagError::SearchIndex(format!("Failed to create table {}: {}", self.name, e)))
    }

    pub(crate) async fn add(&self, table: &Table, batch: RecordBatch) -> Result<()> {
        let rows = batch.num_rows();
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table.add(reader).execute().await.map_err(|e| {
            RagError::SearchIndex(format!("Failed to insert into {}: {}", self.name, e))
        })?;
        debug!("Inserted {} rows into {}", rows, self.name);
        Ok(())
    }

    /// Delete matching rows; a missing table has nothing to delete
    pub(crate) async fn delete(&self, predicate: &str) -> Result<()> {
        if let Some(table) = self.open().await? {
            table.delete(predicate).await.map_err(|e| {
                RagError::SearchIndex(format!("Failed to delete from {}: {}", self.name, e))
            })?;
        }
        Ok(())
    }

    pub(crate) async fn count(&self, filter: Option<String>) -> Result<usize> {
        match self.open().await? {
            Some(table) => table.count_rows(filter).await.map_err(|e| {
                RagError::SearchIndex(format!("Failed to count rows in {}: {}", self.name, e))
            }),
            None => Ok(0),
        }
    }

    pub(crate) async fn drop_if_exists(&self) -> Result<()> {
        if self.open().await?.is_some() {
            info!("Dropping table {}", self.name);
            self.connection
                .drop_table(self.name)
                .await
                .map_err(|e| RagError::SearchIndex(format!("Failed to drop table {}: {}", self.name, e)))?;
        }
        Ok(())
    }
}

/// Drain a query result stream
pub(crate) async fn collect_batches(
    stream: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<RecordBatch>> {
    stream
        .try_collect()
        .await
        .map_err(|e| RagError::SearchIndex(format!("Failed to read result stream: {}", e)))
}

pub(crate) fn vector_field(dimension: usize) -> Field {
    Field::new(
        "vector",
        DataType::FixedSizeList(
            Arc::new(Field::new("item", DataType::Float32, false)),
            dimension as i32,
        ),
        false,
    )
}

fn vector_dimension(schema: &Schema) -> Option<usize> {
    schema
        .field_with_name("vector")
        .ok()
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => Some(*size as usize),
            _ => None,
        })
}

/// Pack equal-length vectors into a `FixedSizeListArray`
pub(crate) fn vector_array(vectors: &[Vec<f32>]) -> Result<FixedSizeListArray> {
    let dimension = vectors.first().map_or(0, Vec::len);
    if dimension == 0 {
        return Err(RagError::SearchIndex("Empty embedding vector".to_string()));
    }
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(RagError::SearchIndex(
            "Embeddings in one batch have different dimensions".to_string(),
        ));
    }

    let flat_values: Vec<f32> = vectors.iter().flatten().copied().collect();
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::SearchIndex(format!("Failed to create vector array: {}", e)))
}

pub(crate) fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::SearchIndex(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::SearchIndex(format!("Invalid {} column type", name)))
}

pub(crate) fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::SearchIndex(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::SearchIndex(format!("Invalid {} column type", name)))
}

/// Similarity (`1 - distance`) per row; rows without a distance score 0
pub(crate) fn similarity_scores(batch: &RecordBatch) -> Vec<f32> {
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    (0..batch.num_rows())
        .map(|row| match distances {
            Some(d) if !d.is_null(row) => 1.0 - d.value(row),
            _ => 0.0,
        })
        .collect()
}
