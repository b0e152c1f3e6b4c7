use super::*;
use tempfile::TempDir;

fn test_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        vector_field(dimension),
    ]))
}

fn test_batch(ids: &[&str], vectors: &[Vec<f32>]) -> RecordBatch {
    let vectors = vector_array(vectors).expect("vectors should pack");
    let dimension = vectors.value_length() as usize;
    RecordBatch::try_new(
        test_schema(dimension),
        vec![
            Arc::new(StringArray::from(ids.to_vec())),
            Arc::new(vectors),
        ],
    )
    .expect("batch should build")
}

#[test]
fn literal_escaping_doubles_quotes() {
    assert_eq!(escape_literal("Bob's Course"), "Bob''s Course");
    assert_eq!(escape_literal("plain"), "plain");
    assert_eq!(escape_literal("''"), "''''");
}

#[test]
fn vector_array_rejects_ragged_input() {
    let result = vector_array(&[vec![0.1, 0.2], vec![0.3]]);
    assert!(matches!(result, Err(RagError::SearchIndex(_))));

    let result = vector_array(&[]);
    assert!(matches!(result, Err(RagError::SearchIndex(_))));
}

#[test]
fn vector_array_keeps_row_order() {
    let array = vector_array(&[vec![1.0, 2.0], vec![3.0, 4.0]]).expect("vectors should pack");
    assert_eq!(array.len(), 2);
    assert_eq!(array.value_length(), 2);

    let second = array.value(1);
    let second = second
        .as_any()
        .downcast_ref::<Float32Array>()
        .expect("values are f32");
    assert_eq!(second.values().to_vec(), vec![3.0, 4.0]);
}

#[tokio::test]
async fn missing_table_reads_as_empty() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let connection = connect(&temp_dir.path().join("vectors"))
        .await
        .expect("should connect");

    let table = VectorTable::new(connection, "nothing_here");

    assert!(table.open().await.expect("open should succeed").is_none());
    assert_eq!(table.count(None).await.expect("count should succeed"), 0);
    table
        .delete("id = 'x'")
        .await
        .expect("deleting from a missing table is a no-op");
    table
        .drop_if_exists()
        .await
        .expect("dropping a missing table is a no-op");
}

#[tokio::test]
async fn table_is_created_on_first_write() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let connection = connect(temp_dir.path()).await.expect("should connect");
    let vectors = VectorTable::new(connection, "rows");

    let table = vectors
        .open_or_create(test_schema(3))
        .await
        .expect("table should be created");
    vectors
        .add(&table, test_batch(&["a", "b"], &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]))
        .await
        .expect("rows should insert");

    assert_eq!(vectors.count(None).await.expect("count"), 2);
    assert_eq!(
        vectors
            .count(Some("id = 'a'".to_string()))
            .await
            .expect("filtered count"),
        1
    );

    vectors.delete("id = 'a'").await.expect("delete should work");
    assert_eq!(vectors.count(None).await.expect("count"), 1);

    vectors.drop_if_exists().await.expect("drop should work");
    assert!(vectors.open().await.expect("open").is_none());
}

#[tokio::test]
async fn dimension_mismatch_is_an_index_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let connection = connect(temp_dir.path()).await.expect("should connect");
    let vectors = VectorTable::new(connection, "rows");

    vectors
        .open_or_create(test_schema(3))
        .await
        .expect("table should be created");

    let result = vectors.open_or_create(test_schema(4)).await;
    assert!(matches!(result, Err(RagError::SearchIndex(message)) if message.contains("dimension")));
}
