use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// Chunk table layout. `metadata` holds the JSON-encoded `ChunkMetadata`;
/// `source` is duplicated into its own column for filtering.
pub fn build_chunk_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension), true),
    ]))
}
