use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const EMBEDDING_DIM: i32 = 1024;

/// Chunk snapshot table: one row per chunk, vector inline.
pub fn build_chunks_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("doc_path", DataType::Utf8, false),
        Field::new("section_header", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("domain", DataType::Utf8, false),
        Field::new("size_category", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int32, false),
        Field::new("modified_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                EMBEDDING_DIM,
            ),
            true,
        ),
    ]))
}

/// Embedding cache keyed by `(content_hash, embedder_id)`.
pub fn build_cache_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("embedder_id", DataType::Utf8, false),
        Field::new("created_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                EMBEDDING_DIM,
            ),
            true,
        ),
    ]))
}
