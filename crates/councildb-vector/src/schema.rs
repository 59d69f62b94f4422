use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const DOCUMENTS_TABLE: &str = "documents";
pub const META_TABLE: &str = "meta";

pub fn build_documents_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("doc_type", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("number", DataType::Utf8, true),
        Field::new("date", DataType::Utf8, true),
        Field::new("council", DataType::Utf8, true),
        Field::new("source_path", DataType::Utf8, false),
        Field::new("content_hash", DataType::Utf8, false),
        // null means globally visible
        Field::new("owner", DataType::Utf8, true),
        Field::new("created_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
    ]))
}

/// Chunk rows; the vector width is fixed per table, so each embedding
/// generation gets its own table.
pub fn build_chunks_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("document_id", DataType::Int64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("position", DataType::Int32, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
    ]))
}
