// Database module
// Vector storage for embedded pages, backed by LanceDB

pub mod lancedb;

pub use self::lancedb::{ChunkMetadata, EmbeddingRecord, SearchHit, VectorStore};
