// LanceDB vector database module
// Handles collection lifecycle, record storage and similarity search


pub mod vector_store;

pub use vector_store::VectorStore;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ingest::{TextChunk, estimate_token_count};

/// Embedded page stored in a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique identifier of the chunk within its collection
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Metadata stored alongside each embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// File name of the source document
    pub source: String,
    /// Page number within the source, starting at 1
    pub chunk_number: u32,
    /// The extracted text of the page
    pub text: String,
    pub token_count: u32,
    /// RFC 3339 timestamp of when the record was stored
    pub created_at: String,
}

/// One match returned by a similarity search
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance between the query and the stored vector
    pub distance: f32,
    /// `1 - distance`, higher is better
    pub similarity: f32,
}

impl EmbeddingRecord {
    #[inline]
    pub fn from_chunk(chunk: &TextChunk, vector: Vec<f32>) -> Self {
        let token_count = u32::try_from(estimate_token_count(&chunk.text)).unwrap_or(u32::MAX);

        Self {
            id: chunk.unique_identifier(),
            vector,
            metadata: ChunkMetadata {
                source: chunk.source.clone(),
                chunk_number: chunk.chunk_number,
                text: chunk.text.clone(),
                token_count,
                created_at: Utc::now().to_rfc3339(),
            },
        }
    }
}

impl SearchHit {
    #[inline]
    pub fn from_distance(id: String, metadata: ChunkMetadata, distance: f32) -> Self {
        Self {
            id,
            metadata,
            distance,
            similarity: 1.0 - distance,
        }
    }
}
