// Embeddings module
// Turns text into vectors through an external embedding service

pub mod openai;

pub use openai::EmbeddingClient;

use crate::{Result, RetrievalError};

/// Something that maps text to embedding vectors
///
/// Ingestion and querying must use the same implementation, otherwise stored
/// vectors and query vectors live in different spaces.
pub trait Embedder: Send + Sync {
    /// Embed every text, returning one vector per input in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| RetrievalError::Embedding("service returned no embedding".to_string()))
    }
}

impl<E: Embedder + ?Sized> Embedder for &E {
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}
