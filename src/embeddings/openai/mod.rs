
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Embedder;
use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::{Result, RetrievalError};

const EMBEDDINGS_PATH: &str = "v1/embeddings";

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    api: ApiClient,
    model: String,
    batch_size: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let api = ApiClient::from_config(config)?;
        Ok(Self::with_api(
            api,
            &config.embedding.model,
            config.embedding.batch_size,
        ))
    }

    #[inline]
    pub fn with_api(api: ApiClient, model: &str, batch_size: u32) -> Self {
        Self {
            api,
            model: model.to_string(),
            batch_size: batch_size.max(1),
        }
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response: EmbedResponse = self
            .api
            .post_json(EMBEDDINGS_PATH, &request)
            .map_err(|e| e.into_retrieval_error(RetrievalError::Embedding))?;

        order_embeddings(response.data, texts.len())
            .map_err(|e| e.into_retrieval_error(RetrievalError::Embedding))
    }
}

impl Embedder for EmbeddingClient {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size as usize) {
            results.extend(self.embed_single_batch(chunk)?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }
}

/// The API may return items out of order; `index` is authoritative
fn order_embeddings(
    mut data: Vec<EmbeddingData>,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, ApiError> {
    if data.len() != expected {
        return Err(ApiError::InvalidResponse(format!(
            "mismatch between request and response counts: {} vs {}",
            expected,
            data.len()
        )));
    }

    data.sort_by_key(|item| item.index);
    if data.iter().enumerate().any(|(i, item)| item.index != i) {
        return Err(ApiError::InvalidResponse(
            "response indices do not cover the request".to_string(),
        ));
    }

    Ok(data.into_iter().map(|item| item.embedding).collect())
}
