//! Blocking HTTP plumbing shared by the embedding and generation clients.
//!
//! Both talk to an OpenAI-compatible API: JSON over POST, bearer-token
//! authentication and the same status-code conventions.


use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::{Config, EmbeddingConfig};
use crate::{Result, RetrievalError};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const MAX_RESPONSE_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    api_key: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

/// Failure of a single API call, before it is attributed to a service
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("credential rejected (HTTP {0})")]
    Unauthorized(u16),
    #[error("rate limit or quota exceeded (HTTP 429)")]
    RateLimited,
    #[error("client error: HTTP {0}")]
    Client(u16),
    #[error("server error: HTTP {0}")]
    Server(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Map onto the crate error taxonomy; `service` wraps anything that is not auth or quota
    #[inline]
    pub fn into_retrieval_error(self, service: fn(String) -> RetrievalError) -> RetrievalError {
        match self {
            Self::Unauthorized(_) => RetrievalError::Authentication(self.to_string()),
            Self::RateLimited => RetrievalError::RateLimited(self.to_string()),
            other => service(other.to_string()),
        }
    }

    fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(status),
            429 => Self::RateLimited,
            s if s >= 500 => Self::Server(s),
            s => Self::Client(s),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Server(_) | Self::Transport(_))
    }
}

impl ApiClient {
    /// Build a client from the embedding settings, resolving the credential from the environment
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::new(&config.embedding, api_key)
    }

    #[inline]
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let base_url = config.url()?;

        Ok(Self {
            base_url,
            api_key,
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
            retry_attempts: config.retry_attempts.max(1),
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Resolve `path` relative to the base URL, keeping any path prefix the base carries
    #[inline]
    pub fn endpoint(&self, path: &str) -> std::result::Result<Url, ApiError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidResponse(format!("bad endpoint {}: {}", path, e)))
    }

    /// POST `body` as JSON to `path` and decode the JSON response
    #[inline]
    pub fn post_json<T, R>(&self, path: &str, body: &T) -> std::result::Result<R, ApiError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let request_json = serde_json::to_string(body)
            .map_err(|e| ApiError::InvalidResponse(format!("failed to encode request: {}", e)))?;
        let authorization = format!("Bearer {}", self.api_key);

        debug!("POST {} ({} bytes)", url, request_json.len());

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("Authorization", authorization.as_str())
                .send(request_json.as_str())
                .and_then(|mut resp| {
                    resp.body_mut()
                        .with_config()
                        .limit(MAX_RESPONSE_BYTES)
                        .read_to_string()
                })
        })?;

        serde_json::from_str(&response_text)
            .map_err(|e| ApiError::InvalidResponse(format!("failed to parse response: {}", e)))
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> std::result::Result<String, ApiError>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            let error = match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(ureq::Error::StatusCode(status)) => ApiError::from_status(status),
                Err(
                    e @ (ureq::Error::ConnectionFailed
                    | ureq::Error::HostNotFound
                    | ureq::Error::Timeout(_)
                    | ureq::Error::Io(_)),
                ) => ApiError::Transport(e.to_string()),
                Err(e) => {
                    warn!("Non-retryable error: {}", e);
                    return Err(ApiError::InvalidResponse(e.to_string()));
                }
            };

            if !error.is_retryable() {
                warn!("Request to {} failed: {}", self.base_url, error);
                return Err(error);
            }

            warn!(
                "Request to {} failed: {}, attempt {}/{}",
                self.base_url, error, attempt, self.retry_attempts
            );
            last_error = Some(error);

            if attempt < self.retry_attempts {
                let delay = Duration::from_millis(EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000);
                debug!("Waiting {:?} before retry", delay);
                std::thread::sleep(delay);
            }
        }

        error!("All attempts failed for request to {}", self.base_url);

        Err(last_error
            .unwrap_or_else(|| ApiError::Transport("request failed after retries".to_string())))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}
