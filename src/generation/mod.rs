//! Generative answers over retrieved pages.


use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::{Result, RetrievalError};

const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";

/// Something that turns a prompt into generated text
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct CompletionClient {
    api: ApiClient,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl CompletionClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let api = ApiClient::from_config(config)?;
        Ok(Self::with_api(api, &config.generation.model))
    }

    #[inline]
    pub fn with_api(api: ApiClient, model: &str) -> Self {
        Self {
            api,
            model: model.to_string(),
        }
    }
}

impl Generator for CompletionClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        debug!(
            "Requesting completion from {} (prompt length: {})",
            self.model,
            prompt.len()
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response: ChatResponse = self
            .api
            .post_json(CHAT_COMPLETIONS_PATH, &request)
            .map_err(|e| e.into_retrieval_error(RetrievalError::Generation))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ApiError::InvalidResponse("completion contained no message".to_string())
                    .into_retrieval_error(RetrievalError::Generation)
            })
    }
}

/// Build the grouped-task prompt: the task followed by every retrieved page
#[inline]
pub fn grouped_task_prompt<'a, I>(task: &str, passages: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let passages = passages
        .into_iter()
        .enumerate()
        .map(|(i, passage)| format!("[{}]\n{}", i + 1, passage.trim()))
        .join("\n\n");

    format!(
        "{}\n\nUse the following passages:\n\n{}\n",
        task.trim(),
        passages
    )
}
