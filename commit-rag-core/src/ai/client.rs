// text-generation client - the single capability the engine needs from a model vendor

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

use super::prompts::SYSTEM_PROMPT;

/// prompt in, text out
///
/// implementations own transport, authentication and any retry policy; the
/// engine makes exactly one call per generation.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenerationError>;
}

// openrouter api structures
#[derive(Serialize)]
struct OpenRouterRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenRouterResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// chat-completions client for openrouter (or any compatible endpoint)
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// build from config, falling back to OPENROUTER_API_KEY for the key
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let api_key = match &config.api_key {
            Some(key) if !key.trim().is_empty() => key.clone(),
            _ => env::var("OPENROUTER_API_KEY")
                .context("OPENROUTER_API_KEY environment variable is not set")?,
        };
        Self::new(&config.api_url, api_key, &config.model)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationClient for OpenRouterClient {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        let request = OpenRouterRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
            max_tokens,
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "sending completion request");

        let response = self
            .http
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::timeout(format!("request to openrouter timed out: {e}"))
                } else {
                    GenerationError::unavailable(format!("failed to connect to openrouter api: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GenerationError::unavailable(format!(
                "openrouter api error ({status}): {error_text}"
            )));
        }

        let body: OpenRouterResponse = response.json().await.map_err(|e| {
            GenerationError::unavailable(format!("failed to parse openrouter api response: {e}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| GenerationError::empty_response("openrouter returned no message content"))
    }
}
