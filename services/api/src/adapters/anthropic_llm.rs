//! services/api/src/adapters/anthropic_llm.rs
//!
//! This module contains the Anthropic text-generation adapter. It implements
//! the `TextGeneration` port from the `core` crate by calling the Messages
//! API directly over HTTP, with the same retry policy as the OpenAI adapter.

use std::time::Duration;

use async_trait::async_trait;
use mail_report_core::ports::{GenerationError, GenerationResponse, TextGeneration};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{retry_delay, MAX_GENERATION_ATTEMPTS};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4096;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGeneration` against the Anthropic API.
#[derive(Clone)]
pub struct AnthropicGenerationAdapter {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicGenerationAdapter {
    /// Creates a new `AnthropicGenerationAdapter`.
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
        }
    }

    async fn call_once(
        &self,
        system_text: &str,
        user_text: &str,
        timeout: Duration,
    ) -> Result<GenerationResponse, GenerationError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": 0.3,
            "system": system_text,
            "messages": [{ "role": "user", "content": user_text }],
        });

        let request = self
            .http
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send();

        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| {
                GenerationError::Timeout(format!("no reply within {}s", timeout.as_secs()))
            })?
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(e.to_string())
                } else {
                    GenerationError::Other(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), detail));
        }

        let reply: MessagesReply = response
            .json()
            .await
            .map_err(|e| GenerationError::Other(format!("malformed reply: {}", e)))?;

        let text = reply
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| {
                GenerationError::Other("messages reply contained no text block".to_string())
            })?;

        Ok(GenerationResponse::FreeText(text))
    }
}

#[derive(Deserialize)]
struct MessagesReply {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

/// Maps an HTTP status onto the port's failure taxonomy.
fn classify_status(status: u16, detail: String) -> GenerationError {
    match status {
        401 | 403 => GenerationError::Auth(format!("{}: {}", status, detail)),
        429 => GenerationError::RateLimited(format!("{}: {}", status, detail)),
        500..=599 => GenerationError::Server(format!("{}: {}", status, detail)),
        _ => GenerationError::Other(format!("{}: {}", status, detail)),
    }
}

//=========================================================================================
// `TextGeneration` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGeneration for AnthropicGenerationAdapter {
    async fn generate(
        &self,
        system_text: &str,
        user_text: &str,
        timeout: Duration,
    ) -> Result<GenerationResponse, GenerationError> {
        let mut attempt = 0;
        loop {
            match self.call_once(system_text, user_text, timeout).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    let delay = retry_delay(&error, attempt);
                    attempt += 1;
                    match delay {
                        Some(delay) if attempt < MAX_GENERATION_ATTEMPTS => {
                            warn!(
                                attempt,
                                delay_secs = delay.as_secs(),
                                error = %error,
                                "generation attempt failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        _ => return Err(error),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_onto_the_failure_taxonomy() {
        assert!(matches!(
            classify_status(401, String::new()),
            GenerationError::Auth(_)
        ));
        assert!(matches!(
            classify_status(429, String::new()),
            GenerationError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(529, String::new()),
            GenerationError::Server(_)
        ));
        assert!(matches!(
            classify_status(400, String::new()),
            GenerationError::Other(_)
        ));
    }
}
