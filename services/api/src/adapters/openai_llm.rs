//! services/api/src/adapters/openai_llm.rs
//!
//! This module contains the OpenAI text-generation adapter. It implements
//! the `TextGeneration` port from the `core` crate using the chat
//! completions API, with retries for transient failures.

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use mail_report_core::ports::{GenerationError, GenerationResponse, TextGeneration};
use tracing::warn;

use super::{retry_delay, MAX_GENERATION_ATTEMPTS};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGeneration` against the OpenAI API.
#[derive(Clone)]
pub struct OpenAiGenerationAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerationAdapter {
    /// Creates a new `OpenAiGenerationAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    async fn call_once(
        &self,
        system_text: &str,
        user_text: &str,
        timeout: Duration,
    ) -> Result<GenerationResponse, GenerationError> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_text)
                .build()
                .map_err(|e| GenerationError::Other(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_text)
                .build()
                .map_err(|e| GenerationError::Other(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.3)
            .max_tokens(4096u32)
            .build()
            .map_err(|e| GenerationError::Other(e.to_string()))?;

        // The SDK has no per-request deadline, so the whole call is raced
        // against the configured timeout.
        let response = tokio::time::timeout(timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                GenerationError::Timeout(format!("no reply within {}s", timeout.as_secs()))
            })?
            .map_err(classify_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerationError::Other("chat completion contained no text content".to_string())
            })?;

        Ok(GenerationResponse::FreeText(content))
    }
}

/// Maps an SDK error onto the port's failure taxonomy so the shared retry
/// policy can react to it.
fn classify_error(error: OpenAIError) -> GenerationError {
    let text = error.to_string();
    let lowered = text.to_lowercase();
    if lowered.contains("401")
        || lowered.contains("403")
        || lowered.contains("invalid_api_key")
        || lowered.contains("authentication")
    {
        GenerationError::Auth(text)
    } else if lowered.contains("429") || lowered.contains("rate limit") {
        GenerationError::RateLimited(text)
    } else if lowered.contains("500")
        || lowered.contains("502")
        || lowered.contains("503")
        || lowered.contains("server_error")
        || lowered.contains("overloaded")
    {
        GenerationError::Server(text)
    } else if lowered.contains("timed out") || lowered.contains("timeout") {
        GenerationError::Timeout(text)
    } else {
        GenerationError::Other(text)
    }
}

//=========================================================================================
// `TextGeneration` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGeneration for OpenAiGenerationAdapter {
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
    fn status_401_maps_to_auth() {
        let err = OpenAIError::InvalidArgument("401 Unauthorized".to_string());
        assert!(matches!(classify_error(err), GenerationError::Auth(_)));
    }

    #[test]
    fn rate_limit_text_maps_to_rate_limited() {
        let err = OpenAIError::InvalidArgument("429 rate limit reached".to_string());
        assert!(matches!(
            classify_error(err),
            GenerationError::RateLimited(_)
        ));
    }

    #[test]
    fn unknown_errors_map_to_other() {
        let err = OpenAIError::InvalidArgument("something odd".to_string());
        assert!(matches!(classify_error(err), GenerationError::Other(_)));
    }
}
