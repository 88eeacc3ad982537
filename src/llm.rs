//! Language-model capability and its OpenAI implementation.
//!
//! The synthesizer talks to the model through [`LanguageModel`], so
//! tests can substitute a scripted fake. The real backend calls the
//! chat completions API.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;

use crate::config::ModelConfig;
use crate::error::SynthesisError;

/// A text completion capability: system directive plus user content in,
/// free text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the backing model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Run one completion with the given maximum output length.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_output_tokens: u32,
    ) -> Result<String, SynthesisError>;
}

/// Chat completions client for the OpenAI API.
pub struct OpenAiChat {
    model: String,
    api_base: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiChat {
    /// Create a client from configuration, reading the API key from the
    /// configured environment variable.
    pub fn new(config: &ModelConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.name.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_output_tokens: u32,
    ) -> Result<String, SynthesisError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "max_tokens": max_output_tokens,
        });

        let url = format!("{}/chat/completions", self.api_base);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1u64 << (attempt - 1).min(5));
                debug!("retrying model call in {:?} (attempt {})", delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            SynthesisError::InvalidResponse(format!("bad response body: {}", e))
                        })?;
                        return parse_chat_response(&json);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        warn!("model API error {}: retrying", status);
                        last_err = Some(format!("API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429): don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    if body_text.contains("context_length_exceeded") {
                        return Err(SynthesisError::ContextExceeded);
                    }
                    return Err(SynthesisError::ModelUnavailable(format!(
                        "API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(SynthesisError::ModelUnavailable(
            last_err.unwrap_or_else(|| "completion failed after retries".to_string()),
        ))
    }
}

/// Extract `choices[0].message.content` from a chat completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, SynthesisError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|t| t.to_string())
        .ok_or_else(|| {
            SynthesisError::InvalidResponse("missing choices[0].message.content".to_string())
        })
}
