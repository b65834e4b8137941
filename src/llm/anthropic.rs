//! Anthropic Messages API client
//!
//! Implements the TextGenerator trait against the Anthropic (Claude) API.
//! Transport failures are retried with capped exponential backoff; HTTP-level
//! error responses are surfaced immediately without retry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::error::{MailforgeError, Result};
use crate::llm::client::TextGenerator;
use crate::llm::types::{GenerationRequest, GenerationResponse, Usage};

/// Anthropic API base URL
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model to use
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default max tokens
const DEFAULT_MAX_TOKENS: u32 = 50000;

/// Maximum backoff between transport retries
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Configuration for the Anthropic client
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub model: String,
    pub max_tokens: u32,
    pub api_url: String,
    pub timeout: Duration,
    /// Transport-level attempts per request, distinct from the repair loop's
    /// own attempt budget
    pub retries: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_url: ANTHROPIC_API_URL.to_string(),
            timeout: Duration::from_secs(120),
            retries: 3,
        }
    }
}

impl AnthropicConfig {
    /// Create a new config with a specific model
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Anthropic API client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
    usage: Arc<Mutex<Usage>>,
}

impl AnthropicClient {
    /// Create a new Anthropic client
    ///
    /// Reads ANTHROPIC_API_KEY from environment
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| MailforgeError::Generation("ANTHROPIC_API_KEY not set".to_string()))?;

        Self::with_api_key(api_key, config)
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(api_key: String, config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MailforgeError::Generation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            config,
            usage: Arc::new(Mutex::new(Usage::default())),
        })
    }

    /// Build the request body for the Messages API
    fn build_body(&self, request: &GenerationRequest) -> Value {
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let max_tokens = request.max_tokens.unwrap_or(self.config.max_tokens);

        let mut body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": [
                { "role": "user", "content": request.prompt }
            ]
        });

        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }

        body
    }

    /// Parse the API response, concatenating all text-typed content parts
    fn parse_response(&self, body: Value) -> Result<GenerationResponse> {
        let usage = if let Some(u) = body.get("usage") {
            Usage::new(
                u["input_tokens"].as_u64().unwrap_or(0),
                u["output_tokens"].as_u64().unwrap_or(0),
            )
        } else {
            Usage::default()
        };

        if let Ok(mut total) = self.usage.lock() {
            total.add(&usage);
        }

        let mut text = String::new();
        if let Some(parts) = body["content"].as_array() {
            for part in parts {
                if part["type"].as_str() != Some("text") {
                    continue;
                }
                if let Some(t) = part["text"].as_str() {
                    text.push_str(t);
                }
            }
        }

        Ok(GenerationResponse { text, usage })
    }

    /// POST the body, retrying transport failures with capped backoff
    async fn send_with_retry(&self, body: Value) -> Result<Value> {
        let attempts = self.config.retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let sent = self
                .client
                .post(&self.config.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await;

            let response = match sent {
                Ok(r) => r,
                Err(e) => {
                    // Connect failure or timeout: eligible for retry
                    last_error = format!("request failed (attempt {}): {}", attempt, e);
                    log::warn!("{}", last_error);
                    if attempt < attempts {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                // HTTP errors are not retried; surface the body immediately
                let error_body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(MailforgeError::Generation(format!(
                    "API error {}: {}",
                    status, error_body
                )));
            }

            return response
                .json()
                .await
                .map_err(|e| MailforgeError::Generation(format!("Failed to parse response: {}", e)));
        }

        Err(MailforgeError::Generation(last_error))
    }

    /// Get cumulative token usage
    pub fn total_usage(&self) -> Usage {
        self.usage
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }
}

/// Backoff for the Nth transport attempt: 1s, 2s, 4s, capped at 5s
fn backoff_delay(attempt: u32) -> Duration {
    let secs = 1u64 << (attempt - 1).min(8);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let body = self.build_body(&request);
        let response = self.send_with_retry(body).await?;
        self.parse_response(response)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("model", &self.config.model)
            .field("max_tokens", &self.config.max_tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> AnthropicClient {
        AnthropicClient::with_api_key("test-key".to_string(), AnthropicConfig::default())
            .expect("client should build")
    }

    #[test]
    fn test_config_default() {
        let config = AnthropicConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.api_url, ANTHROPIC_API_URL);
        // Matches the LlmConfig default so library and config agree
        assert_eq!(config.retries, 3);
    }

    #[test]
    fn test_config_with_model() {
        let config = AnthropicConfig::with_model("claude-3-haiku-20240307");
        assert_eq!(config.model, "claude-3-haiku-20240307");
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_build_body_basic() {
        let client = test_client();
        let request = GenerationRequest::new("Write a script").with_system("You are helpful");

        let body = client.build_body(&request);

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["system"], "You are helpful");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Write a script");
    }

    #[test]
    fn test_build_body_overrides() {
        let client = test_client();
        let request = GenerationRequest::new("hi")
            .with_model("claude-3-haiku-20240307")
            .with_max_tokens(256);

        let body = client.build_body(&request);

        assert_eq!(body["model"], "claude-3-haiku-20240307");
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_parse_response_concatenates_text_parts() {
        let client = test_client();
        let api_response = json!({
            "content": [
                { "type": "text", "text": "```python\n" },
                { "type": "tool_use", "id": "x", "name": "y", "input": {} },
                { "type": "text", "text": "print('hi')\n```" }
            ],
            "usage": { "input_tokens": 10, "output_tokens": 5 }
        });

        let response = client.parse_response(api_response).unwrap();
        assert_eq!(response.text, "```python\nprint('hi')\n```");
        assert_eq!(response.usage.input_tokens, 10);
        assert_eq!(response.usage.output_tokens, 5);
    }

    #[test]
    fn test_parse_response_missing_usage() {
        let client = test_client();
        let response = client
            .parse_response(json!({ "content": [{ "type": "text", "text": "ok" }] }))
            .unwrap();
        assert_eq!(response.text, "ok");
        assert_eq!(response.usage.total(), 0);
    }

    #[test]
    fn test_total_usage_accumulation() {
        let client = test_client();
        let _ = client.parse_response(json!({
            "content": [],
            "usage": { "input_tokens": 100, "output_tokens": 50 }
        }));
        let _ = client.parse_response(json!({
            "content": [],
            "usage": { "input_tokens": 200, "output_tokens": 100 }
        }));

        let total = client.total_usage();
        assert_eq!(total.input_tokens, 300);
        assert_eq!(total.output_tokens, 150);
    }

    #[test]
    fn test_backoff_delay_caps_at_five_seconds() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(4), Duration::from_secs(5));
        assert_eq!(backoff_delay(10), Duration::from_secs(5));
    }

    #[test]
    fn test_debug_impl_hides_key() {
        let client = test_client();
        let debug_str = format!("{:?}", client);
        assert!(debug_str.contains("AnthropicClient"));
        assert!(!debug_str.contains("test-key"));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AnthropicClient>();
    }
}
