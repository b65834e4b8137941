//! Request/response types for the text-generation collaborator
//!
//! A GenerationRequest is immutable per attempt; the controller constructs a
//! fresh one each loop iteration.

use serde::{Deserialize, Serialize};

/// Request for one text generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The full user prompt for this attempt
    pub prompt: String,
    /// Model override; falls back to the client's configured model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Max output tokens; falls back to the client's configured limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Optional system instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl GenerationRequest {
    /// Create a request for the given prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            max_tokens: None,
            system: None,
        }
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set max output tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the system instruction
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Response from the text-generation collaborator
///
/// `text` is the concatenation of all text-typed content parts. The loop
/// never mutates a response once received.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
    pub usage: Usage,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    /// Create new usage stats
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Calculate total tokens
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Accumulate usage from another instance
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = GenerationRequest::new("write a script")
            .with_model("claude-3-haiku-20240307")
            .with_max_tokens(1000)
            .with_system("You are a developer");

        assert_eq!(req.prompt, "write a script");
        assert_eq!(req.model.as_deref(), Some("claude-3-haiku-20240307"));
        assert_eq!(req.max_tokens, Some(1000));
        assert_eq!(req.system.as_deref(), Some("You are a developer"));
    }

    #[test]
    fn test_request_defaults() {
        let req = GenerationRequest::new("hello");
        assert!(req.model.is_none());
        assert!(req.max_tokens.is_none());
        assert!(req.system.is_none());
    }

    #[test]
    fn test_usage_total() {
        let usage = Usage::new(100, 50);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_usage_add() {
        let mut usage1 = Usage::new(100, 50);
        let usage2 = Usage::new(200, 100);
        usage1.add(&usage2);
        assert_eq!(usage1.input_tokens, 300);
        assert_eq!(usage1.output_tokens, 150);
    }

    #[test]
    fn test_response_default() {
        let resp = GenerationResponse::default();
        assert!(resp.text.is_empty());
        assert_eq!(resp.usage.total(), 0);
    }
}
