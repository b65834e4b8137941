//! Core text-generation trait and a scripted mock for tests

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{MailforgeError, Result};
use crate::llm::types::{GenerationRequest, GenerationResponse};

/// Stateless text-generation client; each call is an independent request
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Single generation request (blocking until complete or failed)
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse>;

    /// Model identifier this client targets
    fn model(&self) -> &str;
}

/// Mock generator that replays scripted responses in order.
///
/// An `Err(message)` entry yields a `MailforgeError::Generation`; running past
/// the end of the script does too.
pub struct MockGenerator {
    script: Mutex<std::collections::VecDeque<std::result::Result<String, String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    /// Create a mock replaying the given response texts
    pub fn new(responses: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a mock whose every response succeeds
    pub fn with_texts(texts: Vec<&str>) -> Self {
        Self::new(texts.into_iter().map(|t| Ok(t.to_string())).collect())
    }

    /// The prompts this mock has been asked so far
    pub fn recorded_requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        self.requests
            .lock()
            .expect("mock lock poisoned")
            .push(request);

        let next = self.script.lock().expect("mock lock poisoned").pop_front();
        match next {
            Some(Ok(text)) => Ok(GenerationResponse {
                text,
                ..Default::default()
            }),
            Some(Err(detail)) => Err(MailforgeError::Generation(detail)),
            None => Err(MailforgeError::Generation(
                "mock script exhausted".to_string(),
            )),
        }
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}
