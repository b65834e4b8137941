//! Text-generation collaborator: trait, types, and the Anthropic client

pub mod anthropic;
pub mod client;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use client::{MockGenerator, TextGenerator};
pub use types::{GenerationRequest, GenerationResponse, Usage};
