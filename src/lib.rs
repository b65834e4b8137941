//! Mailforge - generates, executes, classifies and repairs mailbox
//! download scripts until one verifiably works, then caches it as a
//! redacted per-domain template.

pub mod classify;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod id;
pub mod imap;
pub mod llm;
pub mod prompt;
pub mod report;
pub mod runner;
pub mod sandbox;
pub mod template;

pub use error::{MailforgeError, Result};
