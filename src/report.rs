//! Attempt-level reporting
//!
//! The repair loop emits one event per attempt transition so operators can
//! follow a job without scraping script output. `LogReporter` renders events
//! as JSON lines through the logging layer; tests use `MemoryReporter`.

use std::path::PathBuf;
use std::sync::Mutex;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Text generation failed terminally
    ApiError,
    /// The response contained no extractable code
    NoEntry,
    /// The script ran but was classified as a failure
    Retry,
    /// The script ran and was classified as a success
    Success,
}

/// One attempt transition within a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptEvent {
    pub job_id: String,
    pub attempt: u32,
    pub status: AttemptStatus,
    /// Directory holding this attempt's artifacts, when one was created
    pub attempt_dir: Option<PathBuf>,
}

impl AttemptEvent {
    pub fn new(job_id: &str, attempt: u32, status: AttemptStatus) -> Self {
        Self {
            job_id: job_id.to_string(),
            attempt,
            status,
            attempt_dir: None,
        }
    }

    pub fn with_dir(mut self, dir: PathBuf) -> Self {
        self.attempt_dir = Some(dir);
        self
    }
}

/// Final accounting for a completed job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub attempts: u32,
    pub emails_found: u64,
    pub bytes_archived: u64,
    pub template_path: Option<PathBuf>,
}

/// Receives attempt events and the final summary
pub trait JobReporter: Send + Sync {
    fn attempt(&self, event: &AttemptEvent) -> Result<()>;
    fn summary(&self, summary: &JobSummary) -> Result<()>;
}

/// Emits events as JSON lines through the log layer
pub struct LogReporter;

impl JobReporter for LogReporter {
    fn attempt(&self, event: &AttemptEvent) -> Result<()> {
        info!("attempt {}", serde_json::to_string(event)?);
        Ok(())
    }

    fn summary(&self, summary: &JobSummary) -> Result<()> {
        info!("summary {}", serde_json::to_string(summary)?);
        Ok(())
    }
}

/// Captures events in memory for inspection in tests
#[derive(Default)]
pub struct MemoryReporter {
    pub events: Mutex<Vec<AttemptEvent>>,
    pub summaries: Mutex<Vec<JobSummary>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<AttemptStatus> {
        self.events
            .lock()
            .expect("reporter lock poisoned")
            .iter()
            .map(|e| e.status)
            .collect()
    }
}

impl JobReporter for MemoryReporter {
    fn attempt(&self, event: &AttemptEvent) -> Result<()> {
        self.events
            .lock()
            .expect("reporter lock poisoned")
            .push(event.clone());
        Ok(())
    }

    fn summary(&self, summary: &JobSummary) -> Result<()> {
        self.summaries
            .lock()
            .expect("reporter lock poisoned")
            .push(summary.clone());
        Ok(())
    }
}
