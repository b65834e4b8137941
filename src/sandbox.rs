//! Execution sandbox for candidate scripts
//!
//! Runs one fragment as a child process with credentials injected, both output
//! streams merged and read incrementally, and a hard-kill timeout. The source
//! is written under a unique temp name in a fixed execution directory (shared
//! across jobs, so relative-path output lands somewhere predictable) and is
//! removed on every exit path.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::credentials::{self, Credentials};
use crate::error::Result;
use crate::id;

/// Captures one end-to-end run of a fragment
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Process exit code; -1 on timeout or failure to start
    pub exit_code: i32,
    /// Merged stdout+stderr transcript, in arrival order
    pub stdout: String,
    /// Out-of-band error text (spawn failure, timeout notice)
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecutionResult {
    fn failed_to_start(detail: String) -> Self {
        Self {
            exit_code: -1,
            stderr: detail,
            ..Default::default()
        }
    }
}

/// Sandbox configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Fixed execution directory; relative output paths resolve here
    pub work_dir: PathBuf,
    /// Interpreter binary used to run fragments
    pub interpreter: String,
    /// Extension for the temp script file
    pub script_ext: String,
    /// Wall-clock bound; the process is force-killed when it elapses
    pub timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            interpreter: "python3".to_string(),
            script_ext: "py".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Temp script file removed on every exit path
struct TempScript {
    path: PathBuf,
}

impl Drop for TempScript {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Runs candidate fragments as isolated child processes
pub struct Sandbox {
    config: SandboxConfig,
    /// Optional live line feed for operator observability; correctness never
    /// depends on delivery, so sends are best-effort
    observer: Option<mpsc::Sender<String>>,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    /// Attach a line observer receiving output as it arrives
    pub fn with_observer(mut self, observer: mpsc::Sender<String>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.config.work_dir
    }

    /// Execute a fragment's source end to end.
    ///
    /// Credentials are injected first; the job id keys the temp filename so
    /// concurrent jobs sharing the execution directory cannot collide.
    pub async fn run(
        &self,
        source: &str,
        creds: &Credentials,
        job_id: &str,
    ) -> Result<ExecutionResult> {
        let injected = credentials::inject(source, creds);

        std::fs::create_dir_all(&self.config.work_dir)?;
        let script_name = id::generate_script_name(job_id, &self.config.script_ext);
        let script_path = self.config.work_dir.join(&script_name);
        std::fs::write(&script_path, &injected)?;
        let _guard = TempScript {
            path: script_path.clone(),
        };

        log::info!("executing candidate script {}", script_name);

        let spawned = Command::new(&self.config.interpreter)
            .arg(&script_name)
            .current_dir(&self.config.work_dir)
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                log::warn!("failed to start {}: {}", self.config.interpreter, e);
                return Ok(ExecutionResult::failed_to_start(e.to_string()));
            }
        };

        let (tx, mut rx) = mpsc::channel::<String>(64);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, tx.clone());
        }
        drop(tx);

        let started = std::time::Instant::now();
        let deadline = tokio::time::sleep(self.config.timeout);
        tokio::pin!(deadline);

        let mut transcript = String::new();
        let mut timed_out = false;
        loop {
            tokio::select! {
                line = rx.recv() => match line {
                    Some(line) => {
                        if let Some(observer) = &self.observer {
                            let _ = observer.try_send(line.clone());
                        }
                        transcript.push_str(&line);
                        transcript.push('\n');
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    timed_out = true;
                    break;
                }
            }
        }

        if !timed_out {
            // The child can outlive its streams (exec >/dev/null, daemonize);
            // the final wait stays bounded by whatever budget is left.
            let remaining = self.config.timeout.saturating_sub(started.elapsed());
            if let Ok(status) = tokio::time::timeout(remaining, child.wait()).await {
                let status = status?;
                return Ok(ExecutionResult {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: transcript,
                    stderr: String::new(),
                    timed_out: false,
                });
            }
        }

        // Deadline fired mid-stream, or the child outlived its streams
        let _ = child.kill().await;
        let _ = child.wait().await;
        log::warn!(
            "candidate script killed after {:?} timeout",
            self.config.timeout
        );
        Ok(ExecutionResult {
            exit_code: -1,
            stdout: transcript,
            stderr: format!("Timeout after {:?}", self.config.timeout),
            timed_out: true,
        })
    }
}

/// Forward lines from a child stream into the merged channel
fn spawn_line_reader<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}
