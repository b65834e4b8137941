//! Bounded generate/execute/classify/repair loop
//!
//! The controller drives one mailbox job: consult the template cache, then
//! generate a candidate script, run it in the sandbox, classify the outcome,
//! and either persist a redacted template or feed the failure evidence back
//! into a repair prompt. The attempt budget bounds generation calls; a cached
//! template that fails consumes no budget, it only loses its short-circuit.
//!
//! Collaborators arrive as injected trait objects so tests run the full loop
//! against scripted generators and in-memory stores.

use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};

use crate::classify::{self, ClassifyContext};
use crate::credentials::Credentials;
use crate::error::Result;
use crate::extract::{self, language_extension};
use crate::id;
use crate::llm::{GenerationRequest, GenerationResponse, TextGenerator};
use crate::prompt::{self, DEFAULT_BASE_PROMPT};
use crate::report::{AttemptEvent, AttemptStatus, JobReporter, JobSummary};
use crate::sandbox::Sandbox;
use crate::template::TemplateStore;

/// Default generation budget per job
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Everything the loop needs to run one mailbox job
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_id: String,
    pub base_prompt: String,
    pub credentials: Credentials,
    pub domain: String,
    pub imap_server: Option<String>,
    pub imap_port: Option<u16>,
    pub preferred_language: String,
    pub max_attempts: u32,
}

impl JobSpec {
    pub fn new(credentials: Credentials, domain: impl Into<String>) -> Self {
        Self {
            job_id: id::generate_job_id(),
            base_prompt: DEFAULT_BASE_PROMPT.to_string(),
            credentials,
            domain: domain.into(),
            imap_server: None,
            imap_port: None,
            preferred_language: "python".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_imap(mut self, server: impl Into<String>, port: u16) -> Self {
        self.imap_server = Some(server.into());
        self.imap_port = Some(port);
        self
    }

    pub fn with_base_prompt(mut self, base_prompt: impl Into<String>) -> Self {
        self.base_prompt = base_prompt.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.preferred_language = language.into();
        self
    }
}

/// Terminal state of one job
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// A script was verified; `attempts` is 0 when served from cache
    Complete {
        attempts: u32,
        from_cache: bool,
        template_path: Option<PathBuf>,
    },
    /// Budget exhausted without a verified script
    Failed { attempts: u32, evidence: Vec<String> },
    /// Text generation failed terminally mid-job
    ApiError { attempts: u32, detail: String },
}

impl JobOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, JobOutcome::Complete { .. })
    }
}

/// The job controller; one instance can run many jobs sequentially
pub struct RepairLoop<G: TextGenerator, S: TemplateStore, R: JobReporter> {
    generator: Arc<G>,
    store: Arc<S>,
    reporter: Arc<R>,
    sandbox: Sandbox,
    classify_ctx: ClassifyContext,
    /// Per-attempt artifacts land under `<runs_dir>/gen_<job_id>/attempt_N/`
    runs_dir: PathBuf,
}

impl<G: TextGenerator, S: TemplateStore, R: JobReporter> RepairLoop<G, S, R> {
    pub fn new(
        generator: Arc<G>,
        store: Arc<S>,
        reporter: Arc<R>,
        sandbox: Sandbox,
        classify_ctx: ClassifyContext,
        runs_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            generator,
            store,
            reporter,
            sandbox,
            classify_ctx,
            runs_dir: runs_dir.into(),
        }
    }

    /// Run one job to a terminal outcome
    pub async fn run(&self, spec: &JobSpec) -> Result<JobOutcome> {
        info!(
            "job {} starting for domain {} (budget {})",
            spec.job_id, spec.domain, spec.max_attempts
        );

        if let Some(outcome) = self.try_cached(spec).await? {
            return Ok(outcome);
        }

        let attempts_root = self.runs_dir.join(format!("gen_{}", spec.job_id));
        let mut next_prompt = prompt::initial_prompt(
            &spec.base_prompt,
            &spec.credentials,
            &spec.domain,
            spec.imap_server.as_deref(),
            spec.imap_port,
            &spec.preferred_language,
        );
        let mut last_evidence = vec!["no attempt produced runnable code".to_string()];

        for attempt in 1..=spec.max_attempts {
            let request = GenerationRequest::new(&next_prompt);
            let response = match self.generator.generate(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("job {} attempt {}: generation failed: {e}", spec.job_id, attempt);
                    self.reporter.attempt(&AttemptEvent::new(
                        &spec.job_id,
                        attempt,
                        AttemptStatus::ApiError,
                    ))?;
                    return Ok(JobOutcome::ApiError {
                        attempts: attempt,
                        detail: e.to_string(),
                    });
                }
            };

            let attempt_dir = attempts_root.join(format!("attempt_{attempt}"));
            let fragments = extract::extract_fragments(&response.text, &spec.preferred_language);
            self.persist_attempt(&attempt_dir, &response, &fragments)?;

            let Some(fragment) = extract::primary_fragment(&fragments) else {
                info!("job {} attempt {}: no code in response", spec.job_id, attempt);
                self.reporter.attempt(
                    &AttemptEvent::new(&spec.job_id, attempt, AttemptStatus::NoEntry)
                        .with_dir(attempt_dir),
                )?;
                next_prompt =
                    prompt::directive_prompt(&spec.base_prompt, &spec.preferred_language);
                continue;
            };

            let result = self
                .sandbox
                .run(&fragment.source, &spec.credentials, &spec.job_id)
                .await?;
            std::fs::write(attempt_dir.join("stdout.txt"), &result.stdout)?;
            std::fs::write(attempt_dir.join("exit_code.txt"), result.exit_code.to_string())?;

            let verdict = classify::classify(&result, &self.classify_ctx);
            info!(
                "job {} attempt {}: {:?} (success={})",
                spec.job_id, attempt, verdict.rule, verdict.is_success
            );

            if verdict.is_success {
                let template = self
                    .store
                    .store(&spec.domain, &fragment.source, &spec.credentials)?;
                self.reporter.attempt(
                    &AttemptEvent::new(&spec.job_id, attempt, AttemptStatus::Success)
                        .with_dir(attempt_dir),
                )?;
                self.report_summary(spec, attempt, template.path.clone())?;
                return Ok(JobOutcome::Complete {
                    attempts: attempt,
                    from_cache: false,
                    template_path: template.path,
                });
            }

            self.reporter.attempt(
                &AttemptEvent::new(&spec.job_id, attempt, AttemptStatus::Retry)
                    .with_dir(attempt_dir),
            )?;
            last_evidence = verdict.evidence;
            next_prompt = prompt::repair_prompt(
                &fragment.source,
                &result.stderr,
                &result.stdout,
                &spec.preferred_language,
            );
        }

        warn!(
            "job {} exhausted {} attempts without a verified script",
            spec.job_id, spec.max_attempts
        );
        Ok(JobOutcome::Failed {
            attempts: spec.max_attempts,
            evidence: last_evidence,
        })
    }

    /// Run a cached template first if one exists.
    ///
    /// A failing cached template is reported but does not count against the
    /// generation budget; the loop falls through to fresh generation.
    async fn try_cached(&self, spec: &JobSpec) -> Result<Option<JobOutcome>> {
        let Some(template) = self.store.lookup(&spec.domain)? else {
            return Ok(None);
        };

        info!(
            "job {}: trying cached template for {}",
            spec.job_id, spec.domain
        );
        let result = self
            .sandbox
            .run(&template.source, &spec.credentials, &spec.job_id)
            .await?;
        let verdict = classify::classify(&result, &self.classify_ctx);

        if verdict.is_success {
            self.reporter
                .attempt(&AttemptEvent::new(&spec.job_id, 0, AttemptStatus::Success))?;
            self.report_summary(spec, 0, template.path.clone())?;
            return Ok(Some(JobOutcome::Complete {
                attempts: 0,
                from_cache: true,
                template_path: template.path,
            }));
        }

        info!(
            "job {}: cached template failed ({:?}); generating fresh",
            spec.job_id, verdict.rule
        );
        Ok(None)
    }

    fn persist_attempt(
        &self,
        attempt_dir: &std::path::Path,
        response: &GenerationResponse,
        fragments: &[extract::CodeFragment],
    ) -> Result<()> {
        std::fs::create_dir_all(attempt_dir)?;
        std::fs::write(
            attempt_dir.join("response.json"),
            serde_json::to_string_pretty(response)?,
        )?;
        std::fs::write(attempt_dir.join("answer.txt"), &response.text)?;
        for (i, fragment) in fragments.iter().enumerate() {
            let ext = language_extension(&fragment.language);
            std::fs::write(
                attempt_dir.join(format!("fragment_{i}.{ext}")),
                &fragment.source,
            )?;
        }
        Ok(())
    }

    fn report_summary(
        &self,
        spec: &JobSpec,
        attempts: u32,
        template_path: Option<PathBuf>,
    ) -> Result<()> {
        let (emails_found, bytes_archived) = classify::count_artifacts(
            &self.classify_ctx.artifact_root,
            &spec.domain,
            spec.credentials.local_part(),
        );
        self.reporter.summary(&JobSummary {
            job_id: spec.job_id.clone(),
            attempts,
            emails_found,
            bytes_archived,
            template_path,
        })
    }
}
