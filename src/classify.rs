//! Outcome classification for candidate script runs
//!
//! The script's output format is itself machine-generated, so no single
//! signal is trustworthy. Classification walks an explicit ordered rule list,
//! combining direct text indicators with independent filesystem evidence;
//! negative indicators always beat positive ones, and the final optimistic
//! default accepts absence of failure language as a weak success signal.

use std::path::{Path, PathBuf};

use crate::sandbox::ExecutionResult;

/// Phrases that mark a run as failed regardless of anything else the
/// output claims (both languages the generated scripts tend to print in)
const NEGATIVE_INDICATORS: &[&str] = &[
    "登录失败",
    "login failed",
    "authentication failed",
    "密码错误",
    "password error",
    "用户名错误",
    "username error",
    "下载失败",
    "download failed",
    "连接失败",
    "connection failed",
    "imap error",
    "无法连接",
    "cannot connect",
    "授权码错误",
    "authorization code error",
];

/// Phrases that mark a run as successful
const POSITIVE_INDICATORS: &[&str] = &[
    "邮件下载完成",
    "下载完成",
    "download complete",
    "successfully downloaded",
    "邮件保存成功",
    "emails saved",
    "下载了",
    "downloaded",
    "保存到",
    "saved to",
    "成功下载邮件数量",
    "成功下载",
    "邮件数量",
    "任务完成",
    "总共成功下载",
];

/// Filename markers for downloaded mail artifacts
const MAIL_EXTENSIONS: &[&str] = &[".eml", ".msg"];

/// Which rule in the ordered list decided the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Non-zero exit code: immediate failure, nothing else is consulted
    NonZeroExit,
    /// A negative indicator phrase appeared in the output
    NegativeMatch,
    /// A positive indicator phrase appeared in the output
    PositiveMatch,
    /// Mail artifacts found on disk under the expected tree
    FilesystemEvidence,
    /// Non-empty output with no failure language: tentative success
    OptimisticDefault,
    /// Nothing spoke for success
    NoEvidence,
}

/// Verdict over one execution, consumed immediately by the repair loop
#[derive(Debug, Clone)]
pub struct Verdict {
    pub is_success: bool,
    pub rule: Rule,
    pub evidence: Vec<String>,
}

impl Verdict {
    fn success(rule: Rule, evidence: Vec<String>) -> Self {
        Self {
            is_success: true,
            rule,
            evidence,
        }
    }

    fn failure(rule: Rule, evidence: Vec<String>) -> Self {
        Self {
            is_success: false,
            rule,
            evidence,
        }
    }
}

/// Invocation context for the filesystem probes
#[derive(Debug, Clone)]
pub struct ClassifyContext {
    /// Conventional artifact tree: `<root>/<domain>/<user>/<date>/`
    pub artifact_root: PathBuf,
    /// Execution directory, probed with the legacy loose naming convention
    pub work_dir: PathBuf,
}

/// Classify one execution result against the ordered rule list
pub fn classify(result: &ExecutionResult, ctx: &ClassifyContext) -> Verdict {
    if result.exit_code != 0 {
        let mut evidence = vec![format!("exit code {}", result.exit_code)];
        if result.timed_out {
            evidence.push("execution timed out".to_string());
        }
        return Verdict::failure(Rule::NonZeroExit, evidence);
    }

    let stdout = result.stdout.to_lowercase();
    let stderr = result.stderr.to_lowercase();

    for indicator in NEGATIVE_INDICATORS {
        if stdout.contains(indicator) || stderr.contains(indicator) {
            return Verdict::failure(
                Rule::NegativeMatch,
                vec![format!("negative indicator: {}", indicator)],
            );
        }
    }

    for indicator in POSITIVE_INDICATORS {
        if stdout.contains(indicator) {
            return Verdict::success(
                Rule::PositiveMatch,
                vec![format!("positive indicator: {}", indicator)],
            );
        }
    }

    if let Some(path) = probe_artifact_root(&ctx.artifact_root) {
        return Verdict::success(
            Rule::FilesystemEvidence,
            vec![format!("mail artifact found: {}", path.display())],
        );
    }
    if let Some(path) = probe_legacy_layout(&ctx.work_dir) {
        return Verdict::success(
            Rule::FilesystemEvidence,
            vec![format!("legacy mail directory found: {}", path.display())],
        );
    }

    if !stdout.trim().is_empty() {
        return Verdict::success(
            Rule::OptimisticDefault,
            vec!["output present with no failure indicator".to_string()],
        );
    }

    Verdict::failure(
        Rule::NoEvidence,
        vec!["no output, no artifacts".to_string()],
    )
}

fn is_mail_artifact(name: &str) -> bool {
    let name = name.to_lowercase();
    MAIL_EXTENSIONS.iter().any(|ext| name.contains(ext))
}

/// Probe `<root>/<domain>/<user>/<date>/` for any mail artifact
fn probe_artifact_root(root: &Path) -> Option<PathBuf> {
    let pattern = format!("{}/*/*/*/*", root.display());
    for entry in glob::glob(&pattern).ok()?.flatten() {
        if !entry.is_file() {
            continue;
        }
        let name = entry.file_name()?.to_string_lossy().to_string();
        if is_mail_artifact(&name) {
            return Some(entry);
        }
    }
    None
}

/// Legacy convention: a mail-keyword or underscore directory one level under
/// the work dir, containing mail-ish files. A fallback signal only, kept as
/// loose as the layout it tolerates.
fn probe_legacy_layout(work_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(work_dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let dir_name = entry.file_name().to_string_lossy().to_lowercase();
        if dir_name == "email" {
            // The conventional tree is handled by the primary probe
            continue;
        }
        if !(dir_name.contains("email") || dir_name.contains("mail") || dir_name.contains('_')) {
            continue;
        }
        let files = std::fs::read_dir(&path).ok()?;
        for file in files.flatten() {
            let name = file.file_name().to_string_lossy().to_lowercase();
            if is_mail_artifact(&name) || name.contains("email") || name.contains("mail") {
                return Some(path);
            }
        }
    }
    None
}

/// Count mail artifacts and their total size for a single account's subtree.
/// Feeds the end-of-job ledger summary.
pub fn count_artifacts(root: &Path, domain: &str, local_part: &str) -> (u64, u64) {
    let pattern = format!("{}/{}/{}/*/*", root.display(), domain, local_part);
    let mut count = 0u64;
    let mut bytes = 0u64;
    if let Ok(paths) = glob::glob(&pattern) {
        for entry in paths.flatten() {
            if !entry.is_file() {
                continue;
            }
            let name = entry
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if is_mail_artifact(&name) {
                count += 1;
                if let Ok(meta) = entry.metadata() {
                    bytes += meta.len();
                }
            }
        }
    }
    (count, bytes)
}
