//! Credential injection and redaction
//!
//! Generated scripts tend to hardcode credential assignments under a handful
//! of common variable names. Injection rewrites those assignments to the
//! caller-supplied values without touching program structure; redaction is the
//! inverse, substituting fixed placeholder tokens so a cached template never
//! carries a real identity or secret. Both directions share one spelling
//! table and apply first-match-wins per line and category, which keeps a
//! single statement from being rewritten twice.

use regex::{NoExpand, Regex};

pub const PLACEHOLDER_EMAIL: &str = "your_email@example.com";
pub const PLACEHOLDER_USERNAME: &str = "your_username";
pub const PLACEHOLDER_PASSWORD: &str = "your_password";
pub const PLACEHOLDER_AUTH_CODE: &str = "your_auth_code";
pub const PLACEHOLDER_TOKEN: &str = "your_token";
pub const PLACEHOLDER_KEY: &str = "your_key";

/// Trailing marker appended to rewritten lines that carry no comment yet
const INJECTION_MARK: &str = "  # credential injected at run time";

/// Identity-holding variable spellings and their redaction placeholders.
/// Order matters: longer spellings first so `email_address` is not caught by
/// the `email` pattern.
const IDENTITY_NAMES: &[(&str, &str)] = &[
    ("email_address", PLACEHOLDER_EMAIL),
    ("username", PLACEHOLDER_USERNAME),
    ("user", PLACEHOLDER_USERNAME),
    ("email", PLACEHOLDER_EMAIL),
    ("account", PLACEHOLDER_USERNAME),
];

/// Secret-holding variable spellings and their redaction placeholders
const SECRET_NAMES: &[(&str, &str)] = &[
    ("password", PLACEHOLDER_PASSWORD),
    ("passwd", PLACEHOLDER_PASSWORD),
    ("auth_code", PLACEHOLDER_AUTH_CODE),
    ("token", PLACEHOLDER_TOKEN),
    ("key", PLACEHOLDER_KEY),
];

/// Caller-supplied account identity and secret for one job.
///
/// Never persisted in plaintext inside a template; diagnostic output reports
/// the identity only.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// Domain key: the portion after the address separator
    pub fn domain(&self) -> Option<&str> {
        self.username.split_once('@').map(|(_, d)| d)
    }

    /// Local part of the account identity
    pub fn local_part(&self) -> &str {
        self.username
            .split_once('@')
            .map(|(l, _)| l)
            .unwrap_or(&self.username)
    }

    fn is_empty(&self) -> bool {
        self.username.is_empty() && self.secret.is_empty()
    }
}

fn assignment_pattern(name: &str) -> Option<Regex> {
    Regex::new(&format!(r#"\b{}\s*=\s*["'][^"']*["']"#, name)).ok()
}

/// Rewrite the first matching assignment in `line` to `value`.
/// Returns None when no spelling in the table matches.
fn rewrite_line(line: &str, table: &[(&str, &str)], value: &str) -> Option<String> {
    for (name, _) in table {
        if let Some(re) = assignment_pattern(name) {
            if re.is_match(line) {
                let replacement = format!("{} = \"{}\"", name, value);
                return Some(re.replace(line, NoExpand(&replacement)).into_owned());
            }
        }
    }
    None
}

/// Substitute placeholder-style placeholders for `line`'s first matching
/// assignment, using each spelling's own placeholder token.
fn redact_line(line: &str, table: &[(&str, &str)]) -> Option<String> {
    for (name, placeholder) in table {
        if let Some(re) = assignment_pattern(name) {
            if re.is_match(line) {
                let replacement = format!("{} = \"{}\"", name, placeholder);
                return Some(re.replace(line, NoExpand(&replacement)).into_owned());
            }
        }
    }
    None
}

/// Rewrite recognized credential assignments to the supplied values.
///
/// No-op when both username and secret are absent. Changed lines gain a
/// trailing marker comment unless they already carry one.
pub fn inject(source: &str, creds: &Credentials) -> String {
    if creds.is_empty() {
        return source.to_string();
    }

    let mut out = Vec::new();
    for line in source.lines() {
        let mut current = line.to_string();
        let mut changed = false;

        if !creds.username.is_empty() {
            if let Some(rewritten) = rewrite_line(&current, IDENTITY_NAMES, &creds.username) {
                current = rewritten;
                changed = true;
            }
        }
        if !creds.secret.is_empty() {
            if let Some(rewritten) = rewrite_line(&current, SECRET_NAMES, &creds.secret) {
                current = rewritten;
                changed = true;
            }
        }

        if changed && !current.contains('#') {
            current.push_str(INJECTION_MARK);
        }
        out.push(current);
    }
    out.join("\n")
}

/// Substitute placeholder tokens back over any credential material.
///
/// Line-level pass over the spelling table, then a sweep for the literal
/// quoted values anywhere else, so the result never contains the caller's
/// identity or secret.
pub fn redact(source: &str, creds: &Credentials) -> String {
    let mut out = Vec::new();
    for line in source.lines() {
        let mut current = line.to_string();
        if let Some(rewritten) = redact_line(&current, IDENTITY_NAMES) {
            current = rewritten;
        }
        if let Some(rewritten) = redact_line(&current, SECRET_NAMES) {
            current = rewritten;
        }
        out.push(current);
    }
    let mut text = out.join("\n");

    for (literal, placeholder) in [
        (&creds.username, PLACEHOLDER_EMAIL),
        (&creds.secret, PLACEHOLDER_PASSWORD),
    ] {
        if literal.is_empty() {
            continue;
        }
        for quote in ['"', '\''] {
            let needle = format!("{}{}{}", quote, literal, quote);
            let substitute = format!("{}{}{}", quote, placeholder, quote);
            text = text.replace(&needle, &substitute);
        }
    }
    text
}
