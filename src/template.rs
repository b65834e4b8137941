//! Template cache for verified download scripts
//!
//! A script that actually downloaded mail once is worth keeping: stored
//! redacted under its domain key, it short-circuits the generation loop for
//! every later job against the same provider. The store is injected as a
//! trait so tests can swap the filesystem for an in-memory fake.
//!
//! Concurrent stores for one domain are last-write-wins; the same domain
//! always overwrites the same path, and a slightly stale template is a benign
//! outcome.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::credentials::{self, Credentials};
use crate::error::{MailforgeError, Result};

/// A redacted, reusable download script keyed by target domain.
///
/// Stored text carries placeholder tokens only, never the credentials that
/// produced it.
#[derive(Debug, Clone)]
pub struct Template {
    pub domain_key: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    /// On-disk location, when the backing store has one
    pub path: Option<PathBuf>,
}

/// Injected key→blob store abstraction over cached templates
pub trait TemplateStore: Send + Sync {
    /// Pure read; absence is not an error, it signals "go generate"
    fn lookup(&self, domain: &str) -> Result<Option<Template>>;

    /// Redact and persist a verified script for this domain.
    /// Idempotent per domain: the same key always overwrites the same entry.
    fn store(&self, domain: &str, source: &str, creds: &Credentials) -> Result<Template>;
}

/// Filesystem-safe rendition of a domain string
pub fn sanitize_domain(domain: &str) -> String {
    domain
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

fn template_filename(domain: &str) -> String {
    format!("email_downloader_{}_template.py", sanitize_domain(domain))
}

/// Originating account for the provenance header, with the local part masked
/// so the header never reproduces the real identity
fn mask_account(username: &str) -> String {
    match username.split_once('@') {
        Some((local, domain)) => {
            let head: String = local.chars().take(1).collect();
            format!("{}***@{}", head, domain)
        }
        None => "***".to_string(),
    }
}

fn provenance_comment(created_at: DateTime<Utc>, creds: &Credentials, domain: &str) -> String {
    format!(
        "# Mailbox download template\n\
         # Created: {}\n\
         # Account: {}\n\
         # Domain: {}\n\
         #\n\
         # Placeholder tokens stand in for real credentials; they are\n\
         # substituted at run time.\n\n",
        created_at.format("%Y-%m-%d %H:%M:%S"),
        mask_account(&creds.username),
        domain
    )
}

/// Redacted script plus provenance. A script that already opens with a
/// shebang keeps it on line one and gets the provenance block right after;
/// otherwise a canonical python3 shebang is prepended with the block.
fn with_provenance(
    redacted: &str,
    created_at: DateTime<Utc>,
    creds: &Credentials,
    domain: &str,
) -> String {
    let comment = provenance_comment(created_at, creds, domain);
    if redacted.starts_with("#!") {
        match redacted.split_once('\n') {
            Some((shebang, body)) => format!("{}\n{}{}", shebang, comment, body),
            None => format!("{}\n{}", redacted, comment),
        }
    } else {
        format!(
            "#!/usr/bin/env python3\n# -*- coding: utf-8 -*-\n{}{}",
            comment, redacted
        )
    }
}

/// Template store backed by one file per domain
pub struct FsTemplateStore {
    dir: PathBuf,
}

impl FsTemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path a given domain's template lives at
    pub fn template_path(&self, domain: &str) -> PathBuf {
        self.dir.join(template_filename(domain))
    }

    /// All templates currently cached
    pub fn list(&self) -> Result<Vec<Template>> {
        let mut templates = Vec::new();
        if !self.dir.exists() {
            return Ok(templates);
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if let Some(domain) = name
                .strip_prefix("email_downloader_")
                .and_then(|n| n.strip_suffix("_template.py"))
            {
                if let Some(template) = self.read_template(domain, &path)? {
                    templates.push(template);
                }
            }
        }
        Ok(templates)
    }

    fn read_template(&self, domain: &str, path: &Path) -> Result<Option<Template>> {
        if !path.is_file() {
            return Ok(None);
        }
        let source = std::fs::read_to_string(path)?;
        let created_at = std::fs::metadata(path)?
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(Some(Template {
            domain_key: sanitize_domain(domain),
            source,
            created_at,
            path: Some(path.to_path_buf()),
        }))
    }
}

impl TemplateStore for FsTemplateStore {
    fn lookup(&self, domain: &str) -> Result<Option<Template>> {
        let path = self.template_path(domain);
        log::debug!("template lookup for {}: {}", domain, path.display());
        self.read_template(domain, &path)
    }

    fn store(&self, domain: &str, source: &str, creds: &Credentials) -> Result<Template> {
        std::fs::create_dir_all(&self.dir)?;

        let created_at = Utc::now();
        let redacted = credentials::redact(source, creds);
        let text = with_provenance(&redacted, created_at, creds, domain);

        let path = self.template_path(domain);
        std::fs::write(&path, &text)
            .map_err(|e| MailforgeError::Template(format!("{}: {}", path.display(), e)))?;
        log::info!("cached template for {} at {}", domain, path.display());

        Ok(Template {
            domain_key: sanitize_domain(domain),
            source: text,
            created_at,
            path: Some(path),
        })
    }
}

/// In-memory template store for tests
#[derive(Default)]
pub struct MemoryTemplateStore {
    templates: RwLock<HashMap<String, Template>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn lookup(&self, domain: &str) -> Result<Option<Template>> {
        let templates = self
            .templates
            .read()
            .map_err(|e| MailforgeError::Template(e.to_string()))?;
        Ok(templates.get(&sanitize_domain(domain)).cloned())
    }

    fn store(&self, domain: &str, source: &str, creds: &Credentials) -> Result<Template> {
        let template = Template {
            domain_key: sanitize_domain(domain),
            source: credentials::redact(source, creds),
            created_at: Utc::now(),
            path: None,
        };
        let mut templates = self
            .templates
            .write()
            .map_err(|e| MailforgeError::Template(e.to_string()))?;
        templates.insert(template.domain_key.clone(), template.clone());
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn creds() -> Credentials {
        Credentials::new("a@gmx.com", "p4ss-w0rd")
    }

    #[test]
    fn test_sanitize_domain() {
        assert_eq!(sanitize_domain("gmx.com"), "gmx.com");
        assert_eq!(sanitize_domain("gmx.com/../evil"), "gmx.com..evil");
        assert_eq!(sanitize_domain("mail server!"), "mailserver");
        assert_eq!(sanitize_domain(".hidden."), "hidden");
    }

    #[test]
    fn test_template_filename() {
        assert_eq!(
            template_filename("gmx.com"),
            "email_downloader_gmx.com_template.py"
        );
    }

    #[test]
    fn test_mask_account() {
        assert_eq!(mask_account("alice@gmx.com"), "a***@gmx.com");
        assert_eq!(mask_account("not-an-address"), "***");
    }

    #[test]
    fn test_lookup_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FsTemplateStore::new(dir.path());
        assert!(store.lookup("gmx.com").unwrap().is_none());
    }

    #[test]
    fn test_store_then_lookup() {
        let dir = TempDir::new().unwrap();
        let store = FsTemplateStore::new(dir.path());

        let stored = store
            .store("gmx.com", "email_address = \"a@gmx.com\"\nprint(1)", &creds())
            .unwrap();
        assert_eq!(stored.domain_key, "gmx.com");

        let found = store.lookup("gmx.com").unwrap().expect("template exists");
        assert_eq!(found.source, stored.source);
        assert_eq!(found.path, stored.path);
    }

    #[test]
    fn test_stored_text_never_contains_credentials() {
        let dir = TempDir::new().unwrap();
        let store = FsTemplateStore::new(dir.path());

        let source = "email_address = \"a@gmx.com\"\npassword = \"p4ss-w0rd\"\nlogin(\"a@gmx.com\", \"p4ss-w0rd\")";
        let stored = store.store("gmx.com", source, &creds()).unwrap();

        assert!(!stored.source.contains("a@gmx.com"));
        assert!(!stored.source.contains("p4ss-w0rd"));
        assert!(stored.source.contains(credentials::PLACEHOLDER_EMAIL));
        assert!(stored.source.contains(credentials::PLACEHOLDER_PASSWORD));
    }

    #[test]
    fn test_store_prepends_provenance_header() {
        let dir = TempDir::new().unwrap();
        let store = FsTemplateStore::new(dir.path());

        let stored = store.store("gmx.com", "print(1)", &creds()).unwrap();
        assert!(stored.source.starts_with("#!/usr/bin/env python3"));
        assert!(stored.source.contains("# Domain: gmx.com"));
        assert!(stored.source.contains("# Account: a***@gmx.com"));
    }

    #[test]
    fn test_store_keeps_existing_shebang_and_adds_provenance() {
        let dir = TempDir::new().unwrap();
        let store = FsTemplateStore::new(dir.path());

        let stored = store
            .store("gmx.com", "#!/usr/bin/env python3\nprint(1)", &creds())
            .unwrap();

        // Shebang stays on line one and is not duplicated
        assert!(stored.source.starts_with("#!/usr/bin/env python3\n"));
        assert_eq!(stored.source.matches("#!/usr/bin/env python3").count(), 1);
        assert!(stored.source.contains("# Created:"));
        assert!(stored.source.contains("# Domain: gmx.com"));
        assert!(stored.source.contains("# Account: a***@gmx.com"));
        assert!(stored.source.contains("print(1)"));
    }

    #[test]
    fn test_store_is_idempotent_per_domain() {
        let dir = TempDir::new().unwrap();
        let store = FsTemplateStore::new(dir.path());

        let first = store.store("gmx.com", "print(1)", &creds()).unwrap();
        let second = store.store("gmx.com", "print(2)", &creds()).unwrap();
        assert_eq!(first.path, second.path);

        // Last write wins
        let found = store.lookup("gmx.com").unwrap().expect("template exists");
        assert!(found.source.contains("print(2)"));
        assert!(!found.source.contains("print(1)"));
    }

    #[test]
    fn test_list_templates() {
        let dir = TempDir::new().unwrap();
        let store = FsTemplateStore::new(dir.path());
        store.store("gmx.com", "print(1)", &creds()).unwrap();
        store.store("rambler.ru", "print(2)", &creds()).unwrap();

        let mut domains: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|t| t.domain_key)
            .collect();
        domains.sort();
        assert_eq!(domains, vec!["gmx.com", "rambler.ru"]);
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryTemplateStore::new();
        assert!(store.lookup("gmx.com").unwrap().is_none());

        store
            .store("gmx.com", "password = \"p4ss-w0rd\"", &creds())
            .unwrap();
        let found = store.lookup("gmx.com").unwrap().expect("template exists");
        assert!(!found.source.contains("p4ss-w0rd"));
        assert!(found.path.is_none());
    }
}
