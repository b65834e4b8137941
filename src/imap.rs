//! Address validation and IMAP endpoint discovery

use log::{debug, warn};
use regex::Regex;

use crate::error::{MailforgeError, Result};
use crate::llm::{GenerationRequest, TextGenerator};

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// Default IMAP SSL port assumed when discovery yields none
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Check that `address` looks like a full email address
pub fn validate_email(address: &str) -> Result<()> {
    let re = Regex::new(EMAIL_PATTERN).map_err(|e| MailforgeError::InvalidInput(e.to_string()))?;
    if re.is_match(address) {
        Ok(())
    } else {
        Err(MailforgeError::InvalidInput(format!(
            "not a valid email address: {address}"
        )))
    }
}

/// Extract the domain part of an email address
pub fn domain_of(address: &str) -> Result<String> {
    validate_email(address)?;
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_lowercase())
        .ok_or_else(|| MailforgeError::InvalidInput(format!("no domain in address: {address}")))
}

/// Ask the generator for the IMAP endpoint of `domain`.
///
/// Expects `IMAP_SERVER:` and `IMAP_PORT:` lines in the response. Any
/// failure, including an unparseable reply, falls back to the domain itself
/// and port 993 rather than aborting the job.
pub async fn discover_imap(generator: &dyn TextGenerator, domain: &str) -> (String, u16) {
    let prompt = format!(
        "What are the IMAP server address and SSL port for the email domain '{domain}'? \
         Answer with exactly two lines:\nIMAP_SERVER: <hostname>\nIMAP_PORT: <port>"
    );
    let request = GenerationRequest::new(&prompt);

    match generator.generate(request).await {
        Ok(response) => match parse_imap_reply(&response.text) {
            Some((server, port)) => {
                debug!("discovered imap endpoint for {domain}: {server}:{port}");
                (server, port)
            }
            None => {
                warn!("unparseable imap discovery reply for {domain}; using defaults");
                (domain.to_string(), DEFAULT_IMAP_PORT)
            }
        },
        Err(e) => {
            warn!("imap discovery failed for {domain}: {e}; using defaults");
            (domain.to_string(), DEFAULT_IMAP_PORT)
        }
    }
}

fn parse_imap_reply(text: &str) -> Option<(String, u16)> {
    let mut server = None;
    let mut port = None;
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("IMAP_SERVER:") {
            let value = rest.trim();
            if !value.is_empty() {
                server = Some(value.to_string());
            }
        } else if let Some(rest) = line.strip_prefix("IMAP_PORT:") {
            if let Ok(value) = rest.trim().parse::<u16>() {
                port = Some(value);
            }
        }
    }
    server.map(|s| (s, port.unwrap_or(DEFAULT_IMAP_PORT)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockGenerator;

    #[test]
    fn test_validate_email_accepts_plain_address() {
        assert!(validate_email("alice@gmx.com").is_ok());
        assert!(validate_email("a.b+tag@mail.example.co").is_ok());
    }

    #[test]
    fn test_validate_email_rejects_malformed() {
        assert!(validate_email("alice").is_err());
        assert!(validate_email("alice@").is_err());
        assert!(validate_email("@gmx.com").is_err());
        assert!(validate_email("alice@gmx").is_err());
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("alice@GMX.com").unwrap(), "gmx.com");
        assert!(domain_of("not-an-address").is_err());
    }

    #[test]
    fn test_parse_imap_reply() {
        let reply = "Here you go:\nIMAP_SERVER: imap.gmx.com\nIMAP_PORT: 993\n";
        assert_eq!(
            parse_imap_reply(reply),
            Some(("imap.gmx.com".to_string(), 993))
        );
    }

    #[test]
    fn test_parse_imap_reply_missing_port_defaults() {
        let reply = "IMAP_SERVER: imap.gmx.com";
        assert_eq!(
            parse_imap_reply(reply),
            Some(("imap.gmx.com".to_string(), DEFAULT_IMAP_PORT))
        );
    }

    #[test]
    fn test_parse_imap_reply_missing_server_is_none() {
        assert_eq!(parse_imap_reply("IMAP_PORT: 993"), None);
        assert_eq!(parse_imap_reply("no structured lines here"), None);
    }

    #[tokio::test]
    async fn test_discover_imap_parses_reply() {
        let generator =
            MockGenerator::with_texts(vec!["IMAP_SERVER: imap.gmx.com\nIMAP_PORT: 993"]);
        let (server, port) = discover_imap(&generator, "gmx.com").await;
        assert_eq!(server, "imap.gmx.com");
        assert_eq!(port, 993);
    }

    #[tokio::test]
    async fn test_discover_imap_falls_back_on_error() {
        let generator = MockGenerator::new(vec![Err("boom".to_string())]);
        let (server, port) = discover_imap(&generator, "gmx.com").await;
        assert_eq!(server, "gmx.com");
        assert_eq!(port, DEFAULT_IMAP_PORT);
    }
}
