//! Prompt construction for the generate/repair loop
//!
//! Three prompt shapes: the enriched initial prompt, a more directive prompt
//! used when a response contained no extractable code, and the corrective
//! repair prompt that embeds the previous fragment and its failure evidence.
//! Every shape reiterates the hard constraints so each regenerated fragment
//! stays a drop-in replacement rather than a structural departure.
//!
//! The secret value itself never enters a prompt; scripts receive it through
//! local injection after generation.

use crate::credentials::Credentials;

/// Upper bound on repair prompt size, in characters
pub const PROMPT_CHAR_BUDGET: usize = 8000;

/// Prefix of the previous fragment kept when truncating
const FRAGMENT_PREVIEW_CHARS: usize = 2000;

/// Suffix of the failure evidence kept when truncating
const EVIDENCE_PREVIEW_CHARS: usize = 2000;

/// Base task description used when the caller supplies none
pub const DEFAULT_BASE_PROMPT: &str = "You are a professional software developer. Write a Python script that \
logs into a mailbox over IMAP and downloads every message to local storage. The script must: \
1) choose the authentication method from the mailbox domain (mainstream providers such as Gmail, \
Outlook, Yahoo, 163 and QQ use auth codes, other providers use the account password); \
2) connect to the IMAP server over SSL; \
3) save every email under email/<domain>/<username>/<date>/<subject>.eml next to the script, \
reusing a single date directory for the whole run; \
4) print progress while downloading and a clear final success or failure message with the number \
of emails downloaded. Return only the Python code, no other text.";

/// Build the enriched first-attempt prompt from the job parameters
pub fn initial_prompt(
    base: &str,
    creds: &Credentials,
    domain: &str,
    imap_server: Option<&str>,
    imap_port: Option<u16>,
    preferred_language: &str,
) -> String {
    let mut prompt = base.to_string();

    if !creds.username.is_empty() {
        prompt.push_str(&format!(
            "\n\nImportant: the username is '{}'. The script must use it directly; do not \
             hardcode a different value and do not prompt for input.",
            creds.username
        ));
    }
    if !creds.secret.is_empty() {
        prompt.push_str(
            "\n\nImportant: the password/auth code has been provided and will be substituted \
             into the script before execution. Use a plain string assignment for it; do not \
             prompt for input.",
        );
    }

    prompt.push_str("\n\nMailbox configuration:");
    prompt.push_str(&format!("\n- Domain: {}", domain));
    match imap_server {
        Some(server) => {
            prompt.push_str(&format!("\n- IMAP server: {}", server));
            prompt.push_str(&format!("\n- IMAP port: {}", imap_port.unwrap_or(993)));
        }
        None => {
            prompt.push_str(
                "\n- Infer the IMAP server address and port from the domain \
                 (e.g. rambler.ru -> imap.rambler.ru:993)",
            );
        }
    }

    let path_example = format!(
        "email/{}/{}/20250902/<subject>.eml",
        domain,
        creds.local_part()
    );
    prompt.push_str(&format!(
        "\n\nScript requirements:\n\
         1. Use the supplied username and password/auth code directly; never hardcode other \
         values and never prompt interactively.\n\
         2. Use the supplied IMAP server and port when given; otherwise infer them from the domain.\n\
         3. Print an explicit success or failure message when the script finishes.\n\
         4. Print the number of emails downloaded on success.\n\
         5. Save emails under {} relative to the script.\n\
         6. Use one date directory for the entire run; do not create a new date directory per email.\n\
         7. Return only a single ```{}``` code block.",
        path_example, preferred_language
    ));

    prompt
}

/// Reissued when a response produced no extractable fragment
pub fn directive_prompt(base: &str, preferred_language: &str) -> String {
    format!(
        "{}\n\nReturn only a single ```{}``` code block containing the complete runnable \
         script. Do not include any explanation text, only the code.",
        base, preferred_language
    )
}

/// First `n` characters, whole characters only
fn char_prefix(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Last `n` characters, whole characters only
fn char_suffix(text: &str, n: usize) -> &str {
    let total = text.chars().count();
    if total <= n {
        return text;
    }
    match text.char_indices().nth(total - n) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

fn render_evidence(stderr: &str, stdout: &str) -> String {
    let mut evidence = String::new();
    if !stderr.trim().is_empty() {
        evidence.push_str(&format!("Error output:\n{}\n\n", stderr));
    }
    if !stdout.trim().is_empty() {
        evidence.push_str(&format!("Program output:\n{}\n\n", stdout));
    }
    if evidence.trim().is_empty() {
        evidence = "The script finished without any clear success indication; check the \
                    login and download logic.\n"
            .to_string();
    }
    evidence
}

const REPAIR_CONSTRAINTS: &str = "Fix the problems in the script above and return the complete runnable script as a \
single code block. Keep in mind:\n\
1. Keep the script's overall structure and logic; fix only what caused the failure.\n\
2. Do not rewrite the script from scratch.\n\
3. Use the supplied username and password/auth code directly; never hardcode other values \
and never prompt interactively.\n\
4. Make sure the fixed script actually downloads the mailbox and prints a clear result.";

fn render_repair(fragment: &str, evidence: &str, preferred_language: &str, truncated: bool) -> String {
    let marker = if truncated { " (truncated)" } else { "" };
    format!(
        "The previously generated script failed when executed. Repair it, starting from the \
         script below:\n\n\
         === Previous script{} ===\n\
         ```{}\n{}\n```\n\n\
         === Execution result{} ===\n{}\n{}",
        marker, preferred_language, fragment, marker, evidence, REPAIR_CONSTRAINTS
    )
}

/// Build the corrective prompt for the next attempt.
///
/// Embeds the full previous fragment and failure evidence when they fit the
/// character budget; otherwise both are cut to bounded previews (fragment
/// prefix, evidence suffix) and the prompt says so.
pub fn repair_prompt(
    previous_fragment: &str,
    stderr: &str,
    stdout: &str,
    preferred_language: &str,
) -> String {
    let evidence = render_evidence(stderr, stdout);
    let full = render_repair(previous_fragment, &evidence, preferred_language, false);
    if full.chars().count() <= PROMPT_CHAR_BUDGET {
        return full;
    }

    let fragment_preview = format!(
        "{}\n... (script content truncated)",
        char_prefix(previous_fragment, FRAGMENT_PREVIEW_CHARS)
    );
    let evidence_preview = format!(
        "... (earlier output truncated)\n{}",
        char_suffix(&evidence, EVIDENCE_PREVIEW_CHARS)
    );
    render_repair(&fragment_preview, &evidence_preview, preferred_language, true)
}
