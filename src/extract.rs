//! Code block extraction from generated text
//!
//! Generated responses arrive as free-form prose with zero or more fenced
//! code blocks. Extraction is a pure transform: it never touches the
//! filesystem, and an empty input simply yields an empty list (the controller
//! treats that as "no entry produced" and retries with a directive prompt).

use regex::Regex;

/// One candidate program extracted from a generated response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFragment {
    /// Lowercased fence label, empty when the block carried none
    pub language: String,
    pub source: String,
}

impl CodeFragment {
    fn new(language: &str, source: &str) -> Self {
        Self {
            language: language.trim().to_lowercase(),
            source: normalize(source),
        }
    }
}

/// Strip a leading BOM and surrounding blank lines
fn normalize(source: &str) -> String {
    source
        .trim_start_matches('\u{feff}')
        .trim_matches(['\n', '\r'])
        .to_string()
}

/// Extract fragments in priority order, preferred language sorted first.
///
/// 1. Fenced blocks with an explicit language label
/// 2. Any fenced block regardless of label
/// 3. Text that opens with a fence: strip the first and last fence lines
/// 4. The whole text with stray standalone fence lines removed
pub fn extract_fragments(text: &str, preferred_language: &str) -> Vec<CodeFragment> {
    let mut fragments = Vec::new();

    let patterns = [
        r"```[ \t]*([a-zA-Z0-9_+\-]+)\r?\n([\s\S]*?)```",
        r"```\r?\n([\s\S]*?)```",
    ];
    for pattern in patterns {
        if let Ok(re) = Regex::new(pattern) {
            for captures in re.captures_iter(text) {
                match (captures.get(1), captures.get(2)) {
                    (Some(lang), Some(body)) => {
                        fragments.push(CodeFragment::new(lang.as_str(), body.as_str()));
                    }
                    (Some(body), None) => {
                        fragments.push(CodeFragment::new("", body.as_str()));
                    }
                    _ => {}
                }
            }
        }
        if !fragments.is_empty() {
            break;
        }
    }

    // Text visibly opens with a fence but neither pattern matched (e.g. an
    // unterminated block): drop the first line and everything from the last
    // closing fence onward.
    if fragments.is_empty() && text.trim_start().starts_with("```") {
        let mut lines: Vec<&str> = text.lines().collect();
        if !lines.is_empty() {
            lines.remove(0);
        }
        if let Some(pos) = lines.iter().rposition(|l| l.trim() == "```") {
            lines.truncate(pos);
        }
        fragments.push(CodeFragment::new("", &lines.join("\n")));
    }

    // Last resort: the whole text is the fragment. Stray fence lines are
    // removed so fence syntax never lands in a file meant to be executable.
    if fragments.is_empty() && !text.trim().is_empty() {
        let mut lines: Vec<&str> = text.lines().filter(|l| l.trim() != "```").collect();
        if lines.first().is_some_and(|l| l.trim_start().starts_with("```")) {
            lines.remove(0);
        }
        fragments.push(CodeFragment::new("", &lines.join("\n")));
    }

    fragments.retain(|f| !f.source.is_empty());

    // Preferred-language and unlabeled blocks rank first; stable sort keeps
    // response order within each rank
    let preferred = preferred_language.to_lowercase();
    fragments.sort_by_key(|f| {
        if f.language == preferred || f.language.is_empty() {
            0
        } else {
            1
        }
    });

    fragments
}

/// Select the primary/entry fragment: first after preference sorting
pub fn primary_fragment(fragments: &[CodeFragment]) -> Option<&CodeFragment> {
    fragments.first()
}

/// File extension for a fence label
pub fn language_extension(language: &str) -> &'static str {
    match language.to_lowercase().as_str() {
        "python" | "py" => "py",
        "bash" | "sh" => "sh",
        "javascript" | "js" => "js",
        "typescript" | "ts" => "ts",
        "json" => "json",
        "yaml" | "yml" => "yml",
        _ => "txt",
    }
}
