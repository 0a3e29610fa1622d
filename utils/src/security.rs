//! Secret redaction for failure text and logs.
//!
//! Completion failures are shown to the user and written to the log file, and
//! service error bodies sometimes echo the credential that was sent. Everything
//! user-visible goes through [`sanitize_error_text`] first.

use std::sync::OnceLock;

use regex::Regex;

/// Redact credential-shaped tokens from a string.
///
/// - OpenAI: `sk-...` / `sk-proj-...` → `sk-***`
/// - Bearer tokens: `Bearer <token>` → `Bearer [REDACTED]`
/// - JWTs: `eyJ....` → `[REDACTED]`
#[must_use]
pub fn redact_api_keys(raw: &str) -> String {
    pattern_redactor().redact(raw)
}

/// Trim, strip control characters (newlines and tabs survive), then redact.
#[must_use]
pub fn sanitize_error_text(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect();
    redact_api_keys(&cleaned)
}

static PATTERN_REDACTOR: OnceLock<PatternRedactor> = OnceLock::new();

fn pattern_redactor() -> &'static PatternRedactor {
    PATTERN_REDACTOR.get_or_init(PatternRedactor::new)
}

#[derive(Debug)]
struct PatternRedactor {
    bearer: Regex,
    jwt: Regex,
    openai_key: Regex,
}

impl PatternRedactor {
    fn new() -> Self {
        Self {
            bearer: Regex::new(r"(?i)\b(Bearer)(\s+)[A-Za-z0-9._~+/-]{8,}=*")
                .expect("valid Bearer token regex"),
            jwt: Regex::new(r"\beyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\b")
                .expect("valid JWT regex"),
            // Requires 20+ chars after `sk-` so prose like "task-skipping" survives.
            openai_key: Regex::new(r"sk-[A-Za-z0-9_-]{20,}").expect("valid OpenAI API key regex"),
        }
    }

    fn redact(&self, raw: &str) -> String {
        let mut output = raw.to_string();
        // Bearer first: its payload may itself look like an `sk-` key.
        apply_if_match(&self.bearer, "$1$2[REDACTED]", &mut output);
        apply_if_match(&self.jwt, "[REDACTED]", &mut output);
        apply_if_match(&self.openai_key, "sk-***", &mut output);
        output
    }
}

fn apply_if_match(re: &Regex, replacement: &str, output: &mut String) {
    if !re.is_match(output) {
        return;
    }
    let replaced = re.replace_all(output.as_str(), replacement).into_owned();
    *output = replaced;
}
