//! Turning completion failures into actionable text.
//!
//! Known failure signatures are rewritten into guidance; everything else is
//! shown as the service reported it. All text is secret-redacted before it
//! leaves this module.

use quill_providers::CompletionError;
use quill_types::{ModelName, OutputLengthParam};
use quill_utils::sanitize_error_text;

#[must_use]
pub fn is_auth_error(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    let mentions_key = lower.contains("api key") || lower.contains("authorization");
    let auth_words = lower.contains("invalid")
        || lower.contains("incorrect")
        || lower.contains("missing")
        || lower.contains("unauthorized")
        || lower.contains("not provided")
        || lower.contains("authentication");
    let has_code = lower.contains("401");

    lower.contains("invalid_api_key")
        || lower.contains("you must provide an api key")
        || (mentions_key && auth_words)
        || (mentions_key && has_code)
        || (has_code && lower.contains("unauthorized"))
}

/// Human-readable reason for a failed request against `model`.
#[must_use]
pub fn describe_failure(err: &CompletionError, model: &ModelName) -> String {
    let raw = err.to_string();
    let lower = raw.to_ascii_lowercase();

    let is_auth = matches!(err, CompletionError::MissingApiKey)
        || err.status() == Some(401)
        || is_auth_error(&raw);

    let text = if is_auth {
        auth_guidance(model)
    } else if lower.contains("max_tokens")
        && (lower.contains("gpt-5")
            || model.output_length_param() == OutputLengthParam::MaxCompletionTokens)
    {
        format!(
            "{model} model error: This model uses 'max_completion_tokens' instead of \
             'max_tokens'. Please try again."
        )
    } else if lower.contains("unsupported parameter") {
        format!("Model parameter error: {raw}. This may be a model-specific issue.")
    } else if lower.contains("temperature") {
        format!(
            "Temperature error: {raw}. Try adjusting [request] temperature in the config \
             (0.0 to 2.0)."
        )
    } else {
        raw
    };

    sanitize_error_text(&text)
}

fn auth_guidance(model: &ModelName) -> String {
    let config_hint = quill_config::config_path().map_or_else(
        || "~/.quill/config.toml".to_string(),
        |p| p.display().to_string(),
    );
    format!(
        "OpenAI authentication failed for model {model}.\n\nFix:\n- Set {env}, or\n- Add \
         [api_keys] openai = \"${{{env}}}\" to {config_hint}",
        env = quill_config::API_KEY_ENV
    )
}
