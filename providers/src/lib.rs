//! Completion service clients.
//!
//! # Architecture
//!
//! - [`CompletionClient`] - the seam the engine dispatches through; one call in,
//!   one [`CompletionResponse`] or [`CompletionError`] out
//! - [`openai`] - OpenAI Chat Completions API client
//!
//! Requests are not streamed and never retried here: a failure is reported once
//! and the caller decides what to show.

pub mod openai;

use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;

use quill_types::{ModelName, OutputLengthParam, Temperature, TokenUsage, Turn};
use serde_json::Value;
use thiserror::Error;

pub use quill_types;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const REQUEST_TIMEOUT_SECS: u64 = 300;

// Connection pool settings (httpx defaults)
const POOL_MAX_IDLE_PER_HOST: usize = 100;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Shared hardened HTTP client (HTTPS only, no redirects).
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .https_only(true)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build hardened HTTP client: {e}. Using defaults.");
                reqwest::Client::new()
            })
    })
}

/// One fully composed completion request.
///
/// `messages` already holds the prior context followed by the new user turn;
/// the system instruction travels separately.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: ModelName,
    pub system: String,
    pub messages: Vec<Turn>,
    pub temperature: Temperature,
    pub max_tokens: u32,
    pub max_completion_tokens: u32,
}

impl CompletionRequest {
    /// The output-length field for this model family and the bound it carries.
    #[must_use]
    pub fn output_bound(&self) -> (OutputLengthParam, u32) {
        match self.model.output_length_param() {
            OutputLengthParam::MaxTokens => (OutputLengthParam::MaxTokens, self.max_tokens),
            OutputLengthParam::MaxCompletionTokens => (
                OutputLengthParam::MaxCompletionTokens,
                self.max_completion_tokens,
            ),
        }
    }

    /// Total characters across system instruction and messages.
    #[must_use]
    pub fn prompt_chars(&self) -> usize {
        self.system.chars().count()
            + self
                .messages
                .iter()
                .map(|turn| turn.content().chars().count())
                .sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    /// Raw response text, untrimmed.
    pub text: String,
    pub usage: Option<TokenUsage>,
    /// Model the service reports having used, when present.
    pub model: Option<String>,
}

/// Coarse failure class used when deciding how to word a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network, authentication, or service-side failure.
    Transport,
    /// The model rejected a request parameter.
    Parameter,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("no API key configured")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl CompletionError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            CompletionError::Api { status, message }
                if matches!(status, 400 | 422) && mentions_parameter(message) =>
            {
                FailureKind::Parameter
            }
            _ => FailureKind::Transport,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            CompletionError::Api { status, .. } => Some(*status),
            CompletionError::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

fn mentions_parameter(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["parameter", "max_tokens", "temperature", "unsupported value"]
        .iter()
        .any(|needle| lower.contains(needle))
}

pub type CompletionFut<'a> =
    Pin<Box<dyn Future<Output = Result<CompletionResponse, CompletionError>> + Send + 'a>>;

/// The remote completion call.
pub trait CompletionClient: Send + Sync {
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFut<'a>;
}

/// Pull a human message out of a JSON error body, falling back to the body itself.
#[must_use]
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    let Ok(payload) = serde_json::from_str::<Value>(trimmed) else {
        return trimmed.to_string();
    };
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/message").and_then(Value::as_str))
        .or_else(|| payload.as_str())
        .map_or_else(|| trimmed.to_string(), ToString::to_string)
}

pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
