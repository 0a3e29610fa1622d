//! Model identifiers and per-model request parameters.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model family prefixes that reject `max_tokens` and require
/// `max_completion_tokens` instead.
const COMPLETION_TOKENS_PREFIXES: &[&str] = &["gpt-5", "o1", "o3", "o4"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelParseError {
    #[error("model name cannot be empty")]
    Empty,
    #[error("model name must not contain whitespace (got {0})")]
    Whitespace(String),
}

/// Completion model identifier, e.g. `gpt-4.1-mini`.
///
/// Names are trimmed at the boundary; the rest of the engine never sees raw input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelName(String);

impl ModelName {
    pub fn parse(raw: &str) -> Result<Self, ModelParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelParseError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ModelParseError::Whitespace(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Which request field carries the output-length bound for this model family.
    #[must_use]
    pub fn output_length_param(&self) -> OutputLengthParam {
        let lower = self.0.to_ascii_lowercase();
        if COMPLETION_TOKENS_PREFIXES
            .iter()
            .any(|prefix| lower.starts_with(prefix))
        {
            OutputLengthParam::MaxCompletionTokens
        } else {
            OutputLengthParam::MaxTokens
        }
    }
}

impl Default for ModelName {
    fn default() -> Self {
        Self("gpt-4".to_string())
    }
}

impl TryFrom<String> for ModelName {
    type Error = ModelParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ModelName> for String {
    fn from(value: ModelName) -> Self {
        value.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Name of the request field bounding output length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputLengthParam {
    MaxTokens,
    MaxCompletionTokens,
}

impl OutputLengthParam {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OutputLengthParam::MaxTokens => "max_tokens",
            OutputLengthParam::MaxCompletionTokens => "max_completion_tokens",
        }
    }
}

impl fmt::Display for OutputLengthParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("temperature must be within 0.0..=2.0 (got {0})")]
pub struct TemperatureError(pub f64);

/// Sampling temperature, validated to `0.0..=2.0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Temperature(f64);

impl Temperature {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 2.0;

    pub fn new(value: f64) -> Result<Self, TemperatureError> {
        if value.is_finite() && (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TemperatureError(value))
        }
    }

    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Self(1.0)
    }
}

impl TryFrom<f64> for Temperature {
    type Error = TemperatureError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Temperature> for f64 {
    fn from(value: Temperature) -> Self {
        value.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_parse_trims_and_rejects_empty() {
        assert_eq!(ModelName::parse("  gpt-4  ").unwrap().as_str(), "gpt-4");
        assert_eq!(ModelName::parse(""), Err(ModelParseError::Empty));
        assert_eq!(ModelName::parse("   "), Err(ModelParseError::Empty));
        assert!(matches!(
            ModelName::parse("gpt 4"),
            Err(ModelParseError::Whitespace(_))
        ));
    }

    #[test]
    fn output_length_param_by_family_prefix() {
        let cases = [
            ("gpt-5", OutputLengthParam::MaxCompletionTokens),
            ("gpt-5-mini", OutputLengthParam::MaxCompletionTokens),
            ("GPT-5.2", OutputLengthParam::MaxCompletionTokens),
            ("o3-mini", OutputLengthParam::MaxCompletionTokens),
            ("o1-preview", OutputLengthParam::MaxCompletionTokens),
            ("o4-mini", OutputLengthParam::MaxCompletionTokens),
            ("gpt-4", OutputLengthParam::MaxTokens),
            ("gpt-4.1-nano", OutputLengthParam::MaxTokens),
            ("gpt-3.5-turbo", OutputLengthParam::MaxTokens),
        ];
        for (raw, expected) in cases {
            let model = ModelName::parse(raw).unwrap();
            assert_eq!(model.output_length_param(), expected, "{raw}");
        }
    }

    #[test]
    fn output_length_param_names() {
        assert_eq!(OutputLengthParam::MaxTokens.as_str(), "max_tokens");
        assert_eq!(
            OutputLengthParam::MaxCompletionTokens.as_str(),
            "max_completion_tokens"
        );
    }

    #[test]
    fn temperature_bounds() {
        assert!(Temperature::new(0.0).is_ok());
        assert!(Temperature::new(2.0).is_ok());
        assert!(Temperature::new(-0.1).is_err());
        assert!(Temperature::new(2.1).is_err());
        assert!(Temperature::new(f64::NAN).is_err());
        assert_eq!(Temperature::default().get(), 1.0);
    }

    #[test]
    fn model_name_deserializes_through_parse() {
        let parsed: Result<ModelName, _> = serde_json::from_str("\"  \"");
        assert!(parsed.is_err());
        let parsed: ModelName = serde_json::from_str("\"o3-mini\"").unwrap();
        assert_eq!(parsed.as_str(), "o3-mini");
    }
}
