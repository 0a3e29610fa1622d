//! Persisted configuration for Quill.
//!
//! The file lives at `~/.quill/config.toml`. Every key is optional; missing
//! values fall back to the defaults in [`ResolvedConfig::default`].
//!
//! ```toml
//! [app]
//! model = "gpt-4"
//!
//! [api_keys]
//! openai = "${OPENAI_API_KEY}"
//!
//! [request]
//! temperature = 1.0
//! max_tokens = 4000
//! max_completion_tokens = 4000
//!
//! [context]
//! memory_limit = 10
//! ```

use std::path::{Path, PathBuf};
use std::{env, fs, io};

use quill_types::{ApiKey, ModelName, Temperature};
use quill_utils::{AtomicWriteOptions, FileSyncPolicy, PersistMode};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_MAX_COMPLETION_TOKENS: u32 = 4000;
pub const DEFAULT_MEMORY_LIMIT: usize = 10;

/// Environment variable consulted when the file carries no API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Raw file contents, as written by the user.
#[derive(Debug, Default, Deserialize)]
pub struct QuillConfig {
    pub app: Option<AppConfig>,
    pub api_keys: Option<ApiKeys>,
    pub request: Option<RequestConfig>,
    pub context: Option<ContextConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    pub model: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct ApiKeys {
    pub openai: Option<String>,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let openai = if self.openai.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("ApiKeys").field("openai", &openai).finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestConfig {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub max_completion_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContextConfig {
    pub memory_limit: Option<usize>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("could not determine config path")]
    NoHomeDir,
    #[error("config at {} is not valid TOML: {source}", path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: toml_edit::TomlError,
    },
    #[error("failed to write config at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Configuration with defaults applied and values validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub api_key: Option<ApiKey>,
    pub model: ModelName,
    pub temperature: Temperature,
    pub max_tokens: u32,
    pub max_completion_tokens: u32,
    pub memory_limit: usize,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: ModelName::default(),
            temperature: Temperature::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_completion_tokens: DEFAULT_MAX_COMPLETION_TOKENS,
            memory_limit: DEFAULT_MEMORY_LIMIT,
        }
    }
}

/// Expand `${VAR}` references from the process environment.
///
/// Unset variables expand to the empty string; unterminated `${` is kept verbatim.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    expand_env_vars_with(value, |name| env::var(name).ok())
}

fn expand_env_vars_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                out.push_str(&lookup(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            Some(_) => {
                // `${}`: nothing to look up, drop it.
                rest = &after[1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

impl QuillConfig {
    /// Load from the default location. `Ok(None)` when no file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!(path = %path.display(), "Failed to read config: {source}");
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        toml::from_str(&content).map(Some).map_err(|source| {
            tracing::warn!(path = %path.display(), "Failed to parse config: {source}");
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    #[must_use]
    pub fn resolve(&self) -> ResolvedConfig {
        self.resolve_with(|name| env::var(name).ok())
    }

    fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> ResolvedConfig {
        let defaults = ResolvedConfig::default();

        let model = match self.app.as_ref().and_then(|app| app.model.as_deref()) {
            Some(raw) => ModelName::parse(raw).unwrap_or_else(|e| {
                tracing::warn!("Ignoring configured model: {e}");
                defaults.model.clone()
            }),
            None => defaults.model.clone(),
        };

        let request = self.request.as_ref();
        let temperature = match request.and_then(|r| r.temperature) {
            Some(raw) => Temperature::new(raw).unwrap_or_else(|e| {
                tracing::warn!("Ignoring configured temperature: {e}");
                defaults.temperature
            }),
            None => defaults.temperature,
        };

        let api_key = self
            .api_keys
            .as_ref()
            .and_then(|keys| keys.openai.as_deref())
            .map(|raw| expand_env_vars_with(raw, &lookup))
            .and_then(|expanded| ApiKey::new(expanded).ok())
            .or_else(|| lookup(API_KEY_ENV).and_then(|raw| ApiKey::new(raw).ok()));

        ResolvedConfig {
            api_key,
            model,
            temperature,
            max_tokens: request
                .and_then(|r| r.max_tokens)
                .unwrap_or(defaults.max_tokens),
            max_completion_tokens: request
                .and_then(|r| r.max_completion_tokens)
                .unwrap_or(defaults.max_completion_tokens),
            memory_limit: self
                .context
                .as_ref()
                .and_then(|c| c.memory_limit)
                .unwrap_or(defaults.memory_limit),
        }
    }
}

impl ResolvedConfig {
    /// Load and resolve from the default location, falling back to defaults
    /// (plus `OPENAI_API_KEY`) when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        Ok(QuillConfig::load()?.unwrap_or_default().resolve())
    }

    /// Persist the non-secret settings to the default config file.
    pub fn persist(&self) -> Result<(), PersistError> {
        let path = config_path().ok_or(PersistError::NoHomeDir)?;
        self.persist_to(&path)
    }

    /// Persist the non-secret settings to `path`.
    ///
    /// Uses `toml_edit` so comments, unknown keys, and the `[api_keys]` table
    /// are preserved. Creates the file and its parent directory if missing.
    pub fn persist_to(&self, path: &Path) -> Result<(), PersistError> {
        let mut doc = read_document(path)?;

        ensure_table(&mut doc, "app");
        doc["app"]["model"] = toml_edit::value(self.model.as_str());

        ensure_table(&mut doc, "request");
        doc["request"]["temperature"] = toml_edit::value(self.temperature.get());
        doc["request"]["max_tokens"] = toml_edit::value(i64::from(self.max_tokens));
        doc["request"]["max_completion_tokens"] =
            toml_edit::value(i64::from(self.max_completion_tokens));

        ensure_table(&mut doc, "context");
        doc["context"]["memory_limit"] =
            toml_edit::value(i64::try_from(self.memory_limit).unwrap_or(i64::MAX));

        write_document(path, &doc)?;
        tracing::info!(path = %path.display(), model = %self.model, "Persisted config");
        Ok(())
    }
}

/// Store an API key under `[api_keys] openai`, keeping everything else intact.
///
/// Prefer `${OPENAI_API_KEY}` references; a literal key is written with
/// owner-only permissions.
pub fn persist_api_key(path: &Path, key: &ApiKey) -> Result<(), PersistError> {
    let mut doc = read_document(path)?;
    ensure_table(&mut doc, "api_keys");
    doc["api_keys"]["openai"] = toml_edit::value(key.expose_secret());
    write_document(path, &doc)?;
    tracing::info!(path = %path.display(), key = %key.masked(), "Persisted API key");
    Ok(())
}

fn read_document(path: &Path) -> Result<toml_edit::DocumentMut, PersistError> {
    let content = if path.exists() {
        fs::read_to_string(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        String::new()
    };
    content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|source| PersistError::Document {
            path: path.to_path_buf(),
            source,
        })
}

fn write_document(path: &Path, doc: &toml_edit::DocumentMut) -> Result<(), PersistError> {
    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        quill_utils::ensure_private_dir(parent).map_err(io_err)?;
    }
    quill_utils::atomic_write_with_options(
        path,
        doc.to_string().as_bytes(),
        AtomicWriteOptions {
            file_sync: FileSyncPolicy::SyncAll,
            mode: PersistMode::SensitiveOwnerOnly,
        },
    )
    .map_err(io_err)
}

fn ensure_table(doc: &mut toml_edit::DocumentMut, key: &str) {
    if !doc.contains_table(key) {
        doc[key] = toml_edit::Item::Table(toml_edit::Table::new());
    }
}

#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".quill"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
