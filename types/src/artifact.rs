//! Artifact identity and version labels.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Stable identity of an edited artifact, typically a normalized file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId(String);

impl ArtifactId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Lexically normalize `path`: drops `.` segments and folds `..` into its parent.
    ///
    /// Callers that can touch the filesystem should canonicalize first; this only
    /// guarantees that `a/./b` and `a/c/../b` map to the same identity.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        normalized.push("..");
                    }
                }
                other => normalized.push(other.as_os_str()),
            }
        }
        Self(normalized.to_string_lossy().into_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment, used when naming the artifact in prompts and logs.
    #[must_use]
    pub fn display_name(&self) -> &str {
        Path::new(&self.0)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a version was recorded.
///
/// The four well-known moments have fixed labels; anything else is free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionLabel {
    /// First load of the artifact.
    Original,
    /// Live content captured right before an AI edit is applied.
    BeforeAiEdit,
    /// Content produced by an AI edit.
    AiEdit,
    /// Explicit save by the user.
    ManualSave,
    Custom(String),
}

impl VersionLabel {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            VersionLabel::Original => "Original",
            VersionLabel::BeforeAiEdit => "Before AI edit",
            VersionLabel::AiEdit => "AI edit",
            VersionLabel::ManualSave => "Manual save",
            VersionLabel::Custom(label) => label,
        }
    }
}

impl From<&str> for VersionLabel {
    fn from(value: &str) -> Self {
        match value {
            "Original" => VersionLabel::Original,
            "Before AI edit" => VersionLabel::BeforeAiEdit,
            "AI edit" => VersionLabel::AiEdit,
            "Manual save" => VersionLabel::ManualSave,
            other => VersionLabel::Custom(other.to_string()),
        }
    }
}

impl From<String> for VersionLabel {
    fn from(value: String) -> Self {
        VersionLabel::from(value.as_str())
    }
}

impl fmt::Display for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
