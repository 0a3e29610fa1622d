//! Per-artifact version history with revert.

use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;

use chrono::Local;
use quill_types::{ArtifactId, VersionLabel};
use thiserror::Error;

/// Versions retained per artifact.
pub const MAX_VERSIONS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RevertError {
    #[error("version {index} is out of range (history has {len} versions)")]
    OutOfRange { index: usize, len: usize },
}

/// One immutable snapshot of an artifact's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    content: String,
    timestamp: SystemTime,
    label: VersionLabel,
}

impl VersionRecord {
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    #[must_use]
    pub fn label(&self) -> &VersionLabel {
        &self.label
    }
}

/// A compact, user-facing view of a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSummary {
    /// Zero-based position in the history.
    pub index: usize,
    pub timestamp: SystemTime,
    pub label: VersionLabel,
    pub is_current: bool,
}

impl VersionSummary {
    /// `🔄 Current 3: 2025-01-31 14:02:11 - AI edit`, numbered from 1.
    #[must_use]
    pub fn format_line(&self) -> String {
        let ts_utc = chrono::DateTime::<chrono::Utc>::from(self.timestamp);
        let when = ts_utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let marker = if self.is_current {
            "🔄 Current"
        } else {
            "📝 Version"
        };
        format!("{marker} {n}: {when} - {label}", n = self.index + 1, label = self.label)
    }
}

#[derive(Debug, Default)]
struct VersionHistory {
    records: VecDeque<VersionRecord>,
    current: usize,
}

impl VersionHistory {
    fn push(&mut self, record: VersionRecord) -> usize {
        if self.records.len() >= MAX_VERSIONS {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.current = self.records.len() - 1;
        debug_assert!(self.records.len() <= MAX_VERSIONS);
        self.current
    }

    fn check(&self, index: usize) -> Result<&VersionRecord, RevertError> {
        self.records.get(index).ok_or(RevertError::OutOfRange {
            index,
            len: self.records.len(),
        })
    }
}

/// Version histories keyed by artifact identity.
///
/// The store only keeps records. Applying a reverted version to the live
/// artifact is the caller's job.
#[derive(Debug, Default)]
pub struct VersionHistoryStore {
    histories: HashMap<ArtifactId, VersionHistory>,
}

impl VersionHistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a version and make it current. Returns its index.
    pub fn record_version(
        &mut self,
        artifact: &ArtifactId,
        content: impl Into<String>,
        label: impl Into<VersionLabel>,
    ) -> usize {
        self.record_version_at(artifact, content.into(), label.into(), SystemTime::now())
    }

    fn record_version_at(
        &mut self,
        artifact: &ArtifactId,
        content: String,
        label: VersionLabel,
        timestamp: SystemTime,
    ) -> usize {
        let chars = content.chars().count();
        let history = self.histories.entry(artifact.clone()).or_default();
        let evicted = history.records.len() >= MAX_VERSIONS;
        let index = history.push(VersionRecord {
            content,
            timestamp,
            label,
        });
        tracing::info!(
            artifact = %artifact,
            label = %history.records[index].label,
            chars,
            index,
            evicted,
            "Version added"
        );
        index
    }

    #[must_use]
    pub fn list(&self, artifact: &ArtifactId) -> Vec<VersionSummary> {
        let Some(history) = self.histories.get(artifact) else {
            return Vec::new();
        };
        history
            .records
            .iter()
            .enumerate()
            .map(|(index, record)| VersionSummary {
                index,
                timestamp: record.timestamp,
                label: record.label.clone(),
                is_current: index == history.current,
            })
            .collect()
    }

    /// Make version `index` current and return its content.
    ///
    /// Fails without touching the store when `index` is not a valid position.
    pub fn revert(&mut self, artifact: &ArtifactId, index: usize) -> Result<String, RevertError> {
        let Some(history) = self.histories.get_mut(artifact) else {
            return Err(RevertError::OutOfRange { index, len: 0 });
        };
        let content = history.check(index)?.content.clone();
        history.current = index;
        tracing::info!(artifact = %artifact, index, "Reverted to version");
        Ok(content)
    }

    pub fn revert_to_original(&mut self, artifact: &ArtifactId) -> Result<String, RevertError> {
        self.revert(artifact, 0)
    }

    #[must_use]
    pub fn current(&self, artifact: &ArtifactId) -> Option<&VersionRecord> {
        let history = self.histories.get(artifact)?;
        history.records.get(history.current)
    }

    #[must_use]
    pub fn current_index(&self, artifact: &ArtifactId) -> Option<usize> {
        self.histories
            .get(artifact)
            .filter(|h| !h.records.is_empty())
            .map(|h| h.current)
    }

    #[must_use]
    pub fn len(&self, artifact: &ArtifactId) -> usize {
        self.histories.get(artifact).map_or(0, |h| h.records.len())
    }

    #[must_use]
    pub fn is_empty(&self, artifact: &ArtifactId) -> bool {
        self.len(artifact) == 0
    }

    /// Line diff from version `index` to the current version.
    pub fn diff(&self, artifact: &ArtifactId, index: usize) -> Result<String, RevertError> {
        let Some(history) = self.histories.get(artifact) else {
            return Err(RevertError::OutOfRange { index, len: 0 });
        };
        let from = history.check(index)?;
        let to = history.check(history.current)?;
        Ok(quill_utils::format_line_diff(&from.content, &to.content))
    }
}
