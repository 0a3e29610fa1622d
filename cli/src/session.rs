//! Interactive session state: the open file, its working copy, and the engine.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use quill_config::{ResolvedConfig, persist_api_key};
use quill_engine::{
    ArtifactId, ArtifactSnapshot, CompletionClient, DispatchSettings, Engine, EngineEvent,
    RequestKind,
};
use quill_providers::openai::OpenAiClient;
use quill_types::{ApiKey, ModelName, Temperature, truncate_with_ellipsis};
use quill_utils::{atomic_write, compute_diff_stats};

use crate::commands::{Command, HELP};

/// Width of the first-line preview shown after a revert.
const STATUS_PREVIEW_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Quit,
}

#[derive(Debug)]
struct OpenArtifact {
    id: ArtifactId,
    path: PathBuf,
    /// The working copy; written to disk only on `/save`.
    buffer: String,
}

impl OpenArtifact {
    fn snapshot(&self) -> ArtifactSnapshot {
        ArtifactSnapshot::new(self.id.clone(), self.buffer.clone())
    }
}

pub(crate) fn dispatch_settings(config: &ResolvedConfig) -> DispatchSettings {
    DispatchSettings {
        model: config.model.clone(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        max_completion_tokens: config.max_completion_tokens,
    }
}

pub(crate) fn openai_client(config: &ResolvedConfig) -> Arc<dyn CompletionClient> {
    Arc::new(OpenAiClient::new(config.api_key.clone()))
}

pub(crate) struct Session {
    engine: Engine,
    config: ResolvedConfig,
    artifact: Option<OpenArtifact>,
    include_file_context: bool,
    /// Where settings changes are persisted; `None` keeps them in memory.
    config_file: Option<PathBuf>,
}

impl Session {
    pub(crate) fn new(engine: Engine, config: ResolvedConfig, config_file: Option<PathBuf>) -> Self {
        Self {
            engine,
            config,
            artifact: None,
            include_file_context: true,
            config_file,
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.engine.in_flight()
    }

    /// Drain finished requests and report them. Returns how many were handled.
    pub(crate) fn poll(&mut self, out: &mut impl Write) -> Result<usize> {
        let events = self.engine.drain();
        let handled = events.len();
        for event in events {
            self.on_event(event, out)?;
        }
        if handled > 0 {
            writeln!(out, "[{}]", self.engine.usage_report().status_line())?;
        }
        Ok(handled)
    }

    fn on_event(&mut self, event: EngineEvent, out: &mut impl Write) -> Result<()> {
        match event {
            EngineEvent::EditReady {
                artifact,
                base,
                content,
                elapsed,
                ..
            } => {
                let before = match self.artifact.as_mut() {
                    Some(open) if open.id == artifact => {
                        std::mem::replace(&mut open.buffer, content.clone())
                    }
                    _ => {
                        writeln!(
                            out,
                            "Edit for {artifact} arrived after switching files; recorded in its history only."
                        )?;
                        base
                    }
                };
                self.engine.apply_edit(&artifact, &before, &content);
                let stats = compute_diff_stats(&before, &content);
                writeln!(
                    out,
                    "AI editing completed in {:.2}s (+{} -{}). /show to view, /save to write.",
                    elapsed.as_secs_f64(),
                    stats.additions,
                    stats.deletions
                )?;
            }
            EngineEvent::ChatReply { text, elapsed, .. } => {
                writeln!(out, "AI ({:.2}s):\n{text}", elapsed.as_secs_f64())?;
            }
            EngineEvent::Failed { kind, reason, .. } => {
                let what = match kind {
                    RequestKind::Edit => "Failed to edit code",
                    RequestKind::Chat => "Failed to get AI response",
                };
                writeln!(out, "{what}: {reason}")?;
            }
        }
        Ok(())
    }

    pub(crate) fn handle(&mut self, command: Command, out: &mut impl Write) -> Result<Flow> {
        match command {
            Command::Open(path) => self.open(&path, out)?,
            Command::Edit(prompt) => self.edit(prompt, out)?,
            Command::Chat(message) => self.chat(message, out)?,
            Command::Show => match &self.artifact {
                Some(open) => writeln!(out, "{}", open.buffer)?,
                None => no_file(out)?,
            },
            Command::Save => self.save(out)?,
            Command::History => self.history(out)?,
            Command::Revert(n) => self.revert(Some(n), out)?,
            Command::Original => self.revert(None, out)?,
            Command::Diff(n) => self.diff(n, out)?,
            Command::FileContext(on) => {
                self.include_file_context = on;
                let state = if on { "on" } else { "off" };
                writeln!(out, "File context in chat: {state}")?;
            }
            Command::Clear => {
                self.engine.clear_context();
                writeln!(out, "Conversation history cleared - starting fresh context")?;
            }
            Command::Limit(limit) => {
                self.engine.set_memory_limit(limit);
                self.config.memory_limit = limit;
                self.persist(out)?;
                writeln!(out, "Conversation memory limit: {limit} messages")?;
            }
            Command::Model(raw) => match ModelName::parse(&raw) {
                Ok(model) => {
                    self.config.model = model;
                    self.engine.set_settings(dispatch_settings(&self.config));
                    self.persist(out)?;
                    writeln!(out, "Model: {}", self.config.model)?;
                }
                Err(e) => writeln!(out, "{e}")?,
            },
            Command::Temperature(value) => match Temperature::new(value) {
                Ok(temperature) => {
                    self.config.temperature = temperature;
                    self.engine.set_settings(dispatch_settings(&self.config));
                    self.persist(out)?;
                    writeln!(out, "Temperature: {temperature}")?;
                }
                Err(e) => writeln!(out, "{e}")?,
            },
            Command::Key(raw) => self.set_key(raw, out)?,
            Command::Usage => {
                writeln!(out, "{}", self.engine.usage_report().details())?;
            }
            Command::ResetUsage => {
                self.engine.reset_usage();
                writeln!(out, "Usage counters reset")?;
            }
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn open(&mut self, path: &Path, out: &mut impl Write) -> Result<()> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to open file: {e}");
                writeln!(out, "Could not open file: {e}")?;
                return Ok(());
            }
        };
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let id = ArtifactId::from_path(&path);
        let recorded = self.engine.open_artifact(&id, &content);
        tracing::info!(artifact = %id, chars = content.chars().count(), "File opened");

        let versions = self.engine.versions().len(&id);
        writeln!(
            out,
            "Opened {} ({} chars, {versions} version{})",
            id.display_name(),
            content.chars().count(),
            if versions == 1 { "" } else { "s" }
        )?;
        if !recorded {
            writeln!(out, "Existing history kept; conversation cleared.")?;
        }
        self.artifact = Some(OpenArtifact {
            id,
            path,
            buffer: content,
        });
        Ok(())
    }

    fn edit(&mut self, prompt: String, out: &mut impl Write) -> Result<()> {
        let Some(open) = &self.artifact else {
            return no_file(out);
        };
        if self.engine.is_busy() {
            return busy(out);
        }
        let snapshot = open.snapshot();
        let id = self.engine.submit_edit(prompt, snapshot);
        writeln!(out, "AI is editing {} ... ({id})", open.id.display_name())?;
        Ok(())
    }

    fn chat(&mut self, message: String, out: &mut impl Write) -> Result<()> {
        if self.engine.is_busy() {
            return busy(out);
        }
        let file_context = self
            .artifact
            .as_ref()
            .filter(|_| self.include_file_context)
            .map(OpenArtifact::snapshot);
        if let Some(file) = &file_context {
            writeln!(out, "📁 {}", file.id.display_name())?;
        }
        let id = self.engine.submit_chat(message, file_context);
        writeln!(out, "AI is thinking... ({id})")?;
        Ok(())
    }

    fn save(&mut self, out: &mut impl Write) -> Result<()> {
        let Some(open) = &self.artifact else {
            return no_file(out);
        };
        if let Err(e) = atomic_write(&open.path, open.buffer.as_bytes()) {
            tracing::error!(path = %open.path.display(), "Could not save file: {e}");
            writeln!(out, "Could not save file: {e}")?;
            return Ok(());
        }
        self.engine.record_manual_save(&open.id, &open.buffer);
        tracing::info!(
            path = %open.path.display(),
            chars = open.buffer.chars().count(),
            "File saved"
        );
        writeln!(out, "Saved: {}", open.path.display())?;
        Ok(())
    }

    fn history(&self, out: &mut impl Write) -> Result<()> {
        let Some(open) = &self.artifact else {
            return no_file(out);
        };
        let versions = self.engine.versions().list(&open.id);
        if versions.is_empty() {
            writeln!(out, "No history")?;
        }
        for summary in versions {
            writeln!(out, "{}", summary.format_line())?;
        }
        Ok(())
    }

    /// Revert to version `n` (1-based), or to the oldest when `None`.
    fn revert(&mut self, n: Option<usize>, out: &mut impl Write) -> Result<()> {
        let Some(open) = self.artifact.as_mut() else {
            return no_file(out);
        };
        let index = n.map_or(0, |n| n.saturating_sub(1));
        let reverted = match n {
            Some(_) => self.engine.revert(&open.id, index),
            None => self.engine.revert_to_original(&open.id),
        };
        match reverted {
            Ok(content) => {
                open.buffer = content;
                let preview = truncate_with_ellipsis(
                    open.buffer.lines().next().unwrap_or_default(),
                    STATUS_PREVIEW_CHARS,
                );
                writeln!(out, "Reverted to version {}: {preview}", index + 1)?;
            }
            Err(e) => writeln!(out, "Cannot revert: {e}")?,
        }
        Ok(())
    }

    fn diff(&self, n: usize, out: &mut impl Write) -> Result<()> {
        let Some(open) = &self.artifact else {
            return no_file(out);
        };
        match self.engine.versions().diff(&open.id, n.saturating_sub(1)) {
            Ok(diff) if diff.is_empty() => writeln!(out, "No differences")?,
            Ok(diff) => write!(out, "{diff}")?,
            Err(e) => writeln!(out, "Cannot diff: {e}")?,
        }
        Ok(())
    }

    fn set_key(&mut self, raw: String, out: &mut impl Write) -> Result<()> {
        let key = match ApiKey::new(raw) {
            Ok(key) => key,
            Err(_) => {
                writeln!(out, "API key must not be empty")?;
                return Ok(());
            }
        };
        if let Some(path) = &self.config_file
            && let Err(e) = persist_api_key(path, &key)
        {
            tracing::warn!("Failed to persist API key: {e}");
            writeln!(out, "Key not saved ({e}); using it for this session only.")?;
        }
        writeln!(out, "API key set: {}", key.masked())?;
        self.config.api_key = Some(key);
        self.engine.set_client(openai_client(&self.config));
        Ok(())
    }

    fn persist(&self, out: &mut impl Write) -> Result<()> {
        let Some(path) = &self.config_file else {
            return Ok(());
        };
        if let Err(e) = self.config.persist_to(path) {
            tracing::warn!("Failed to persist config: {e}");
            writeln!(out, "Settings not saved: {e}")?;
        }
        Ok(())
    }
}

fn no_file(out: &mut impl Write) -> Result<()> {
    writeln!(out, "No file open. Use /open <path> first.")?;
    Ok(())
}

fn busy(out: &mut impl Write) -> Result<()> {
    writeln!(out, "A request is already in progress; wait for it to finish.")?;
    Ok(())
}
