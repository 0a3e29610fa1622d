//! Asynchronous interaction engine for Quill.
//!
//! # Architecture
//!
//! ```text
//! collaborator ──submit_*──► Dispatcher ──tokio::spawn──► CompletionClient
//!      ▲                         │
//!      │                  mpsc (bounded)
//!      │                         ▼
//!      └──── EngineEvent ◄── Engine::drain ──► ConversationContext
//!                                         └──► UsageAccountant
//! ```
//!
//! Background tasks only send outcomes. Every store mutation happens on the
//! caller's thread inside [`Engine::drain`] or an explicit engine method, so
//! the stores need no locks. Clearing the conversation starts a new
//! generation; replies to submissions from an older generation are reported
//! but not added to the new conversation. Version recording is left to the caller at the
//! moments it knows about: first load, before and after an AI edit is
//! applied, and manual save.

mod dispatcher;
mod errors;
mod prompts;
mod usage;

use std::sync::Arc;
use std::time::Duration;

pub use dispatcher::{
    ArtifactSnapshot, Delivery, DispatchSettings, Dispatcher, Interaction, POLL_INTERVAL,
    RESULT_CHANNEL_CAPACITY, RequestOutcome, Submission, SubmissionId,
};
pub use errors::{describe_failure, is_auth_error};
pub use prompts::{
    chat_file_context, chat_system_instruction, edit_system_instruction, edit_user_turn,
    strip_code_fence,
};
pub use usage::{
    FALLBACK_RATE_PER_1K, RateSource, ResolvedRate, UsageAccountant, UsageReport, rate_for,
};

pub use quill_context::{
    ConversationContext, DEFAULT_MEMORY_LIMIT, MAX_VERSIONS, RevertError, VersionHistoryStore,
    VersionRecord, VersionSummary,
};
pub use quill_providers::{CompletionClient, FailureKind};
pub use quill_types::{ArtifactId, RequestKind, VersionLabel};

/// What the collaborator learns from one drained outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Edited content is ready to apply to `artifact`.
    EditReady {
        id: SubmissionId,
        artifact: ArtifactId,
        /// Content the edit was computed from.
        base: String,
        content: String,
        elapsed: Duration,
    },
    ChatReply {
        id: SubmissionId,
        text: String,
        elapsed: Duration,
    },
    Failed {
        id: SubmissionId,
        kind: RequestKind,
        reason: String,
        failure: FailureKind,
        elapsed: Duration,
    },
}

impl EngineEvent {
    #[must_use]
    pub fn id(&self) -> SubmissionId {
        match self {
            EngineEvent::EditReady { id, .. }
            | EngineEvent::ChatReply { id, .. }
            | EngineEvent::Failed { id, .. } => *id,
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self {
            EngineEvent::EditReady { elapsed, .. }
            | EngineEvent::ChatReply { elapsed, .. }
            | EngineEvent::Failed { elapsed, .. } => *elapsed,
        }
    }
}

/// Owned engine state: dispatcher, both stores, and the usage counters.
#[derive(Debug)]
pub struct Engine {
    dispatcher: Dispatcher,
    context: ConversationContext,
    versions: VersionHistoryStore,
    usage: UsageAccountant,
    settings: DispatchSettings,
    /// Bumped whenever the conversation is cleared.
    generation: u64,
}

impl Engine {
    #[must_use]
    pub fn new(
        client: Arc<dyn CompletionClient>,
        settings: DispatchSettings,
        memory_limit: usize,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(client),
            context: ConversationContext::new(memory_limit),
            versions: VersionHistoryStore::new(),
            usage: UsageAccountant::new(),
            settings,
            generation: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    pub fn submit_edit(
        &mut self,
        prompt: impl Into<String>,
        artifact: ArtifactSnapshot,
    ) -> SubmissionId {
        let submission = Submission::edit(
            prompt,
            artifact,
            self.context.snapshot(),
            self.settings.clone(),
        )
        .with_generation(self.generation);
        self.dispatcher.submit(submission)
    }

    pub fn submit_chat(
        &mut self,
        prompt: impl Into<String>,
        file_context: Option<ArtifactSnapshot>,
    ) -> SubmissionId {
        let submission = Submission::chat(
            prompt,
            file_context,
            self.context.snapshot(),
            self.settings.clone(),
        )
        .with_generation(self.generation);
        self.dispatcher.submit(submission)
    }

    /// Apply every outcome that has arrived and report what happened.
    ///
    /// Completed turns are appended to the context unless it was cleared after
    /// they were submitted. Reported token usage is always recorded. Never waits.
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Some(delivery) = self.dispatcher.try_recv() {
            events.push(self.apply(delivery));
        }
        events
    }

    /// Wait for the next outcome and apply it.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        let delivery = self.dispatcher.recv().await?;
        Some(self.apply(delivery))
    }

    fn apply(&mut self, delivery: Delivery) -> EngineEvent {
        let Delivery {
            id,
            kind,
            artifact,
            generation,
            outcome,
        } = delivery;
        match outcome {
            RequestOutcome::Completed {
                payload,
                exchange,
                usage,
                elapsed,
            } => {
                if generation == self.generation {
                    self.context.append(exchange);
                } else {
                    tracing::debug!(
                        id = %id,
                        generation,
                        current = self.generation,
                        "Reply belongs to a cleared conversation; not added to context"
                    );
                }
                if let Some(usage) = usage {
                    self.usage.record(usage.total_tokens);
                }
                match (kind, artifact) {
                    (RequestKind::Edit, Some(artifact)) => EngineEvent::EditReady {
                        id,
                        artifact: artifact.id,
                        base: artifact.content,
                        content: payload,
                        elapsed,
                    },
                    _ => EngineEvent::ChatReply {
                        id,
                        text: payload,
                        elapsed,
                    },
                }
            }
            RequestOutcome::Failed {
                reason,
                kind: failure,
                elapsed,
            } => EngineEvent::Failed {
                id,
                kind,
                reason,
                failure,
                elapsed,
            },
        }
    }

    /// Submissions still waiting for an outcome.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight() > 0
    }

    #[must_use]
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Swap the completion client, e.g. after the API key changes.
    pub fn set_client(&mut self, client: Arc<dyn CompletionClient>) {
        self.dispatcher.set_client(client);
    }

    /// Applies to submissions made after this call.
    pub fn set_settings(&mut self, settings: DispatchSettings) {
        self.settings = settings;
    }

    // ------------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------------

    /// Start working on `artifact`.
    ///
    /// Records `Original` the first time the artifact is seen and clears the
    /// conversation. Returns whether an `Original` version was recorded.
    pub fn open_artifact(&mut self, artifact: &ArtifactId, content: &str) -> bool {
        self.clear_context();
        if !self.versions.is_empty(artifact) {
            return false;
        }
        self.versions
            .record_version(artifact, content, VersionLabel::Original);
        true
    }

    /// Record the content being replaced and the edit replacing it.
    pub fn apply_edit(&mut self, artifact: &ArtifactId, before: &str, edited: &str) {
        self.versions
            .record_version(artifact, before, VersionLabel::BeforeAiEdit);
        self.versions
            .record_version(artifact, edited, VersionLabel::AiEdit);
    }

    pub fn record_manual_save(&mut self, artifact: &ArtifactId, content: &str) {
        self.versions
            .record_version(artifact, content, VersionLabel::ManualSave);
    }

    /// Content of version `index`, now current. Applying it is up to the caller.
    pub fn revert(&mut self, artifact: &ArtifactId, index: usize) -> Result<String, RevertError> {
        self.versions.revert(artifact, index)
    }

    /// Same as [`Engine::revert`] to the oldest surviving version.
    pub fn revert_to_original(&mut self, artifact: &ArtifactId) -> Result<String, RevertError> {
        self.versions.revert_to_original(artifact)
    }

    #[must_use]
    pub fn versions(&self) -> &VersionHistoryStore {
        &self.versions
    }

    // ------------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Empty the conversation. Replies still in flight will not be added to it.
    pub fn clear_context(&mut self) {
        self.context.clear();
        self.generation += 1;
    }

    pub fn set_memory_limit(&mut self, limit: usize) {
        self.context.set_limit(limit);
    }

    // ------------------------------------------------------------------------
    // Usage
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn usage(&self) -> &UsageAccountant {
        &self.usage
    }

    /// Report priced at the configured model's rate.
    #[must_use]
    pub fn usage_report(&self) -> UsageReport {
        self.usage.report(self.settings.model.as_str())
    }

    pub fn reset_usage(&mut self) {
        self.usage.reset();
    }
}
