//! Background dispatch of completion requests.
//!
//! Each submission runs as its own tokio task and reports exactly one
//! [`Delivery`] on a bounded channel. Tasks never touch the stores; the
//! consumer drains the channel and applies outcomes itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use quill_context::TokenCounter;
use quill_providers::{CompletionClient, CompletionRequest, FailureKind};
use quill_types::{
    ArtifactId, Exchange, ModelName, RequestKind, Temperature, TokenUsage, Turn, truncate_preview,
};
use tokio::sync::mpsc;

use crate::errors::describe_failure;
use crate::prompts::{
    chat_file_context, chat_system_instruction, edit_system_instruction, edit_user_turn,
    log_content_size, strip_code_fence,
};

/// Completed outcomes that may queue up before the consumer drains them.
pub const RESULT_CHANNEL_CAPACITY: usize = 64;

/// How often the consumer is expected to drain the result channel.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

const PROMPT_PREVIEW_CHARS: usize = 80;

/// Opaque handle returned by [`Dispatcher::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(u64);

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Request parameters copied into each submission.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub model: ModelName,
    pub temperature: Temperature,
    pub max_tokens: u32,
    pub max_completion_tokens: u32,
}

/// An artifact's identity together with the content the caller holds for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSnapshot {
    pub id: ArtifactId,
    pub content: String,
}

impl ArtifactSnapshot {
    #[must_use]
    pub fn new(id: ArtifactId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// Rewrite the artifact's content per the prompt.
    Edit(ArtifactSnapshot),
    /// Answer conversationally, optionally grounded in a file.
    Chat { file_context: Option<ArtifactSnapshot> },
}

/// Everything one background request needs, owned.
#[derive(Debug, Clone)]
pub struct Submission {
    pub prompt: String,
    pub interaction: Interaction,
    /// Prior turns, oldest first.
    pub context: Vec<Turn>,
    /// Conversation the context was taken from; echoed back on the delivery.
    pub generation: u64,
    pub settings: DispatchSettings,
}

impl Submission {
    #[must_use]
    pub fn edit(
        prompt: impl Into<String>,
        artifact: ArtifactSnapshot,
        context: Vec<Turn>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            interaction: Interaction::Edit(artifact),
            context,
            generation: 0,
            settings,
        }
    }

    #[must_use]
    pub fn chat(
        prompt: impl Into<String>,
        file_context: Option<ArtifactSnapshot>,
        context: Vec<Turn>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            interaction: Interaction::Chat { file_context },
            context,
            generation: 0,
            settings,
        }
    }

    #[must_use]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self.interaction {
            Interaction::Edit(_) => RequestKind::Edit,
            Interaction::Chat { .. } => RequestKind::Chat,
        }
    }

    /// Artifact an edit targets, with the content the edit starts from.
    #[must_use]
    pub fn artifact(&self) -> Option<&ArtifactSnapshot> {
        match &self.interaction {
            Interaction::Edit(snapshot) => Some(snapshot),
            Interaction::Chat { .. } => None,
        }
    }

    /// The new user turn: what is sent and what the context remembers.
    #[must_use]
    pub fn user_turn(&self) -> String {
        match &self.interaction {
            Interaction::Edit(snapshot) => edit_user_turn(&snapshot.content, &self.prompt),
            Interaction::Chat { .. } => self.prompt.clone(),
        }
    }

    fn system_instruction(&self) -> String {
        match &self.interaction {
            Interaction::Edit(snapshot) => edit_system_instruction(snapshot.id.as_str()),
            Interaction::Chat { file_context } => {
                let context = file_context
                    .as_ref()
                    .map(|file| chat_file_context(file.id.display_name(), &file.content));
                chat_system_instruction(context.as_deref())
            }
        }
    }

    fn into_request(self) -> (CompletionRequest, String) {
        let user_turn = self.user_turn();
        let system = self.system_instruction();
        let mut messages = self.context;
        messages.push(Turn::user(user_turn.clone()));
        let request = CompletionRequest {
            model: self.settings.model,
            system,
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            max_completion_tokens: self.settings.max_completion_tokens,
        };
        (request, user_turn)
    }
}

/// Terminal result of one submission, consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Completed {
        /// Text for the caller: fence-stripped for edits, as-is for chat.
        payload: String,
        /// The user turn and trimmed raw reply, for the context store.
        exchange: Exchange,
        usage: Option<TokenUsage>,
        elapsed: Duration,
    },
    Failed {
        reason: String,
        kind: FailureKind,
        elapsed: Duration,
    },
}

impl RequestOutcome {
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self {
            RequestOutcome::Completed { elapsed, .. } | RequestOutcome::Failed { elapsed, .. } => {
                *elapsed
            }
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, RequestOutcome::Completed { .. })
    }
}

/// One outcome tagged with the submission it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: SubmissionId,
    pub kind: RequestKind,
    /// Target of an edit and the content it was based on; `None` for chat.
    pub artifact: Option<ArtifactSnapshot>,
    /// Copied from [`Submission::generation`].
    pub generation: u64,
    pub outcome: RequestOutcome,
}

/// Spawns submissions and hands back their outcomes.
///
/// Must be used from within a tokio runtime.
pub struct Dispatcher {
    client: Arc<dyn CompletionClient>,
    tx: mpsc::Sender<Delivery>,
    rx: mpsc::Receiver<Delivery>,
    next_id: u64,
    in_flight: usize,
    counter: TokenCounter,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("next_id", &self.next_id)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        Self {
            client,
            tx,
            rx,
            next_id: 1,
            in_flight: 0,
            counter: TokenCounter::new(),
        }
    }

    /// Start `submission` in the background and return immediately.
    pub fn submit(&mut self, submission: Submission) -> SubmissionId {
        let id = SubmissionId(self.next_id);
        self.next_id += 1;
        self.in_flight += 1;

        let kind = submission.kind();
        let artifact = submission.artifact().cloned();
        let generation = submission.generation;
        if let Interaction::Edit(snapshot) = &submission.interaction {
            log_content_size("artifact", snapshot.content.chars().count());
        }
        if let Interaction::Chat {
            file_context: Some(file),
        } = &submission.interaction
        {
            log_content_size("file context", file.content.chars().count());
        }

        let prompt = truncate_preview(&submission.prompt, PROMPT_PREVIEW_CHARS, "…");
        let (request, user_turn) = submission.into_request();
        let (param, bound) = request.output_bound();
        tracing::info!(
            id = %id,
            kind = %kind,
            model = %request.model,
            temperature = %request.temperature,
            output_param = param.as_str(),
            output_bound = bound,
            messages = request.messages.len() + 1,
            prompt_chars = request.prompt_chars(),
            estimated_tokens = self.counter.count_request(&request.system, &request.messages),
            prompt = %prompt,
            "Dispatching request"
        );

        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = run(client.as_ref(), &request, kind, user_turn).await;
            let delivery = Delivery {
                id,
                kind,
                artifact,
                generation,
                outcome,
            };
            if tx.send(delivery).await.is_err() {
                tracing::warn!(id = %id, "Result channel closed before delivery");
            }
        });

        id
    }

    /// Next finished outcome, if any. Never waits.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        let delivery = self.rx.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(delivery)
    }

    /// Wait for the next finished outcome.
    pub async fn recv(&mut self) -> Option<Delivery> {
        let delivery = self.rx.recv().await?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(delivery)
    }

    /// Submissions whose outcome has not been received yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Use `client` for later submissions. Running ones keep their client.
    pub fn set_client(&mut self, client: Arc<dyn CompletionClient>) {
        self.client = client;
    }
}

async fn run(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    kind: RequestKind,
    user_turn: String,
) -> RequestOutcome {
    let started = Instant::now();
    let result = client.complete(request).await;
    let elapsed = started.elapsed();

    match result {
        Ok(response) => {
            let raw = response.text.trim().to_string();
            tracing::info!(
                kind = %kind,
                elapsed_ms = elapsed.as_millis() as u64,
                tokens = response.usage.map(|u| u.total_tokens),
                model = response.model.as_deref().unwrap_or(request.model.as_str()),
                response_chars = raw.chars().count(),
                "Response received"
            );
            let payload = match kind {
                RequestKind::Edit => {
                    let (stripped, removed) = strip_code_fence(&raw);
                    if removed {
                        tracing::info!("Removed markdown code fence from response");
                    }
                    stripped
                }
                RequestKind::Chat => raw.clone(),
            };
            RequestOutcome::Completed {
                payload,
                exchange: Exchange::new(user_turn, raw),
                usage: response.usage,
                elapsed,
            }
        }
        Err(err) => {
            let reason = describe_failure(&err, &request.model);
            let failure_kind = err.kind();
            tracing::error!(
                kind = %kind,
                failure = ?failure_kind,
                elapsed_ms = elapsed.as_millis() as u64,
                reason = %reason,
                "Request failed"
            );
            RequestOutcome::Failed {
                reason,
                kind: failure_kind,
                elapsed,
            }
        }
    }
}
