//! Token counting using tiktoken.
//!
//! Counts are **approximate**: they use the `o200k_base` encoding, which matches
//! current OpenAI models and is close for older ones. The completion service's
//! reported usage is always authoritative; these estimates only feed request
//! logging.

use std::sync::OnceLock;

use quill_types::Turn;
use tiktoken_rs::{CoreBPE, o200k_base};

/// The encoder is expensive to initialize (loads vocabulary data), so it is
/// created once and shared by every `TokenCounter`.
static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn get_encoder() -> Option<&'static CoreBPE> {
    ENCODER.get_or_init(|| o200k_base().ok()).as_ref()
}

/// Approximate per-message overhead for role markers and delimiters.
const MESSAGE_OVERHEAD: u32 = 4;

/// Thread-safe approximate token counter.
///
/// Falls back to byte length when the encoder cannot be loaded.
#[derive(Clone, Copy)]
pub struct TokenCounter {
    encoder: Option<&'static CoreBPE>,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoder", &self.encoder.as_ref().map(|_| "<CoreBPE>"))
            .finish()
    }
}

impl TokenCounter {
    #[must_use]
    pub fn new() -> Self {
        let encoder = get_encoder();
        if encoder.is_none() {
            tracing::error!(
                "Failed to initialize tiktoken o200k_base encoder. Falling back to byte-length estimates."
            );
        }
        Self { encoder }
    }

    #[must_use]
    pub fn count_str(&self, text: &str) -> u32 {
        let len = match self.encoder {
            Some(encoder) => encoder.encode_ordinary(text).len(),
            None => text.len(),
        };
        u32::try_from(len).unwrap_or(u32::MAX)
    }

    /// Estimate for a full request: system instruction plus every turn,
    /// each carrying a fixed overhead.
    #[must_use]
    pub fn count_request(&self, system: &str, turns: &[Turn]) -> u32 {
        let system_tokens = self.count_str(system).saturating_add(MESSAGE_OVERHEAD);
        turns.iter().fold(system_tokens, |acc, turn| {
            acc.saturating_add(self.count_str(turn.role().as_str()))
                .saturating_add(self.count_str(turn.content()))
                .saturating_add(MESSAGE_OVERHEAD)
        })
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}
