//! Conversation context fed into every request.

use std::collections::VecDeque;

use quill_types::{Exchange, Turn};

pub const DEFAULT_MEMORY_LIMIT: usize = 10;

/// Ordered user/assistant turns, oldest first, bounded by `limit`.
///
/// Turns always enter and leave in user/assistant pairs, so a snapshot never
/// starts mid-exchange. With an odd limit the store holds `limit - 1` turns;
/// with a limit below 2 it holds nothing.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    turns: VecDeque<Turn>,
    limit: usize,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT)
    }
}

impl ConversationContext {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(limit.saturating_add(2)),
            limit,
        }
    }

    /// Append one completed exchange, then drop the oldest pairs until the
    /// store is back within its limit.
    pub fn append(&mut self, exchange: Exchange) {
        let (user, assistant) = exchange.into_turns();
        self.turns.push_back(user);
        self.turns.push_back(assistant);

        let before = self.turns.len();
        while self.turns.len() > self.limit {
            self.turns.pop_front();
            self.turns.pop_front();
        }
        if self.turns.len() != before {
            tracing::debug!(
                from = before,
                to = self.turns.len(),
                limit = self.limit,
                "Trimmed conversation context"
            );
        }
        debug_assert!(self.turns.len() <= self.limit);
        debug_assert!(self.turns.len() % 2 == 0);
    }

    /// Copy of the current turns, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        if !self.turns.is_empty() {
            tracing::debug!(turns = self.turns.len(), "Cleared conversation context");
        }
        self.turns.clear();
    }

    /// Change the limit. Existing turns are only trimmed on the next `append`.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Number of complete exchanges held.
    #[must_use]
    pub fn exchanges(&self) -> usize {
        self.turns.len() / 2
    }
}
