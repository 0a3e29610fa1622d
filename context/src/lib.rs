//! Bounded conversational context and per-artifact version history.
//!
//! Both stores are plain owned state: no locks, no IO, no async. The engine's
//! consumer loop is the only writer.
//!
//! # Architecture
//!
//! ```text
//! ConversationContext
//! └── turns: VecDeque<Turn> (user/assistant pairs, oldest first, len <= limit)
//!
//! VersionHistoryStore
//! └── histories: HashMap<ArtifactId, VersionHistory>
//!     ├── records: VecDeque<VersionRecord> (len <= MAX_VERSIONS)
//!     └── current: index of the version the live artifact matches
//! ```

mod conversation;
mod token_counter;
mod versions;

pub use conversation::{ConversationContext, DEFAULT_MEMORY_LIMIT};
pub use token_counter::TokenCounter;
pub use versions::{
    MAX_VERSIONS, RevertError, VersionHistoryStore, VersionRecord, VersionSummary,
};
