//! Shared infrastructure utilities for Quill.
//!
//! Cross-cutting helpers that several Quill crates need but that don't belong in
//! the domain-pure `quill-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`security`**: Secret redaction for failure text and logs
//! - **`diff`**: Line diffs between artifact versions

pub mod atomic_write;
pub mod diff;
pub mod security;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, PersistMode, atomic_write, atomic_write_with_options,
    ensure_private_dir,
};
pub use diff::{DiffStats, compute_diff_stats, format_line_diff};
pub use security::{redact_api_keys, sanitize_error_text};
