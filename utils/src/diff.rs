//! Line diffs between two versions of an artifact.

use std::fmt::Write as _;

use similar::{ChangeTag, TextDiff};

/// Added/removed line counts between two texts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffStats {
    pub additions: u32,
    pub deletions: u32,
}

impl DiffStats {
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.additions == 0 && self.deletions == 0
    }
}

/// Format a line diff between `old` and `new`.
///
/// Produces output with:
/// - 1 line of context around each change
/// - `...` between changes separated by >3 unchanged lines
/// - `-` for deletions (old line numbers), `+` for additions (new line numbers)
///
/// Returns an empty string when the texts are identical.
#[must_use]
pub fn format_line_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let changes: Vec<_> = diff.iter_all_changes().collect();
    if changes.iter().all(|c| c.tag() == ChangeTag::Equal) {
        return String::new();
    }

    let max_line = old.lines().count().max(new.lines().count()).max(1);
    let width = max_line.to_string().len();
    let gap_marker = format!("{:>width$}\n", "...");

    let mut out = String::new();
    let mut last_output_idx: Option<usize> = None;

    for (i, change) in changes.iter().enumerate() {
        let (marker, line_no) = match change.tag() {
            ChangeTag::Equal => {
                let near_prev = i > 0 && changes[i - 1].tag() != ChangeTag::Equal;
                let near_next = changes
                    .get(i + 1)
                    .is_some_and(|c| c.tag() != ChangeTag::Equal);
                if !(near_prev || near_next) {
                    continue;
                }
                (' ', change.old_index())
            }
            ChangeTag::Delete => ('-', change.old_index()),
            ChangeTag::Insert => ('+', change.new_index()),
        };

        if let Some(last_idx) = last_output_idx
            && i - last_idx - 1 > 3
        {
            out.push_str(&gap_marker);
        }
        let line_no = line_no.map_or(0, |idx| idx + 1);
        let _ = write!(out, "{line_no:>width$} {marker}");
        out.push_str(change.value().trim_end_matches('\n'));
        out.push('\n');
        last_output_idx = Some(i);
    }

    out
}

/// Count added and removed lines between `old` and `new`.
#[must_use]
pub fn compute_diff_stats(old: &str, new: &str) -> DiffStats {
    let diff = TextDiff::from_lines(old, new);
    let mut stats = DiffStats::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stats.additions += 1,
            ChangeTag::Delete => stats.deletions += 1,
            ChangeTag::Equal => {}
        }
    }
    stats
}
