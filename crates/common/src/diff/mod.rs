// Line-oriented diff between two text blobs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineKind {
    Unchanged,
    Added,
    Removed,
}

/// One entry of the edit script. `line_number` is 1-based: the old side's
/// number for removed lines, the new side's for added and unchanged lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub line: String,
    pub line_number: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffResult {
    pub lines: Vec<DiffLine>,
    pub stats: DiffStats,
}

/// Compute a line-level edit script from `old_text` to `new_text` using a
/// synchronized two-pointer scan.
///
/// Known limitation: this is a positional alignment, not a
/// longest-common-subsequence diff. A single line inserted or deleted in the
/// middle of a file shifts everything after it, so every subsequent line is
/// reported as a removed/added pair. That is a deliberate O(n) simplicity
/// trade-off; callers needing minimal-edit-distance output must layer an LCS
/// algorithm on top.
pub fn diff_lines(old_text: &str, new_text: &str) -> DiffResult {
    let old_lines: Vec<&str> = old_text.split('\n').collect();
    let new_lines: Vec<&str> = new_text.split('\n').collect();

    let mut lines = Vec::new();
    let mut stats = DiffStats::default();
    let mut i = 0;
    let mut j = 0;

    while i < old_lines.len() || j < new_lines.len() {
        match (old_lines.get(i), new_lines.get(j)) {
            (Some(old_line), Some(new_line)) if old_line == new_line => {
                lines.push(DiffLine {
                    kind: DiffLineKind::Unchanged,
                    line: (*old_line).to_string(),
                    line_number: j + 1,
                });
                stats.unchanged += 1;
                i += 1;
                j += 1;
            }
            (Some(old_line), Some(new_line)) => {
                lines.push(DiffLine {
                    kind: DiffLineKind::Removed,
                    line: (*old_line).to_string(),
                    line_number: i + 1,
                });
                lines.push(DiffLine {
                    kind: DiffLineKind::Added,
                    line: (*new_line).to_string(),
                    line_number: j + 1,
                });
                stats.removed += 1;
                stats.added += 1;
                i += 1;
                j += 1;
            }
            (Some(old_line), None) => {
                lines.push(DiffLine {
                    kind: DiffLineKind::Removed,
                    line: (*old_line).to_string(),
                    line_number: i + 1,
                });
                stats.removed += 1;
                i += 1;
            }
            (None, Some(new_line)) => {
                lines.push(DiffLine {
                    kind: DiffLineKind::Added,
                    line: (*new_line).to_string(),
                    line_number: j + 1,
                });
                stats.added += 1;
                j += 1;
            }
            (None, None) => unreachable!("loop condition guarantees one side remains"),
        }
    }

    DiffResult { lines, stats }
}
