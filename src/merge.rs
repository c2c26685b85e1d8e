//! Merger.
//!
//! Three-way textual merge with signature `(current, base, desired) →
//! merged`: diff `base → desired` at the character level, then apply the
//! resulting hunks to `current`, discarding any hunk whose anchor text no
//! longer appears where expected. This is best-effort by design: the only
//! contract is that the current on-disk content is never lost, never that
//! the merge is semantically correct.

use similar::{ChangeTag, TextDiff};

enum Hunk {
    /// Text common to `base` and `desired`, used only to re-anchor the
    /// cursor in `current`.
    Equal(String),
    /// A region that changed from `old` (as it read in `base`) to `new` (as
    /// it reads in `desired`).
    Change { old: String, new: String },
}

/// Reconcile `desired` (the client's edit, diverging from `base`) against
/// `current` (what is actually on disk or cached right now).
pub fn merge(current: &str, base: &str, desired: &str) -> String {
    if base == current {
        return desired.to_string();
    }

    let hunks = diff_hunks(base, desired);
    apply_hunks(current, &hunks)
}

fn diff_hunks(base: &str, desired: &str) -> Vec<Hunk> {
    let diff = TextDiff::from_chars(base, desired);

    let mut hunks = Vec::new();
    let mut eq_buf = String::new();
    let mut old_buf = String::new();
    let mut new_buf = String::new();

    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Equal => {
                flush_change(&mut hunks, &mut old_buf, &mut new_buf);
                eq_buf.push_str(change.value());
            }
            ChangeTag::Delete => {
                flush_equal(&mut hunks, &mut eq_buf);
                old_buf.push_str(change.value());
            }
            ChangeTag::Insert => {
                flush_equal(&mut hunks, &mut eq_buf);
                new_buf.push_str(change.value());
            }
        }
    }
    flush_equal(&mut hunks, &mut eq_buf);
    flush_change(&mut hunks, &mut old_buf, &mut new_buf);

    hunks
}

fn flush_equal(hunks: &mut Vec<Hunk>, eq_buf: &mut String) {
    if !eq_buf.is_empty() {
        hunks.push(Hunk::Equal(std::mem::take(eq_buf)));
    }
}

fn flush_change(hunks: &mut Vec<Hunk>, old_buf: &mut String, new_buf: &mut String) {
    if !old_buf.is_empty() || !new_buf.is_empty() {
        hunks.push(Hunk::Change {
            old: std::mem::take(old_buf),
            new: std::mem::take(new_buf),
        });
    }
}

/// Walk `current` with a cursor, consuming each hunk in order. Equal hunks
/// re-anchor the cursor by locating their text ahead of it; change hunks
/// apply only when their `old` text is still found intact, otherwise they
/// are discarded and `current`'s own text flows through untouched.
fn apply_hunks(current: &str, hunks: &[Hunk]) -> String {
    let mut result = String::with_capacity(current.len());
    let mut cursor = 0usize;

    for hunk in hunks {
        match hunk {
            Hunk::Equal(text) => {
                if let Some(rel) = current[cursor..].find(text.as_str()) {
                    let end = cursor + rel + text.len();
                    result.push_str(&current[cursor..end]);
                    cursor = end;
                }
                // Context lost: leave the cursor where it is: the next hunk
                // (or the final flush) recovers whatever current still has.
            }
            Hunk::Change { old, new } => {
                if old.is_empty() {
                    result.push_str(new);
                } else if let Some(rel) = current[cursor..].find(old.as_str()) {
                    let start = cursor + rel;
                    result.push_str(&current[cursor..start]);
                    result.push_str(new);
                    cursor = start + old.len();
                }
                // else: hunk discarded, current's text is untouched here.
            }
        }
    }

    result.push_str(&current[cursor..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_conflict_applies_desired_cleanly() {
        let current = "hello";
        let base = "hello";
        let desired = "hello world";
        assert_eq!(merge(current, base, desired), "hello world");
    }

    #[test]
    fn disjoint_edits_merge_cleanly() {
        let base = "line one\nline two\nline three\n";
        let current = "line one\nline two CHANGED\nline three\n";
        let desired = "line one CHANGED\nline two\nline three\n";
        let merged = merge(current, base, desired);
        assert!(merged.contains("line one CHANGED"));
        assert!(merged.contains("line two CHANGED"));
    }

    #[test]
    fn pins_deterministic_best_effort_result() {
        // The change hunk (brown -> blue) no longer matches "red" at the
        // same position, so it is discarded and current's own edit survives.
        let base = "The quick brown fox";
        let current = "The quick red fox";
        let desired = "The quick blue fox";
        assert_eq!(merge(current, base, desired), "The quick red fox");
    }

    #[test]
    fn never_loses_current_on_fully_divergent_patch() {
        let current = "completely unrelated content";
        let base = "";
        let desired = "";
        assert_eq!(merge(current, base, desired), current);
    }

    #[test]
    fn empty_base_and_current_equal_takes_fast_path() {
        assert_eq!(merge("", "", "new content"), "new content");
    }

    #[test]
    fn pure_insertion_is_appended_at_anchor() {
        let base = "abc";
        let current = "abc";
        let desired = "abXc";
        assert_eq!(merge(current, base, desired), "abXc");
    }
}
