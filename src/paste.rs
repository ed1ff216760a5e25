//! Paste registry and expanded-paste descriptor (spec.md §3/§4.5.2).
//!
//! Generalizes `chat_composer.rs`'s `pending_pastes: Vec<(String, String)>`
//! plus its `large_paste_counters: HashMap<usize, usize>` collision table
//! into a single id-keyed registry, since this engine needs the full
//! placeholder id (not just a char-count bucket) to support both the
//! `lines` and `chars` placeholder forms and their independent counters.

use std::collections::HashMap;

/// A pasted block large enough to be collapsed to a placeholder: more than
/// 5 lines, or more than 500 characters.
pub fn is_large_paste(text: &str) -> bool {
    let line_count = text.matches('\n').count() + 1;
    line_count > 5 || crate::unicode::code_point_len(text) > 500
}

/// Mapping from placeholder id to the original pasted text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasteRegistry {
    entries: HashMap<String, String>,
    /// Next disambiguating suffix per placeholder base, so repeated pastes
    /// of the same size get `#2`, `#3`, ... rather than colliding.
    next_suffix: HashMap<String, usize>,
}

impl PasteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<String> {
        self.entries.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_suffix.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Allocate a fresh placeholder id for `text` (already known to qualify
    /// as a large paste) and store the mapping. Returns the generated id.
    pub fn insert_new(&mut self, text: &str) -> String {
        let line_count = text.matches('\n').count() + 1;
        let base = if line_count > 5 {
            format!("[Pasted Text: {line_count} lines]")
        } else {
            format!("[Pasted Text: {} chars]", crate::unicode::code_point_len(text))
        };
        let id = self.disambiguate(&base);
        tracing::debug!(id = %id, len = text.len(), "allocated paste placeholder");
        self.entries.insert(id.clone(), text.to_string());
        id
    }

    /// Re-insert `text` under a caller-supplied id (used when restoring an
    /// undo snapshot or rehydrating an expansion round trip). Does not run
    /// collision disambiguation.
    pub fn insert_with_id(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(id.into(), text.into());
    }

    fn disambiguate(&mut self, base: &str) -> String {
        let counter = self.next_suffix.entry(base.to_string()).or_insert(0);
        *counter += 1;
        if *counter == 1 {
            base.to_string()
        } else {
            tracing::trace!(%base, suffix = *counter, "placeholder id collision, disambiguating");
            let closing = base.rfind(']').unwrap_or(base.len());
            format!("{} #{}]", &base[..closing], *counter)
        }
    }

    /// Drop any entry not referenced by `referenced_ids` (occurrences in
    /// `lines`) or the active expansion's id. Enforces invariant I3.
    pub fn prune_unreferenced(&mut self, referenced_ids: &[&str], expanded_id: Option<&str>) {
        self.entries.retain(|id, _| {
            referenced_ids.contains(&id.as_str()) || expanded_id == Some(id.as_str())
        });
    }
}

/// Records that the placeholder identified by `id` is currently expanded
/// inline over `line_count` consecutive logical lines starting at
/// `start_line`, with `prefix`/`suffix` holding the parts of the original
/// containing line that sat before/after the placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedPaste {
    pub id: String,
    pub start_line: usize,
    pub line_count: usize,
    pub prefix: String,
    pub suffix: String,
}

impl ExpandedPaste {
    pub fn end_line(&self) -> usize {
        self.start_line + self.line_count
    }
}

/// Shift an expansion descriptor after an edit that changed line counts,
/// starting at `change_start` by `line_delta` lines (spec.md §4.5.4).
/// Deletions or multi-line insertions that start strictly inside the
/// expanded region detach it (the caller is responsible for then dropping
/// the registry entry).
pub fn shift_expanded_region(
    descriptor: Option<ExpandedPaste>,
    change_start: usize,
    line_delta: isize,
    change_end: Option<usize>,
) -> Option<ExpandedPaste> {
    let d = descriptor?;
    let overlaps = change_start < d.end_line() && change_end.unwrap_or(change_start) > d.start_line;
    let starts_inside = change_start > d.start_line && change_start < d.end_line();
    if (overlaps && line_delta < 0) || (starts_inside && line_delta != 0) {
        return None;
    }
    if d.start_line >= change_start {
        let shifted = (d.start_line as isize + line_delta).max(0) as usize;
        return Some(ExpandedPaste { start_line: shifted, ..d });
    }
    Some(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn large_paste_threshold() {
        assert!(!is_large_paste(&"a\n".repeat(5).trim_end_matches('\n').to_string()));
        assert!(is_large_paste("a\nb\nc\nd\ne\nf"));
        assert!(!is_large_paste(&"x".repeat(500)));
        assert!(is_large_paste(&"x".repeat(501)));
    }

    #[test]
    fn insert_new_generates_lines_placeholder() {
        let mut reg = PasteRegistry::new();
        let id = reg.insert_new("a\nb\nc\nd\ne\nf");
        assert_eq!(id, "[Pasted Text: 6 lines]");
        assert_eq!(reg.get(&id), Some("a\nb\nc\nd\ne\nf"));
    }

    #[test]
    fn collision_gets_disambiguating_suffix() {
        let mut reg = PasteRegistry::new();
        let text = "x".repeat(600);
        let id1 = reg.insert_new(&text);
        let id2 = reg.insert_new(&text);
        assert_eq!(id1, "[Pasted Text: 600 chars]");
        assert_eq!(id2, "[Pasted Text: 600 chars #2]");
    }

    #[test]
    fn prune_drops_unreferenced() {
        let mut reg = PasteRegistry::new();
        let id = reg.insert_new("a\nb\nc\nd\ne\nf");
        reg.prune_unreferenced(&[], None);
        assert!(!reg.contains(&id));
    }

    #[test]
    fn shift_detaches_on_overlapping_deletion() {
        let d = ExpandedPaste {
            id: "x".into(),
            start_line: 2,
            line_count: 3,
            prefix: String::new(),
            suffix: String::new(),
        };
        let shifted = shift_expanded_region(Some(d), 3, -1, Some(4));
        assert!(shifted.is_none());
    }

    #[test]
    fn shift_moves_region_after_earlier_edit() {
        let d = ExpandedPaste {
            id: "x".into(),
            start_line: 5,
            line_count: 2,
            prefix: String::new(),
            suffix: String::new(),
        };
        let shifted = shift_expanded_region(Some(d), 1, 2, Some(1)).unwrap();
        assert_eq!(shifted.start_line, 7);
    }
}
