//! Buffer state and the pure-style reducer (spec.md §4.5).
//!
//! Generalizes `textarea.rs`'s `replace_range_raw` (cursor-shift arithmetic
//! for edits before/inside/after the affected range) from a single flat
//! string to a `Vec<String>` of logical lines, and its `UndoSnapshot`/
//! `undo_stack` (capped, full-snapshot undo) to a paired undo/redo stack
//! that also snapshots the paste registry and expansion descriptor.

use crate::layout::Layout;
use crate::layout::compute_layout;
use crate::paste::ExpandedPaste;
use crate::paste::PasteRegistry;
use crate::paste::is_large_paste;
use crate::paste::shift_expanded_region;
use crate::transform::TransformationType;
use crate::transform::Transformation;
use crate::transform::compute_transformations;
use crate::transform::transform_under_cursor;
use crate::unicode::char_width;
use crate::unicode::code_point_len;
use crate::unicode::code_point_slice;
use crate::unicode::display_width;
use crate::word;

const HISTORY_CAP: usize = 100;

/// Where to place the cursor after [`BufferState::set_text`].
#[derive(Debug, Clone, Copy)]
pub enum CursorPosition {
    Start,
    End,
    Offset(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDir {
    Left,
    Right,
    Up,
    Down,
    WordLeft,
    WordRight,
    Home,
    End,
}

/// The closed set of reducer actions (spec.md §4.5.1/§4.5.2). Kept as an
/// enum, per spec.md §9, so a match over it is exhaustive at compile time;
/// [`BufferState::dispatch`] is the single place that pattern-matches it.
#[derive(Debug, Clone)]
pub enum Action {
    SetText { text: String, cursor: ActionCursor, push_to_undo: bool },
    Insert { payload: String, is_paste: bool },
    Backspace,
    Delete,
    DeleteWordLeft,
    DeleteWordRight,
    KillLineRight,
    KillLineLeft,
    Move(MoveDir),
    SetCursor { row: usize, col: usize, preferred_col: Option<usize> },
    ReplaceRange { start: (usize, usize), end: (usize, usize), text: String },
    MoveToOffset(usize),
    Undo,
    Redo,
    TogglePasteExpansion { id: String, row: usize, col: usize },
}

/// Mirrors [`CursorPosition`] but is `Clone`-friendly for embedding in
/// [`Action`].
#[derive(Debug, Clone, Copy)]
pub enum ActionCursor {
    Start,
    End,
    Offset(usize),
}

impl From<ActionCursor> for CursorPosition {
    fn from(c: ActionCursor) -> Self {
        match c {
            ActionCursor::Start => CursorPosition::Start,
            ActionCursor::End => CursorPosition::End,
            ActionCursor::Offset(o) => CursorPosition::Offset(o),
        }
    }
}

/// Options threaded through `insert`/`setText` from the host adapter's
/// configuration (spec.md §4.5.1, §4.6).
#[derive(Default)]
pub struct InsertOptions<'a> {
    pub single_line: bool,
    pub input_filter: Option<&'a dyn Fn(&str) -> String>,
}

#[derive(Debug, Clone)]
struct UndoEntry {
    lines: Vec<String>,
    cursor_row: usize,
    cursor_col: usize,
    paste_registry: PasteRegistry,
    expanded_paste: Option<ExpandedPaste>,
}

/// The buffer's full state: logical lines, cursor, undo/redo history, the
/// paste registry, the active expansion, and the derived (but cached)
/// visual layout.
#[derive(Debug, Clone)]
pub struct BufferState {
    pub lines: Vec<String>,
    pub cursor_row: usize,
    pub cursor_col: usize,
    pub preferred_col: Option<usize>,
    undo_stack: Vec<UndoEntry>,
    redo_stack: Vec<UndoEntry>,
    pub paste_registry: PasteRegistry,
    pub expanded_paste: Option<ExpandedPaste>,
    pub viewport_width: usize,
    pub layout: Layout,
}

impl Default for BufferState {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferState {
    pub fn new() -> Self {
        let lines = vec![String::new()];
        let layout = compute_layout(&lines, 80, (0, 0));
        Self {
            lines,
            cursor_row: 0,
            cursor_col: 0,
            preferred_col: None,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            paste_registry: PasteRegistry::new(),
            expanded_paste: None,
            viewport_width: 80,
            layout,
        }
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.cursor_row, self.cursor_col)
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn set_viewport_width(&mut self, width: usize) {
        if width != self.viewport_width {
            self.viewport_width = width.max(1);
            self.recompute_layout();
        }
    }

    fn recompute_layout(&mut self) {
        self.layout = compute_layout(&self.lines, self.viewport_width, (self.cursor_row, self.cursor_col));
    }

    fn snapshot(&self) -> UndoEntry {
        UndoEntry {
            lines: self.lines.clone(),
            cursor_row: self.cursor_row,
            cursor_col: self.cursor_col,
            paste_registry: self.paste_registry.clone(),
            expanded_paste: self.expanded_paste.clone(),
        }
    }

    fn push_undo(&mut self) {
        self.undo_stack.push(self.snapshot());
        if self.undo_stack.len() > HISTORY_CAP {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    fn restore(&mut self, entry: UndoEntry) {
        self.lines = entry.lines;
        self.cursor_row = entry.cursor_row.min(self.lines.len().saturating_sub(1));
        self.cursor_col = entry.cursor_col;
        self.paste_registry = entry.paste_registry;
        self.expanded_paste = entry.expanded_paste;
        self.preferred_col = None;
        self.recompute_layout();
    }

    /// Single dispatch entry point: a pure-style `(state, action) -> state`
    /// reduction, implemented as an in-place mutation for efficiency.
    pub fn dispatch(&mut self, action: Action) {
        match action {
            Action::SetText { text, cursor, push_to_undo } => {
                self.set_text(&text, cursor.into(), push_to_undo)
            }
            Action::Insert { payload, is_paste } => {
                self.insert(&payload, is_paste, &InsertOptions::default())
            }
            Action::Backspace => self.backspace(),
            Action::Delete => self.delete(),
            Action::DeleteWordLeft => self.delete_word_left(),
            Action::DeleteWordRight => self.delete_word_right(),
            Action::KillLineRight => self.kill_line_right(),
            Action::KillLineLeft => self.kill_line_left(),
            Action::Move(dir) => self.move_cursor(dir),
            Action::SetCursor { row, col, preferred_col } => self.set_cursor(row, col, preferred_col),
            Action::ReplaceRange { start, end, text } => {
                self.replace_range(start.0, start.1, end.0, end.1, &text);
            }
            Action::MoveToOffset(offset) => self.move_to_offset(offset),
            Action::Undo => self.undo(),
            Action::Redo => self.redo(),
            Action::TogglePasteExpansion { id, row, col } => self.toggle_paste_expansion(&id, row, col),
        }
    }

    // ---- newline normalisation / splitting ----

    pub fn normalize_newlines(text: &str) -> String {
        text.replace("\r\n", "\n").replace('\r', "\n")
    }

    fn split_lines(text: &str) -> Vec<String> {
        text.split('\n').map(str::to_string).collect()
    }

    // ---- flat offset helpers ----

    fn pos_to_flat(lines: &[String], row: usize, col: usize) -> usize {
        let mut flat = 0usize;
        for line in &lines[..row] {
            flat += code_point_len(line) + 1;
        }
        flat + col
    }

    fn flat_to_pos(lines: &[String], mut flat: usize) -> (usize, usize) {
        for (row, line) in lines.iter().enumerate() {
            let len = code_point_len(line);
            if flat <= len {
                return (row, flat);
            }
            flat -= len + 1;
        }
        let last = lines.len().saturating_sub(1);
        (last, code_point_len(lines.last().map(String::as_str).unwrap_or("")))
    }

    /// Splice `text` into the flattened buffer between `start` and `end`
    /// (logical `(row, col)` pairs), updating lines, cursor, and the
    /// expansion descriptor. Returns the cursor position just after the
    /// inserted text.
    fn replace_logical_range(&mut self, start: (usize, usize), end: (usize, usize), text: &str) -> (usize, usize) {
        let joined = self.lines.join("\n");
        let start_flat = Self::pos_to_flat(&self.lines, start.0, start.1);
        let end_flat = Self::pos_to_flat(&self.lines, end.0, end.1);
        let start_byte = crate::unicode::byte_of_code_point(&joined, start_flat);
        let end_byte = crate::unicode::byte_of_code_point(&joined, end_flat);
        let mut new_joined = String::with_capacity(joined.len() + text.len());
        new_joined.push_str(&joined[..start_byte]);
        new_joined.push_str(text);
        new_joined.push_str(&joined[end_byte..]);

        let new_lines = Self::split_lines(&new_joined);
        let line_delta = new_lines.len() as isize - self.lines.len() as isize;

        let old_expanded = self.expanded_paste.take();
        let shifted = shift_expanded_region(old_expanded.clone(), start.0, line_delta, Some(end.0 + 1));
        if shifted.is_none() {
            if let Some(old) = old_expanded {
                self.paste_registry.remove(&old.id);
            }
        }
        self.expanded_paste = shifted;

        self.lines = new_lines;
        let new_flat = start_flat + code_point_len(text);
        Self::flat_to_pos(&self.lines, new_flat)
    }

    /// Drop any paste-registry entry no longer referenced in the buffer
    /// text (and not the active expansion). Exposed for
    /// `external_editor`'s post-round-trip cleanup.
    pub fn prune_unused_pastes(&mut self) {
        self.prune_registry();
    }

    fn prune_registry(&mut self) {
        let joined = self.lines.join("\n");
        let referenced: Vec<String> = self
            .paste_registry
            .ids()
            .filter(|id| joined.contains(*id))
            .map(str::to_string)
            .collect();
        let refs: Vec<&str> = referenced.iter().map(String::as_str).collect();
        let expanded_id = self.expanded_paste.as_ref().map(|e| e.id.as_str());
        self.paste_registry.prune_unreferenced(&refs, expanded_id);
    }

    fn detach_if_needed(&mut self) {
        if let Some(exp) = self.expanded_paste.clone() {
            if self.cursor_row >= exp.start_line && self.cursor_row < exp.end_line() {
                self.paste_registry.remove(&exp.id);
                self.expanded_paste = None;
            }
        }
    }

    fn transform_at(&self, row: usize, col: usize) -> Option<Transformation> {
        let spans = compute_transformations(self.lines.get(row).map(String::as_str).unwrap_or(""));
        transform_under_cursor(col, &spans, false).cloned()
    }

    fn reset_preferred_col_if_crossed_boundary(&mut self, old: (usize, usize)) {
        let before = self.transform_at(old.0, old.1).map(|t| (t.log_start, t.log_end));
        let after = self.transform_at(self.cursor_row, self.cursor_col).map(|t| (t.log_start, t.log_end));
        if before != after {
            self.preferred_col = None;
        }
    }

    // ---- §4.5.1 primitive actions ----

    pub fn set_text(&mut self, text: &str, cursor: CursorPosition, push_to_undo: bool) {
        let normalized = Self::normalize_newlines(text);
        let new_lines = Self::split_lines(&normalized);
        if push_to_undo {
            self.push_undo();
        }
        self.lines = new_lines;
        if normalized.is_empty() {
            self.paste_registry.clear();
            self.expanded_paste = None;
        }
        let (row, col) = match cursor {
            CursorPosition::Start => (0, 0),
            CursorPosition::End => {
                let last = self.lines.len() - 1;
                (last, code_point_len(&self.lines[last]))
            }
            CursorPosition::Offset(o) => Self::flat_to_pos(&self.lines, o),
        };
        self.cursor_row = row;
        self.cursor_col = col;
        self.preferred_col = None;
        self.recompute_layout();
    }

    pub fn insert(&mut self, payload: &str, is_paste: bool, options: &InsertOptions) {
        self.push_undo();
        self.detach_if_needed();

        let mut text = if is_paste { Self::normalize_newlines(payload) } else { payload.to_string() };
        if is_paste && is_large_paste(&text) {
            text = self.paste_registry.insert_new(&text);
        }
        if options.single_line {
            text = text.replace('\n', "");
        }
        if let Some(filter) = options.input_filter {
            text = filter(&text);
        }

        let (row, col) = (self.cursor_row, self.cursor_col);
        let new_cursor = self.replace_logical_range((row, col), (row, col), &text);
        self.cursor_row = new_cursor.0;
        self.cursor_col = new_cursor.1;
        self.preferred_col = None;
        self.recompute_layout();
    }

    pub fn backspace(&mut self) {
        let (row, col) = (self.cursor_row, self.cursor_col);
        let spans = compute_transformations(&self.lines[row]);
        let atomic = spans.into_iter().find(|s| s.log_end == col);
        if atomic.is_none() && row == 0 && col == 0 {
            return;
        }
        self.push_undo();
        self.detach_if_needed();
        if let Some(span) = atomic {
            if span.kind == TransformationType::Paste {
                if let Some(id) = &span.id {
                    self.paste_registry.remove(id);
                }
            }
            self.replace_logical_range((row, span.log_start), (row, span.log_end), "");
            self.cursor_row = row;
            self.cursor_col = span.log_start;
        } else if col == 0 {
            let prev_len = code_point_len(&self.lines[row - 1]);
            let pos = self.replace_logical_range((row - 1, prev_len), (row, 0), "");
            self.cursor_row = pos.0;
            self.cursor_col = pos.1;
        } else {
            let target = col - 1;
            self.replace_logical_range((row, target), (row, col), "");
            self.cursor_row = row;
            self.cursor_col = target;
        }
        self.preferred_col = None;
        self.prune_registry();
        self.recompute_layout();
    }

    pub fn delete(&mut self) {
        let (row, col) = (self.cursor_row, self.cursor_col);
        let spans = compute_transformations(&self.lines[row]);
        let atomic = spans.into_iter().find(|s| s.log_start == col);
        let at_end_of_buffer = row == self.lines.len() - 1 && col == code_point_len(&self.lines[row]);
        if atomic.is_none() && at_end_of_buffer {
            return;
        }
        self.push_undo();
        self.detach_if_needed();
        if let Some(span) = atomic {
            if span.kind == TransformationType::Paste {
                if let Some(id) = &span.id {
                    self.paste_registry.remove(id);
                }
            }
            self.replace_logical_range((row, span.log_start), (row, span.log_end), "");
            self.cursor_row = row;
            self.cursor_col = span.log_start;
        } else {
            let line_len = code_point_len(&self.lines[row]);
            if col == line_len {
                self.replace_logical_range((row, col), (row + 1, 0), "");
                self.cursor_row = row;
                self.cursor_col = col;
            } else {
                self.replace_logical_range((row, col), (row, col + 1), "");
                self.cursor_row = row;
                self.cursor_col = col;
            }
        }
        self.preferred_col = None;
        self.prune_registry();
        self.recompute_layout();
    }

    pub fn delete_word_left(&mut self) {
        let (row, col) = (self.cursor_row, self.cursor_col);
        if row == 0 && col == 0 {
            return;
        }
        if col == 0 {
            self.backspace();
            return;
        }
        let target = word::prev_word_start(&self.lines[row], col);
        self.push_undo();
        self.detach_if_needed();
        self.replace_logical_range((row, target), (row, col), "");
        self.cursor_row = row;
        self.cursor_col = target;
        self.preferred_col = None;
        self.prune_registry();
        self.recompute_layout();
    }

    pub fn delete_word_right(&mut self) {
        let (row, col) = (self.cursor_row, self.cursor_col);
        let line_len = code_point_len(&self.lines[row]);
        let at_end_of_buffer = row == self.lines.len() - 1 && col == line_len;
        if at_end_of_buffer {
            return;
        }
        if col == line_len {
            self.delete();
            return;
        }
        let target = word::next_word_start(&self.lines[row], col).unwrap_or(line_len);
        self.push_undo();
        self.detach_if_needed();
        self.replace_logical_range((row, col), (row, target), "");
        self.cursor_row = row;
        self.cursor_col = col;
        self.preferred_col = None;
        self.prune_registry();
        self.recompute_layout();
    }

    pub fn kill_line_right(&mut self) {
        let (row, col) = (self.cursor_row, self.cursor_col);
        let eol = code_point_len(&self.lines[row]);
        let at_end_of_buffer = row == self.lines.len() - 1 && col == eol;
        if at_end_of_buffer {
            return;
        }
        self.push_undo();
        self.detach_if_needed();
        if col == eol {
            self.replace_logical_range((row, col), (row + 1, 0), "");
        } else {
            self.replace_logical_range((row, col), (row, eol), "");
        }
        self.cursor_row = row;
        self.cursor_col = col;
        self.preferred_col = None;
        self.prune_registry();
        self.recompute_layout();
    }

    pub fn kill_line_left(&mut self) {
        let (row, col) = (self.cursor_row, self.cursor_col);
        if row == 0 && col == 0 {
            return;
        }
        self.push_undo();
        self.detach_if_needed();
        if col == 0 {
            let prev_len = code_point_len(&self.lines[row - 1]);
            let pos = self.replace_logical_range((row - 1, prev_len), (row, 0), "");
            self.cursor_row = pos.0;
            self.cursor_col = pos.1;
        } else {
            self.replace_logical_range((row, 0), (row, col), "");
            self.cursor_row = row;
            self.cursor_col = 0;
        }
        self.preferred_col = None;
        self.prune_registry();
        self.recompute_layout();
    }

    pub fn set_cursor(&mut self, row: usize, col: usize, preferred_col: Option<usize>) {
        let row = row.min(self.lines.len() - 1);
        let col = col.min(code_point_len(&self.lines[row]));
        self.cursor_row = row;
        self.cursor_col = col;
        self.preferred_col = preferred_col;
        self.recompute_layout();
    }

    pub fn replace_range(&mut self, start_row: usize, start_col: usize, end_row: usize, end_col: usize, text: &str) {
        if !self.range_is_valid(start_row, start_col, end_row, end_col) {
            return;
        }
        self.push_undo();
        let normalized = Self::normalize_newlines(text);
        let new_cursor = self.replace_logical_range((start_row, start_col), (end_row, end_col), &normalized);
        self.cursor_row = new_cursor.0;
        self.cursor_col = new_cursor.1;
        self.preferred_col = None;
        self.detach_if_needed();
        self.prune_registry();
        self.recompute_layout();
    }

    fn range_is_valid(&self, start_row: usize, start_col: usize, end_row: usize, end_col: usize) -> bool {
        if start_row >= self.lines.len() || end_row >= self.lines.len() {
            return false;
        }
        if (start_row, start_col) > (end_row, end_col) {
            return false;
        }
        start_col <= code_point_len(&self.lines[start_row]) && end_col <= code_point_len(&self.lines[end_row])
    }

    pub fn move_to_offset(&mut self, offset: usize) {
        let (row, col) = Self::flat_to_pos(&self.lines, offset);
        self.set_cursor(row, col, None);
    }

    pub fn undo(&mut self) {
        if let Some(prev) = self.undo_stack.pop() {
            let cur = self.snapshot();
            self.redo_stack.push(cur);
            if self.redo_stack.len() > HISTORY_CAP {
                self.redo_stack.remove(0);
            }
            self.restore(prev);
        }
    }

    pub fn redo(&mut self) {
        if let Some(next) = self.redo_stack.pop() {
            let cur = self.snapshot();
            self.undo_stack.push(cur);
            if self.undo_stack.len() > HISTORY_CAP {
                self.undo_stack.remove(0);
            }
            self.restore(next);
        }
    }

    // ---- movement (spec.md §4.5.1, visual-line aware) ----

    pub fn move_cursor(&mut self, dir: MoveDir) {
        match dir {
            MoveDir::Left => self.move_left(),
            MoveDir::Right => self.move_right(),
            MoveDir::Up => self.move_vertical(true),
            MoveDir::Down => self.move_vertical(false),
            MoveDir::WordLeft => self.move_word_left(),
            MoveDir::WordRight => self.move_word_right(),
            MoveDir::Home => self.move_home(),
            MoveDir::End => self.move_end(),
        }
    }

    fn move_left(&mut self) {
        if self.cursor_col > 0 {
            self.cursor_col -= 1;
        } else if self.cursor_row > 0 {
            self.cursor_row -= 1;
            self.cursor_col = code_point_len(&self.lines[self.cursor_row]);
        }
        self.preferred_col = None;
        self.recompute_layout();
    }

    fn move_right(&mut self) {
        let line_len = code_point_len(&self.lines[self.cursor_row]);
        if self.cursor_col < line_len {
            self.cursor_col += 1;
        } else if self.cursor_row + 1 < self.lines.len() {
            self.cursor_row += 1;
            self.cursor_col = 0;
        }
        self.preferred_col = None;
        self.recompute_layout();
    }

    fn move_word_left(&mut self) {
        let old = (self.cursor_row, self.cursor_col);
        if old.1 == 0 && old.0 == 0 {
            return;
        }
        let pos = word::prev_word_start_across(&self.lines, old.0, old.1, false);
        self.cursor_row = pos.row;
        self.cursor_col = pos.col;
        self.preferred_col = None;
        self.recompute_layout();
    }

    fn move_word_right(&mut self) {
        let old = (self.cursor_row, self.cursor_col);
        let last_row = self.lines.len() - 1;
        if old.0 == last_row && old.1 == code_point_len(&self.lines[last_row]) {
            return;
        }
        if let Some(pos) = word::next_word_start_across(&self.lines, old.0, old.1, false) {
            self.cursor_row = pos.row;
            self.cursor_col = pos.col;
        } else {
            self.cursor_row = last_row;
            self.cursor_col = code_point_len(&self.lines[last_row]);
        }
        self.preferred_col = None;
        self.recompute_layout();
    }

    /// Bounds of the wrapped visual segment containing `(row, col)`, as
    /// `[start, end)` logical columns on that row.
    fn visual_segment_bounds(&self, row: usize, col: usize) -> (usize, usize) {
        let line_len = code_point_len(&self.lines[row]);
        let entries = match self.layout.logical_to_visual_map.get(row) {
            Some(e) if !e.is_empty() => e,
            _ => return (0, line_len),
        };
        let mut start = entries[0].1;
        let mut end = line_len;
        for (i, &(_, s)) in entries.iter().enumerate() {
            if s <= col {
                start = s;
                end = entries.get(i + 1).map(|&(_, ns)| ns).unwrap_or(line_len);
            } else {
                break;
            }
        }
        (start, end)
    }

    fn move_home(&mut self) {
        let old = (self.cursor_row, self.cursor_col);
        let (start, _) = self.visual_segment_bounds(old.0, old.1);
        self.cursor_col = start;
        self.preferred_col = None;
        self.recompute_layout();
    }

    fn move_end(&mut self) {
        let old = (self.cursor_row, self.cursor_col);
        let (_, end) = self.visual_segment_bounds(old.0, old.1);
        self.cursor_col = end;
        self.preferred_col = None;
        self.recompute_layout();
    }

    /// Up/down movement walks wrapped visual lines (not logical lines),
    /// using `preferredCol` (a display-width target) to keep the cursor at
    /// a stable visual column across shorter lines, mirroring
    /// `textarea.rs`'s `move_cursor_up`/`move_cursor_down`.
    fn move_vertical(&mut self, up: bool) {
        let old = (self.cursor_row, self.cursor_col);
        let vc = self.layout.visual_cursor(old.0, old.1);
        let current_line = self.layout.visual_lines.get(vc.row).map(String::as_str).unwrap_or("");
        let target_width = self.preferred_col.unwrap_or_else(|| display_width(code_point_slice(current_line, 0, vc.col)));
        if self.preferred_col.is_none() {
            self.preferred_col = Some(target_width);
        }

        let target_visual_row = if up {
            match vc.row.checked_sub(1) {
                Some(r) => r,
                None => {
                    self.cursor_row = 0;
                    self.cursor_col = 0;
                    self.preferred_col = None;
                    self.recompute_layout();
                    return;
                }
            }
        } else if vc.row + 1 < self.layout.visual_lines.len() {
            vc.row + 1
        } else {
            let last = self.lines.len() - 1;
            self.cursor_row = last;
            self.cursor_col = code_point_len(&self.lines[last]);
            self.preferred_col = None;
            self.recompute_layout();
            return;
        };

        let target_text = self.layout.visual_lines[target_visual_row].clone();
        let local_col = Self::col_for_display_width(&target_text, target_width);
        if let Some((row, col)) = self.layout.logical_position_from_visual(target_visual_row, local_col) {
            self.cursor_row = row;
            self.cursor_col = col;
        }
        self.reset_preferred_col_if_crossed_boundary(old);
        self.recompute_layout();
    }

    fn col_for_display_width(s: &str, target: usize) -> usize {
        let mut width_so_far = 0usize;
        for (i, ch) in s.chars().enumerate() {
            width_so_far += char_width(ch);
            if width_so_far > target {
                return i;
            }
        }
        code_point_len(s)
    }

    // ---- §4.5.2 paste expansion ----

    pub fn toggle_paste_expansion(&mut self, id: &str, row: usize, col: usize) {
        if let Some(active) = self.expanded_paste.clone() {
            if active.id == id {
                self.collapse_expansion(&active);
                return;
            }
            self.collapse_expansion(&active);
        }
        self.expand_placeholder(id, row, col);
    }

    fn collapse_expansion(&mut self, active: &ExpandedPaste) {
        self.push_undo();
        // Clear the descriptor before splicing: the edit below fully replaces
        // the expanded region, which would otherwise read as an overlapping
        // deletion and make `replace_logical_range` detach (and drop the
        // registry entry for) the very id this collapse re-inserts.
        self.expanded_paste = None;
        let replacement = format!("{}{}{}", active.prefix, active.id, active.suffix);
        let end_row = active.end_line() - 1;
        let end_col = code_point_len(&self.lines[end_row]);
        self.replace_logical_range((active.start_line, 0), (end_row, end_col), &replacement);
        self.cursor_row = active.start_line;
        self.cursor_col = code_point_len(&active.prefix) + code_point_len(&active.id);
        self.expanded_paste = None;
        self.preferred_col = None;
        self.recompute_layout();
    }

    fn expand_placeholder(&mut self, id: &str, row: usize, col: usize) {
        let Some(content) = self.paste_registry.get(id).map(str::to_string) else { return };
        let found = self.find_placeholder_occurrence(id, row, col);
        let Some((prow, pcol_start, pcol_end)) = found else { return };

        self.push_undo();
        let line = self.lines[prow].clone();
        let prefix: String = code_point_slice(&line, 0, pcol_start).to_string();
        let suffix: String = code_point_slice(&line, pcol_end, code_point_len(&line)).to_string();

        let content_lines: Vec<&str> = content.split('\n').collect();
        let line_count = content_lines.len();
        let mut replacement_lines: Vec<String> = Vec::with_capacity(line_count);
        if line_count == 1 {
            replacement_lines.push(format!("{prefix}{}{suffix}", content_lines[0]));
        } else {
            replacement_lines.push(format!("{prefix}{}", content_lines[0]));
            for mid in &content_lines[1..line_count - 1] {
                replacement_lines.push((*mid).to_string());
            }
            replacement_lines.push(format!("{}{suffix}", content_lines[line_count - 1]));
        }
        let replacement = replacement_lines.join("\n");

        let line_len = code_point_len(&line);
        self.replace_logical_range((prow, 0), (prow, line_len), &replacement);

        self.expanded_paste = Some(ExpandedPaste {
            id: id.to_string(),
            start_line: prow,
            line_count,
            prefix: prefix.clone(),
            suffix: suffix.clone(),
        });
        let last_content_line = content_lines[line_count - 1];
        self.cursor_row = prow + line_count - 1;
        self.cursor_col = code_point_len(last_content_line);
        self.preferred_col = None;
        self.recompute_layout();
    }

    fn find_placeholder_occurrence(&self, id: &str, row: usize, col: usize) -> Option<(usize, usize, usize)> {
        if let Some(line) = self.lines.get(row) {
            let spans = compute_transformations(line);
            if let Some(span) = spans.iter().find(|s| {
                s.kind == TransformationType::Paste && s.id.as_deref() == Some(id) && col >= s.log_start && col <= s.log_end
            }) {
                return Some((row, span.log_start, span.log_end));
            }
        }
        for (r, line) in self.lines.iter().enumerate() {
            let spans = compute_transformations(line);
            if let Some(span) = spans.iter().find(|s| s.kind == TransformationType::Paste && s.id.as_deref() == Some(id)) {
                return Some((r, span.log_start, span.log_end));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn new_state() -> BufferState {
        let mut s = BufferState::new();
        s.set_viewport_width(80);
        s
    }

    #[test]
    fn p1_lines_never_empty() {
        let s = new_state();
        assert!(!s.lines.is_empty());
    }

    #[test]
    fn s3_large_paste_becomes_placeholder() {
        let mut s = new_state();
        s.insert("a\nb\nc\nd\ne\nf", true, &InsertOptions::default());
        assert_eq!(s.lines, vec!["[Pasted Text: 6 lines]".to_string()]);
        assert_eq!(s.text(), "[Pasted Text: 6 lines]");
    }

    #[test]
    fn r2_backspace_deletes_placeholder_atomically() {
        let mut s = new_state();
        s.insert("a\nb\nc\nd\ne\nf", true, &InsertOptions::default());
        s.backspace();
        assert_eq!(s.lines, vec!["".to_string()]);
        assert!(s.paste_registry.is_empty());
    }

    #[test]
    fn s4_toggle_expansion_round_trip() {
        let mut s = new_state();
        s.insert("a\nb\nc\nd\ne\nf", true, &InsertOptions::default());
        let id = s.lines[0].clone();
        s.toggle_paste_expansion(&id, 0, 0);
        assert_eq!(s.lines, vec!["a", "b", "c", "d", "e", "f"]);
        assert_eq!(s.cursor(), (5, 1));
        s.toggle_paste_expansion(&id, 0, 0);
        assert_eq!(s.lines, vec![id.clone()]);
        assert_eq!(s.cursor(), (0, code_point_len(&id)));
    }

    #[test]
    fn s5_detach_on_edit_inside_expansion() {
        let mut s = new_state();
        s.insert("a\nb\nc\nd\ne\nf", true, &InsertOptions::default());
        let id = s.lines[0].clone();
        s.toggle_paste_expansion(&id, 0, 0);
        s.set_cursor(2, 0, None);
        s.backspace();
        assert_eq!(s.lines, vec!["a", "bc", "d", "e", "f"]);
        assert!(s.expanded_paste.is_none());
        assert!(!s.paste_registry.contains(&id));
    }

    #[test]
    fn s1_image_collapse_and_expand() {
        let mut s = new_state();
        s.set_text("See @images/cat.png now", CursorPosition::Start, true);
        assert_eq!(s.layout.transformed_lines[0], "See [Image cat.png] now");
        s.set_cursor(0, 4, None);
        assert_eq!(s.layout.transformed_lines[0], "See @images/cat.png now");
    }

    #[test]
    fn s2_atomic_backspace_over_image() {
        let mut s = new_state();
        s.set_text("See @images/cat.png now", CursorPosition::Start, true);
        let img_len = "@images/cat.png".chars().count();
        s.set_cursor(0, 4 + img_len, None);
        s.backspace();
        assert_eq!(s.lines, vec!["See  now".to_string()]);
        assert_eq!(s.cursor(), (0, 4));
    }

    #[test]
    fn b1_empty_buffer_noops() {
        let mut s = new_state();
        s.backspace();
        s.delete();
        assert_eq!(s.lines, vec!["".to_string()]);
    }

    #[test]
    fn b4_dd_equivalent_via_replace_range_leaves_one_empty_line() {
        let mut s = new_state();
        s.set_text("alpha", CursorPosition::Start, true);
        s.replace_range(0, 0, 0, 5, "");
        assert_eq!(s.lines, vec!["".to_string()]);
        assert_eq!(s.cursor(), (0, 0));
    }

    #[test]
    fn p6_undo_redo_round_trip() {
        let mut s = new_state();
        s.set_text("hello", CursorPosition::Start, true);
        let before = s.text();
        s.insert(" world", false, &InsertOptions::default());
        s.undo();
        assert_eq!(s.text(), before);
        s.redo();
        assert_eq!(s.text(), "hello world");
    }

    #[test]
    fn r3_set_text_normalizes_line_endings() {
        let mut s = new_state();
        s.set_text("a\r\nb\rc", CursorPosition::Start, true);
        assert_eq!(s.text(), "a\nb\nc");
    }

    #[test]
    fn invalid_replace_range_is_a_noop() {
        let mut s = new_state();
        s.set_text("hi", CursorPosition::Start, true);
        s.replace_range(0, 5, 0, 1, "x");
        assert_eq!(s.text(), "hi");
    }
}
