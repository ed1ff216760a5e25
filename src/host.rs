//! Host adapter (spec.md §4.6): the façade a terminal UI drives. Owns the
//! [`BufferState`], exposes read-only accessors over it and the derived
//! layout, translates host-level commands into state mutations, and tracks
//! the viewport scroll window independently of the state itself (scrolling
//! is a rendering concern, not part of the reducer's data model).

use crate::error::EditorError;
use crate::error::Feedback;
use crate::external_editor::edit_in_external_editor;
use crate::key::Command;
use crate::key::KeyCode;
use crate::key::KeyEvent;
use crate::key::resolve_emacs;
use crate::layout::VisualCursor;
use crate::paste::ExpandedPaste;
use crate::state::BufferState;
use crate::state::InsertOptions;
use crate::state::MoveDir;
use crate::transform::Transformation;
use crate::vim;
use crate::vim::Motion;

/// Host-supplied knobs that shape how input is interpreted (spec.md §4.6).
pub struct BufferConfig {
    /// Strip all newlines from inserted/pasted text (e.g. a single-line
    /// prompt field).
    pub single_line: bool,
    /// Run every inserted/pasted payload through this filter after
    /// normalisation, before splicing into the buffer.
    pub input_filter: Option<Box<dyn Fn(&str) -> String>>,
    /// Resolve vim-style modal key handling instead of the default
    /// emacs-style bindings.
    pub vim_mode: bool,
    /// Override environment-based editor resolution (tests, or a host that
    /// wants to force a specific program).
    pub preferred_editor: Option<Vec<String>>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { single_line: false, input_filter: None, vim_mode: false, preferred_editor: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VimMode {
    Normal,
    Insert,
}

#[derive(Default)]
struct VimPending {
    operator: Option<char>,
    awaiting_g: bool,
    count: String,
}

impl VimPending {
    fn take_count(&mut self) -> Option<usize> {
        if self.count.is_empty() {
            None
        } else {
            let n = self.count.parse().ok();
            self.count.clear();
            n
        }
    }

    fn reset(&mut self) {
        self.operator = None;
        self.awaiting_g = false;
        self.count.clear();
    }
}

/// The façade a terminal UI drives: state, viewport, and (if enabled) vim
/// mode's own pending-operator bookkeeping.
pub struct HostAdapter {
    state: BufferState,
    config: BufferConfig,
    scroll_row: usize,
    viewport_height: usize,
    vim_mode_state: VimMode,
    vim_pending: VimPending,
}

impl HostAdapter {
    pub fn new(config: BufferConfig) -> Self {
        let mut state = BufferState::new();
        state.set_viewport_width(80);
        Self { state, config, scroll_row: 0, viewport_height: 24, vim_mode_state: VimMode::Insert, vim_pending: VimPending::default() }
    }

    // ---- read-only accessors (spec.md §4.6) ----

    pub fn lines(&self) -> &[String] {
        &self.state.lines
    }

    pub fn text(&self) -> String {
        self.state.text()
    }

    pub fn cursor(&self) -> (usize, usize) {
        self.state.cursor()
    }

    pub fn visual_lines(&self) -> &[String] {
        &self.state.layout.visual_lines
    }

    /// The visual lines currently scrolled into view, per `viewport_height`.
    pub fn rendered_visual_lines(&self) -> &[String] {
        let total = self.state.layout.visual_lines.len();
        let start = self.scroll_row.min(total);
        let end = (start + self.viewport_height).min(total);
        &self.state.layout.visual_lines[start..end]
    }

    pub fn visual_cursor(&self) -> VisualCursor {
        let (row, col) = self.state.cursor();
        self.state.layout.visual_cursor(row, col)
    }

    pub fn visual_scroll_row(&self) -> usize {
        self.scroll_row
    }

    pub fn transformations_by_line(&self) -> &[Vec<Transformation>] {
        &self.state.layout.transformations_by_line
    }

    pub fn expanded_paste(&self) -> Option<&ExpandedPaste> {
        self.state.expanded_paste.as_ref()
    }

    pub fn pasted_content(&self, id: &str) -> Option<&str> {
        self.state.paste_registry.get(id)
    }

    pub fn is_vim_insert_mode(&self) -> bool {
        !self.config.vim_mode || self.vim_mode_state == VimMode::Insert
    }

    // ---- viewport ----

    pub fn set_viewport(&mut self, width: usize, height: usize) {
        self.state.set_viewport_width(width);
        self.viewport_height = height.max(1);
        self.ensure_cursor_visible();
    }

    fn ensure_cursor_visible(&mut self) {
        let vc = self.visual_cursor();
        if vc.row < self.scroll_row {
            self.scroll_row = vc.row;
        } else if vc.row >= self.scroll_row + self.viewport_height {
            self.scroll_row = vc.row + 1 - self.viewport_height;
        }
    }

    // ---- primitive commands ----

    fn insert_options(&self) -> InsertOptions<'_> {
        InsertOptions { single_line: self.config.single_line, input_filter: self.config.input_filter.as_deref() }
    }

    pub fn insert_char(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.insert_str(c.encode_utf8(&mut buf), false);
    }

    pub fn insert_str(&mut self, payload: &str, is_paste: bool) {
        let opts = self.insert_options();
        self.state.insert(payload, is_paste, &opts);
        self.ensure_cursor_visible();
    }

    pub fn insert_newline(&mut self) {
        self.insert_str("\n", false);
    }

    pub fn backspace(&mut self) {
        self.state.backspace();
        self.ensure_cursor_visible();
    }

    pub fn delete(&mut self) {
        self.state.delete();
        self.ensure_cursor_visible();
    }

    pub fn delete_word_left(&mut self) {
        self.state.delete_word_left();
        self.ensure_cursor_visible();
    }

    pub fn delete_word_right(&mut self) {
        self.state.delete_word_right();
        self.ensure_cursor_visible();
    }

    pub fn kill_line_right(&mut self) {
        self.state.kill_line_right();
        self.ensure_cursor_visible();
    }

    pub fn kill_line_left(&mut self) {
        self.state.kill_line_left();
        self.ensure_cursor_visible();
    }

    pub fn move_cursor(&mut self, dir: MoveDir) {
        self.state.move_cursor(dir);
        self.ensure_cursor_visible();
    }

    pub fn set_cursor(&mut self, row: usize, col: usize) {
        self.state.set_cursor(row, col, None);
        self.ensure_cursor_visible();
    }

    pub fn replace_range(&mut self, start: (usize, usize), end: (usize, usize), text: &str) {
        self.state.replace_range(start.0, start.1, end.0, end.1, text);
        self.ensure_cursor_visible();
    }

    pub fn undo(&mut self) {
        self.state.undo();
        self.ensure_cursor_visible();
    }

    pub fn redo(&mut self) {
        self.state.redo();
        self.ensure_cursor_visible();
    }

    pub fn toggle_paste_expansion(&mut self, id: &str, row: usize, col: usize) {
        self.state.toggle_paste_expansion(id, row, col);
        self.ensure_cursor_visible();
    }

    pub fn open_external_editor(&mut self) -> Result<(), EditorError> {
        if let Some(cmd) = &self.config.preferred_editor {
            let cmd = cmd.clone();
            let mut seed = self.state.text();
            for id in self.state.paste_registry.ids().map(str::to_string).collect::<Vec<_>>() {
                if let Some(content) = self.state.paste_registry.get(&id) {
                    seed = seed.replacen(&id, content, 1);
                }
            }
            let edited = crate::external_editor::run_editor(&seed, &cmd)?;
            self.state.set_text(&edited, crate::state::CursorPosition::End, true);
            self.state.prune_unused_pastes();
        } else {
            edit_in_external_editor(&mut self.state)?;
        }
        self.ensure_cursor_visible();
        Ok(())
    }

    // ---- key dispatch ----

    pub fn handle_key(&mut self, event: KeyEvent) -> Option<Feedback> {
        if self.config.vim_mode {
            self.handle_key_vim(event)
        } else {
            self.handle_key_emacs(event)
        }
    }

    fn handle_key_emacs(&mut self, event: KeyEvent) -> Option<Feedback> {
        match resolve_emacs(event) {
            Command::InsertChar(c) => self.insert_char(c),
            Command::InsertNewline => self.insert_newline(),
            Command::Backspace => self.backspace(),
            Command::Delete => self.delete(),
            Command::DeleteWordLeft => self.delete_word_left(),
            Command::DeleteWordRight => self.delete_word_right(),
            Command::KillLineRight => self.kill_line_right(),
            Command::KillLineLeft => self.kill_line_left(),
            Command::MoveLeft => self.move_cursor(MoveDir::Left),
            Command::MoveRight => self.move_cursor(MoveDir::Right),
            Command::MoveUp => self.move_cursor(MoveDir::Up),
            Command::MoveDown => self.move_cursor(MoveDir::Down),
            Command::MoveWordLeft => self.move_cursor(MoveDir::WordLeft),
            Command::MoveWordRight => self.move_cursor(MoveDir::WordRight),
            Command::MoveHome => self.move_cursor(MoveDir::Home),
            Command::MoveEnd => self.move_cursor(MoveDir::End),
            Command::Undo => self.undo(),
            Command::Redo => self.redo(),
            Command::OpenExternalEditor => {
                if let Err(e) = self.open_external_editor() {
                    return Some(Feedback::error(e.to_string()));
                }
            }
            Command::Noop => {}
        }
        None
    }

    /// Stateful modal dispatch: normal mode accumulates an optional count,
    /// an optional pending operator (`d`/`c`), and (for `gg`/`[N]G`) a
    /// pending `g`, then resolves the whole chord against [`vim`]'s
    /// motions/operators once it is complete.
    fn handle_key_vim(&mut self, event: KeyEvent) -> Option<Feedback> {
        if self.vim_mode_state == VimMode::Insert {
            if event.code == KeyCode::Esc {
                self.vim_mode_state = VimMode::Normal;
                return None;
            }
            return self.handle_key_emacs(event);
        }

        let KeyCode::Char(c) = event.code else {
            if event.code == KeyCode::Esc {
                self.vim_pending.reset();
            }
            return None;
        };

        if self.vim_pending.awaiting_g {
            self.vim_pending.awaiting_g = false;
            if c == 'g' {
                self.apply_motion_or_operator(Motion::BufferStart);
            }
            self.vim_pending.reset();
            return None;
        }

        if c.is_ascii_digit() && !(c == '0' && self.vim_pending.count.is_empty()) {
            self.vim_pending.count.push(c);
            return None;
        }

        match (self.vim_pending.operator, c) {
            (None, 'i') => self.enter_insert(vim::enter_insert_before),
            (None, 'a') => self.enter_insert(vim::enter_insert_after),
            (None, 'I') => self.enter_insert(vim::enter_insert_at_line_start),
            (None, 'A') => self.enter_insert(vim::enter_insert_at_line_end),
            (None, 'o') => self.enter_insert(vim::open_line_below),
            (None, 'O') => self.enter_insert(vim::open_line_above),
            (None, 'x') => {
                let n = self.vim_pending.take_count().unwrap_or(1);
                vim::delete_char(&mut self.state, n);
                self.vim_pending.reset();
                self.ensure_cursor_visible();
            }
            (None, 'h') => self.apply_motion_or_operator_move(MoveDir::Left),
            (None, 'l') => self.apply_motion_or_operator_move(MoveDir::Right),
            (None, 'j') => self.apply_motion_or_operator_move(MoveDir::Down),
            (None, 'k') => self.apply_motion_or_operator_move(MoveDir::Up),
            (None, 'w') => self.apply_motion_or_operator(Motion::WordForward),
            (None, 'W') => self.apply_motion_or_operator(Motion::BigWordForward),
            (None, 'b') => self.apply_motion_or_operator(Motion::WordBackward),
            (None, 'B') => self.apply_motion_or_operator(Motion::BigWordBackward),
            (None, 'e') => self.apply_motion_or_operator(Motion::WordEndForward),
            (None, 'E') => self.apply_motion_or_operator(Motion::BigWordEndForward),
            (None, '0') => self.apply_motion_or_operator(Motion::LineStart),
            (None, '^') => self.apply_motion_or_operator(Motion::FirstNonBlank),
            (None, '$') => self.apply_motion_or_operator(Motion::LineEnd),
            (None, 'G') => {
                let n = self.vim_pending.take_count();
                vim::motion(&mut self.state, Motion::BufferEndOrLine(n), 1);
                self.vim_pending.reset();
                self.ensure_cursor_visible();
            }
            (None, 'g') => {
                self.vim_pending.awaiting_g = true;
            }
            (None, 'd') | (None, 'c') => {
                self.vim_pending.operator = Some(c);
            }
            (None, 'D') => {
                vim::delete_to_end_of_line(&mut self.state);
                self.vim_pending.reset();
                self.ensure_cursor_visible();
            }
            (None, 'C') => {
                vim::delete_to_end_of_line(&mut self.state);
                self.vim_mode_state = VimMode::Insert;
                self.vim_pending.reset();
                self.ensure_cursor_visible();
            }
            (Some(op), 'w') => self.finish_operator_with_count(op, |s, n| vim::delete_word_forward(s, false, n)),
            (Some(op), 'W') => self.finish_operator_with_count(op, |s, n| vim::delete_word_forward(s, true, n)),
            (Some(op), 'b') => self.finish_operator_with_count(op, |s, n| vim::delete_word_backward(s, false, n)),
            (Some(op), 'B') => self.finish_operator_with_count(op, |s, n| vim::delete_word_backward(s, true, n)),
            (Some(op), 'e') => self.finish_operator_with_count(op, |s, n| vim::delete_word_end_forward(s, false, n)),
            (Some(op), 'E') => self.finish_operator_with_count(op, |s, n| vim::delete_word_end_forward(s, true, n)),
            (Some(op), '0') => self.finish_operator(op, |s| vim::delete_to_line_start(s, false)),
            (Some(op), '^') => self.finish_operator(op, |s| vim::delete_to_line_start(s, true)),
            (Some('d'), 'd') => self.finish_operator_with_count('d', vim::delete_line),
            (Some('d'), 'G') => self.finish_operator('d', vim::delete_to_buffer_end),
            (Some('d'), 'g') => {
                self.vim_pending.awaiting_g = true;
            }
            (Some('c'), 'j') => self.finish_operator('c', |s| vim::change_line_pair(s, true)),
            (Some('c'), 'k') => self.finish_operator('c', |s| vim::change_line_pair(s, false)),
            _ => {
                self.vim_pending.reset();
            }
        }
        None
    }

    fn enter_insert(&mut self, f: fn(&mut BufferState)) {
        f(&mut self.state);
        self.vim_mode_state = VimMode::Insert;
        self.vim_pending.reset();
        self.ensure_cursor_visible();
    }

    fn apply_motion_or_operator(&mut self, m: Motion) {
        let count = self.vim_pending.take_count().unwrap_or(1);
        match self.vim_pending.operator.take() {
            Some('d') => self.delete_through_motion(m, count),
            Some('c') => {
                self.delete_through_motion(m, count);
                self.vim_mode_state = VimMode::Insert;
            }
            _ => vim::motion(&mut self.state, m, count),
        }
        self.vim_pending.reset();
        self.ensure_cursor_visible();
    }

    /// `count` only affects the word motions; the line/buffer-bound
    /// operators it's paired with here (`d0`/`d^`/`d$`/`dgg`/`dG`) have no
    /// count-repeatable form in vim.
    fn delete_through_motion(&mut self, m: Motion, count: usize) {
        match m {
            Motion::WordForward => vim::delete_word_forward(&mut self.state, false, count),
            Motion::BigWordForward => vim::delete_word_forward(&mut self.state, true, count),
            Motion::WordBackward => vim::delete_word_backward(&mut self.state, false, count),
            Motion::BigWordBackward => vim::delete_word_backward(&mut self.state, true, count),
            Motion::WordEndForward => vim::delete_word_end_forward(&mut self.state, false, count),
            Motion::BigWordEndForward => vim::delete_word_end_forward(&mut self.state, true, count),
            Motion::LineStart => vim::delete_to_line_start(&mut self.state, false),
            Motion::FirstNonBlank => vim::delete_to_line_start(&mut self.state, true),
            Motion::LineEnd => vim::delete_to_end_of_line(&mut self.state),
            Motion::BufferStart => vim::delete_to_buffer_start(&mut self.state),
            Motion::BufferEndOrLine(_) => vim::delete_to_buffer_end(&mut self.state),
        }
    }

    fn apply_motion_or_operator_move(&mut self, dir: MoveDir) {
        if self.vim_pending.operator.is_none() {
            self.state.move_cursor(dir);
            self.vim_pending.reset();
            self.ensure_cursor_visible();
        } else {
            // h/j/k/l are not composable with d/c in this layer; abandon
            // the pending operator rather than guess at linewise intent.
            self.vim_pending.reset();
        }
    }

    fn finish_operator(&mut self, op: char, f: fn(&mut BufferState)) {
        f(&mut self.state);
        if op == 'c' {
            self.vim_mode_state = VimMode::Insert;
        }
        self.vim_pending.reset();
        self.ensure_cursor_visible();
    }

    fn finish_operator_with_count(&mut self, op: char, f: fn(&mut BufferState, usize)) {
        let count = self.vim_pending.take_count().unwrap_or(1);
        f(&mut self.state, count);
        if op == 'c' {
            self.vim_mode_state = VimMode::Insert;
        }
        self.vim_pending.reset();
        self.ensure_cursor_visible();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(c: char) -> KeyEvent {
        KeyEvent::char(c)
    }

    #[test]
    fn emacs_mode_plain_typing() {
        let mut h = HostAdapter::new(BufferConfig::default());
        for c in "hi".chars() {
            h.handle_key(key(c));
        }
        assert_eq!(h.text(), "hi");
    }

    #[test]
    fn vim_mode_starts_in_insert_and_typing_works() {
        let mut h = HostAdapter::new(BufferConfig { vim_mode: true, ..BufferConfig::default() });
        for c in "hi".chars() {
            h.handle_key(key(c));
        }
        assert_eq!(h.text(), "hi");
    }

    #[test]
    fn vim_mode_dw_deletes_word() {
        let mut h = HostAdapter::new(BufferConfig { vim_mode: true, ..BufferConfig::default() });
        for c in "foo bar".chars() {
            h.handle_key(key(c));
        }
        h.handle_key(KeyEvent::plain(KeyCode::Esc));
        h.set_cursor(0, 0);
        h.handle_key(key('d'));
        h.handle_key(key('w'));
        assert_eq!(h.text(), "bar");
    }

    #[test]
    fn vim_mode_x_deletes_char() {
        let mut h = HostAdapter::new(BufferConfig { vim_mode: true, ..BufferConfig::default() });
        for c in "abc".chars() {
            h.handle_key(key(c));
        }
        h.handle_key(KeyEvent::plain(KeyCode::Esc));
        h.set_cursor(0, 0);
        h.handle_key(key('x'));
        assert_eq!(h.text(), "bc");
    }

    #[test]
    fn vim_mode_count_prefixed_x_deletes_n_chars() {
        let mut h = HostAdapter::new(BufferConfig { vim_mode: true, ..BufferConfig::default() });
        for c in "abcdef".chars() {
            h.handle_key(key(c));
        }
        h.handle_key(KeyEvent::plain(KeyCode::Esc));
        h.set_cursor(0, 0);
        h.handle_key(key('3'));
        h.handle_key(key('x'));
        assert_eq!(h.text(), "def");
    }

    #[test]
    fn vim_mode_count_prefixed_dw_deletes_n_words() {
        let mut h = HostAdapter::new(BufferConfig { vim_mode: true, ..BufferConfig::default() });
        for c in "one two three".chars() {
            h.handle_key(key(c));
        }
        h.handle_key(KeyEvent::plain(KeyCode::Esc));
        h.set_cursor(0, 0);
        h.handle_key(key('2'));
        h.handle_key(key('d'));
        h.handle_key(key('w'));
        assert_eq!(h.text(), "three");
    }

    #[test]
    fn rendered_visual_lines_respects_viewport_height() {
        let mut h = HostAdapter::new(BufferConfig::default());
        for _ in 0..5 {
            h.handle_key(KeyEvent::plain(KeyCode::Enter));
        }
        h.set_viewport(80, 3);
        assert!(h.rendered_visual_lines().len() <= 3);
    }
}
