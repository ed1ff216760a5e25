//! Vim-style operator/motion layer (spec.md §4.5.3).
//!
//! Every operator here is expressed through [`BufferState::replace_range`]
//! and the word engine rather than touching `lines` directly, the same way
//! `textarea.rs`'s own motion helpers (`beginning_of_previous_word`,
//! `end_of_next_word`) sit on top of `replace_range_raw` instead of
//! duplicating its cursor-shift arithmetic. Table-driven key-to-command
//! dispatch (as in `rust-vim-common`'s `commands/movement.rs`) lives one
//! layer up, in `key.rs`/`host.rs`; this module only knows motions and
//! operators, not key codes.

use crate::state::BufferState;
use crate::state::InsertOptions;
use crate::state::MoveDir;
use crate::unicode::code_point_len;
use crate::unicode::is_whitespace;
use crate::word;

/// A cursor motion, independent of any operator applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    WordForward,
    BigWordForward,
    WordBackward,
    BigWordBackward,
    WordEndForward,
    BigWordEndForward,
    LineStart,
    FirstNonBlank,
    LineEnd,
    BufferStart,
    /// `G` with no count goes to the last line; `[N]G` goes to line `N` (1-based).
    BufferEndOrLine(Option<usize>),
}

fn first_non_blank_col(line: &str) -> usize {
    line.chars().position(|c| !is_whitespace(c)).unwrap_or(0)
}

/// Where a pure motion lands, as a logical `(row, col)`.
fn resolve_motion(state: &BufferState, motion: Motion) -> (usize, usize) {
    let (row, col) = state.cursor();
    match motion {
        Motion::WordForward => word::next_word_start_across(&state.lines, row, col, false)
            .map(|p| (p.row, p.col))
            .unwrap_or_else(|| end_of_buffer(state)),
        Motion::BigWordForward => word::next_word_start_across(&state.lines, row, col, true)
            .map(|p| (p.row, p.col))
            .unwrap_or_else(|| end_of_buffer(state)),
        Motion::WordBackward => {
            let p = word::prev_word_start_across(&state.lines, row, col, false);
            (p.row, p.col)
        }
        Motion::BigWordBackward => {
            let p = word::prev_word_start_across(&state.lines, row, col, true);
            (p.row, p.col)
        }
        Motion::WordEndForward => word::next_word_end_across(&state.lines, row, col, false)
            .map(|p| (p.row, p.col))
            .unwrap_or_else(|| end_of_buffer(state)),
        Motion::BigWordEndForward => word::next_word_end_across(&state.lines, row, col, true)
            .map(|p| (p.row, p.col))
            .unwrap_or_else(|| end_of_buffer(state)),
        Motion::LineStart => (row, 0),
        Motion::FirstNonBlank => (row, first_non_blank_col(&state.lines[row])),
        Motion::LineEnd => (row, code_point_len(&state.lines[row]).saturating_sub(1)),
        Motion::BufferStart => (0, 0),
        Motion::BufferEndOrLine(n) => {
            let target = match n {
                Some(line) => line.saturating_sub(1).min(state.lines.len() - 1),
                None => state.lines.len() - 1,
            };
            (target, 0)
        }
    }
}

fn end_of_buffer(state: &BufferState) -> (usize, usize) {
    let last = state.lines.len() - 1;
    (last, code_point_len(&state.lines[last]))
}

/// Move the cursor along a pure motion (no operator attached): `w b e W B E
/// 0 ^ $ gg G [N]G`. Repeated `count` times for motions where repetition is
/// meaningful (word motions); idempotent motions (line/buffer bounds) simply
/// land on the same place regardless of `count`.
pub fn motion(state: &mut BufferState, m: Motion, count: usize) {
    for _ in 0..count.max(1) {
        let (row, col) = resolve_motion(state, m);
        state.set_cursor(row, col, None);
    }
}

pub fn move_left(state: &mut BufferState) {
    state.move_cursor(MoveDir::Left);
}

pub fn move_right(state: &mut BufferState) {
    state.move_cursor(MoveDir::Right);
}

pub fn move_up(state: &mut BufferState) {
    state.move_cursor(MoveDir::Up);
}

pub fn move_down(state: &mut BufferState) {
    state.move_cursor(MoveDir::Down);
}

/// `x`: delete `count` code points under and after the cursor, without
/// joining lines at end-of-line (a no-op on an empty line).
pub fn delete_char(state: &mut BufferState, count: usize) {
    let (row, col) = state.cursor();
    let line_len = code_point_len(&state.lines[row]);
    let end = (col + count.max(1)).min(line_len);
    if col < end {
        state.replace_range(row, col, row, end, "");
    }
}

/// Delete from the cursor through `count` forward word motions (`dw`/`dW`),
/// exclusive of the final motion's landing column. Uses the cursor itself as
/// scratch space to walk the motion without mutating the buffer between
/// steps; it is restored before the single resulting `replace_range`.
pub fn delete_word_forward(state: &mut BufferState, big: bool, count: usize) {
    let (row, col) = state.cursor();
    let kind = if big { Motion::BigWordForward } else { Motion::WordForward };
    let mut target = (row, col);
    for _ in 0..count.max(1) {
        state.set_cursor(target.0, target.1, None);
        let next = resolve_motion(state, kind);
        if next.0 != row {
            // Motion left the line: delete to end of line only, matching
            // vim's `dw` at the last word of a line (it does not eat the
            // newline), and stop repeating.
            target = (row, code_point_len(&state.lines[row]));
            break;
        }
        target = next;
    }
    state.set_cursor(row, col, None);
    state.replace_range(row, col, target.0, target.1, "");
}

/// `db`/`dB`: delete from `count` backward word motions up to (exclusive of)
/// the cursor.
pub fn delete_word_backward(state: &mut BufferState, big: bool, count: usize) {
    let (row, col) = state.cursor();
    let kind = if big { Motion::BigWordBackward } else { Motion::WordBackward };
    let mut target = (row, col);
    for _ in 0..count.max(1) {
        state.set_cursor(target.0, target.1, None);
        target = resolve_motion(state, kind);
    }
    state.set_cursor(row, col, None);
    state.replace_range(target.0, target.1, row, col, "");
}

/// `de`/`dE`: delete from the cursor through `count` word-end motions,
/// inclusive of the final one.
pub fn delete_word_end_forward(state: &mut BufferState, big: bool, count: usize) {
    let (row, col) = state.cursor();
    let kind = if big { Motion::BigWordEndForward } else { Motion::WordEndForward };
    let mut target = (row, col);
    let mut left_line = false;
    for _ in 0..count.max(1) {
        state.set_cursor(target.0, target.1, None);
        let next = resolve_motion(state, kind);
        if next.0 != row {
            left_line = true;
            break;
        }
        target = next;
    }
    state.set_cursor(row, col, None);
    if left_line {
        let line_len = code_point_len(&state.lines[row]);
        state.replace_range(row, col, row, line_len, "");
    } else {
        state.replace_range(row, col, row, target.1 + 1, "");
    }
}

/// `d0`/`d^`: delete from line start (or first non-blank) up to the cursor.
pub fn delete_to_line_start(state: &mut BufferState, first_non_blank: bool) {
    let (row, col) = state.cursor();
    let start = if first_non_blank { first_non_blank_col(&state.lines[row]) } else { 0 };
    if start < col {
        state.replace_range(row, start, row, col, "");
    }
}

/// `dd`/`[N]dd`: delete `count` whole logical lines starting at the cursor
/// (linewise). The cursor lands on the first non-blank column of the
/// resulting line.
pub fn delete_line(state: &mut BufferState, count: usize) {
    let (row, _) = state.cursor();
    let last = state.lines.len() - 1;
    let end_row = (row + count.max(1) - 1).min(last);
    let new_row = if state.lines.len() == 1 || (row == 0 && end_row == last) {
        let len = code_point_len(&state.lines[end_row]);
        state.replace_range(0, 0, end_row, len, "");
        0
    } else if end_row == last {
        let prev_len = code_point_len(&state.lines[row - 1]);
        state.replace_range(row - 1, prev_len, end_row, code_point_len(&state.lines[end_row]), "");
        row - 1
    } else {
        state.replace_range(row, 0, end_row + 1, 0, "");
        row
    };
    let col = first_non_blank_col(&state.lines[new_row]);
    state.set_cursor(new_row, col, None);
}

/// `dgg`: delete from the buffer start through the end of the current line.
pub fn delete_to_buffer_start(state: &mut BufferState) {
    let (row, _) = state.cursor();
    let len = code_point_len(&state.lines[row]);
    state.replace_range(0, 0, row, len, "");
}

/// `dG`: delete from the current line through the end of the buffer.
pub fn delete_to_buffer_end(state: &mut BufferState) {
    let (row, _) = state.cursor();
    let last = state.lines.len() - 1;
    let last_len = code_point_len(&state.lines[last]);
    if row == 0 {
        state.replace_range(0, 0, last, last_len, "");
    } else {
        let prev_len = code_point_len(&state.lines[row - 1]);
        state.replace_range(row - 1, prev_len, last, last_len, "");
    }
}

/// `D`: delete from the cursor to end of line (cursor stays put).
pub fn delete_to_end_of_line(state: &mut BufferState) {
    state.kill_line_right();
}

/// `cj`/`ck`: change the current line and the one below/above it
/// (linewise), leaving a single empty line for insertion.
pub fn change_line_pair(state: &mut BufferState, downward: bool) {
    let (row, _) = state.cursor();
    let (first, last) = if downward {
        (row, (row + 1).min(state.lines.len() - 1))
    } else {
        (row.saturating_sub(1), row)
    };
    let last_len = code_point_len(&state.lines[last]);
    state.replace_range(first, 0, last, last_len, "");
    state.insert("\n", false, &InsertOptions::default());
    state.set_cursor(first, 0, None);
}

/// `i`: no-op cursor placement (insert happens to the left of the cursor,
/// which is already where it is).
pub fn enter_insert_before(_state: &mut BufferState) {}

/// `a`: move one column right (clamped to the line), then insert.
pub fn enter_insert_after(state: &mut BufferState) {
    let (row, col) = state.cursor();
    let line_len = code_point_len(&state.lines[row]);
    state.set_cursor(row, (col + 1).min(line_len), None);
}

/// `I`: move to the first non-blank column of the line.
pub fn enter_insert_at_line_start(state: &mut BufferState) {
    let (row, _) = state.cursor();
    let col = first_non_blank_col(&state.lines[row]);
    state.set_cursor(row, col, None);
}

/// `A`: move to the end of the line.
pub fn enter_insert_at_line_end(state: &mut BufferState) {
    let (row, _) = state.cursor();
    let len = code_point_len(&state.lines[row]);
    state.set_cursor(row, len, None);
}

/// `o`: open a new empty line below the current one, cursor on it.
pub fn open_line_below(state: &mut BufferState) {
    let (row, _) = state.cursor();
    let len = code_point_len(&state.lines[row]);
    state.set_cursor(row, len, None);
    state.insert("\n", false, &InsertOptions::default());
}

/// `O`: open a new empty line above the current one, cursor on it.
pub fn open_line_above(state: &mut BufferState) {
    let (row, _) = state.cursor();
    state.set_cursor(row, 0, None);
    state.insert("\n", false, &InsertOptions::default());
    state.set_cursor(row, 0, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CursorPosition;
    use pretty_assertions::assert_eq;

    fn state_with(text: &str) -> BufferState {
        let mut s = BufferState::new();
        s.set_viewport_width(80);
        s.set_text(text, CursorPosition::Start, true);
        s
    }

    #[test]
    fn dw_deletes_through_next_word_start() {
        let mut s = state_with("foo bar baz");
        delete_word_forward(&mut s, false, 1);
        assert_eq!(s.text(), "bar baz");
    }

    #[test]
    fn two_dw_deletes_through_second_next_word_start() {
        let mut s = state_with("foo bar baz");
        delete_word_forward(&mut s, false, 2);
        assert_eq!(s.text(), "baz");
    }

    #[test]
    fn cw_equivalent_de_deletes_inclusive_of_word_end() {
        let mut s = state_with("foo bar");
        delete_word_end_forward(&mut s, false, 1);
        assert_eq!(s.text(), " bar");
    }

    #[test]
    fn dd_removes_whole_line_and_joins() {
        let mut s = state_with("one\ntwo\nthree");
        s.set_cursor(1, 1, None);
        delete_line(&mut s, 1);
        assert_eq!(s.text(), "one\nthree");
        assert_eq!(s.cursor(), (1, 0));
    }

    #[test]
    fn dd_on_last_line_of_multiline_buffer_lands_on_first_non_blank() {
        let mut s = state_with("alpha\nbeta");
        s.set_cursor(1, 2, None);
        delete_line(&mut s, 1);
        assert_eq!(s.text(), "alpha");
        assert_eq!(s.cursor(), (0, 0));
    }

    #[test]
    fn three_dd_removes_three_lines() {
        let mut s = state_with("one\ntwo\nthree\nfour");
        delete_line(&mut s, 3);
        assert_eq!(s.text(), "four");
        assert_eq!(s.cursor(), (0, 0));
    }

    #[test]
    fn dd_on_single_line_buffer_leaves_it_empty() {
        let mut s = state_with("solo");
        delete_line(&mut s, 1);
        assert_eq!(s.text(), "");
    }

    #[test]
    fn d_dollar_equivalent_via_capital_d() {
        let mut s = state_with("hello world");
        s.set_cursor(0, 5, None);
        delete_to_end_of_line(&mut s);
        assert_eq!(s.text(), "hello");
    }

    #[test]
    fn x_deletes_one_char_without_joining_at_eol() {
        let mut s = state_with("ab\ncd");
        s.set_cursor(0, 2, None);
        delete_char(&mut s, 1);
        assert_eq!(s.text(), "ab\ncd");
    }

    #[test]
    fn three_x_deletes_three_code_points() {
        let mut s = state_with("abcdef");
        delete_char(&mut s, 3);
        assert_eq!(s.text(), "def");
    }

    #[test]
    fn o_opens_blank_line_below_for_insertion() {
        let mut s = state_with("one\ntwo");
        motion(&mut s, Motion::BufferStart, 1);
        open_line_below(&mut s);
        assert_eq!(s.lines, vec!["one", "", "two"]);
        assert_eq!(s.cursor(), (1, 0));
    }

    #[test]
    fn capital_g_goes_to_last_line() {
        let mut s = state_with("a\nb\nc");
        motion(&mut s, Motion::BufferEndOrLine(None), 1);
        assert_eq!(s.cursor(), (2, 0));
    }
}
