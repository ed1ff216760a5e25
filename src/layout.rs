//! Layout engine: maps logical lines through their transformations to a
//! word-wrapped sequence of visual lines, with the three bidirectional
//! index maps `spec.md` §3/§4.4 requires.
//!
//! Generalizes `textarea.rs`'s width-keyed `WrapCache` (built on
//! `textwrap::wrap`) to operate over the *transformed* line rather than the
//! raw logical line, and to track logical/transformed/visual index maps
//! instead of a flat list of byte ranges -- see `DESIGN.md` for why
//! `textwrap` itself is not reused here.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::transform::Transformation;
use crate::transform::TransformationType;
use crate::transform::compute_transformations;
use crate::unicode::char_width;
use crate::unicode::code_point_len;

/// One logical line's contribution to the layout: its transformations, its
/// transformed rendering, and the forward/backward index maps between
/// logical and transformed columns.
#[derive(Debug, Clone)]
struct LineLayout {
    transformations: Vec<Transformation>,
    transformed: String,
    transformed_chars: Vec<char>,
    /// transformed code-point index -> logical column.
    transformed_to_logical: Vec<usize>,
    /// logical column (0..=len) -> transformed code-point index.
    logical_to_transformed: Vec<usize>,
    /// (start, end) code-point ranges into `transformed_chars` for each
    /// wrapped visual line of this logical line.
    visual_ranges: Vec<(usize, usize)>,
}

fn build_line_layout(line: &str, cursor_col_if_cursor_line: Option<usize>, width: usize) -> LineLayout {
    let transformations = compute_transformations(line);
    let logical_chars: Vec<char> = line.chars().collect();
    let logical_len = logical_chars.len();

    let mut transformed_chars: Vec<char> = Vec::with_capacity(logical_len);
    let mut transformed_to_logical: Vec<usize> = Vec::with_capacity(logical_len);
    let mut logical_to_transformed: Vec<usize> = vec![0; logical_len + 1];

    let mut logical_pos = 0usize;
    let mut span_idx = 0usize;
    while logical_pos < logical_len {
        if span_idx < transformations.len() && transformations[span_idx].log_start == logical_pos {
            let span = &transformations[span_idx];
            let expand = span.kind == TransformationType::Image
                && cursor_col_if_cursor_line
                    .is_some_and(|c| c >= span.log_start && c <= span.log_end);
            let rendered: &str = if expand { &span.logical_text } else { &span.collapsed_text };
            let rendered_chars: Vec<char> = rendered.chars().collect();
            let transformed_start = transformed_chars.len();
            for p in span.log_start..span.log_end {
                logical_to_transformed[p] = transformed_start;
            }
            if expand {
                for (offset, ch) in rendered_chars.into_iter().enumerate() {
                    transformed_chars.push(ch);
                    transformed_to_logical.push(span.log_start + offset);
                }
            } else {
                let rc_len = rendered_chars.len();
                for (i, ch) in rendered_chars.into_iter().enumerate() {
                    transformed_chars.push(ch);
                    let mapped = if i + 1 == rc_len { span.log_end } else { span.log_start };
                    transformed_to_logical.push(mapped);
                }
            }
            logical_pos = span.log_end;
            span_idx += 1;
            continue;
        }
        logical_to_transformed[logical_pos] = transformed_chars.len();
        transformed_chars.push(logical_chars[logical_pos]);
        transformed_to_logical.push(logical_pos);
        logical_pos += 1;
    }
    logical_to_transformed[logical_len] = transformed_chars.len();

    let visual_ranges = wrap_chars(&transformed_chars, width);
    let transformed: String = transformed_chars.iter().collect();

    LineLayout {
        transformations,
        transformed,
        transformed_chars,
        transformed_to_logical,
        logical_to_transformed,
        visual_ranges,
    }
}

/// Word-aware wrap over code points using display width. Prefers breaking
/// at the last space within the accumulated segment; otherwise hard-breaks
/// at the code point that would overflow (a single overly-wide code point
/// is taken on its own line). A break that lands on a space consumes it.
fn wrap_chars(chars: &[char], width: usize) -> Vec<(usize, usize)> {
    let n = chars.len();
    if n == 0 {
        return vec![(0, 0)];
    }
    let width = width.max(1);
    let mut ranges = Vec::new();
    let mut line_start = 0usize;
    let mut cur_width = 0usize;
    let mut last_space: Option<usize> = None;
    let mut i = 0usize;
    while i < n {
        let w = char_width(chars[i]);
        if cur_width + w > width && i > line_start {
            if let Some(sp) = last_space {
                ranges.push((line_start, sp));
                line_start = sp + 1;
            } else {
                ranges.push((line_start, i));
                line_start = i;
            }
            cur_width = 0;
            last_space = None;
            continue;
        }
        if chars[i] == ' ' {
            last_space = Some(i);
        }
        cur_width += w;
        i += 1;
    }
    ranges.push((line_start, n));
    ranges
}

/// The full derived visual layout for a `(lines, viewportWidth, cursor)`
/// triple (spec.md §3 "Visual layout (derived, cached)").
#[derive(Debug, Clone)]
pub struct Layout {
    pub transformations_by_line: Vec<Vec<Transformation>>,
    pub transformed_lines: Vec<String>,
    pub transformed_to_logical_map: Vec<Vec<usize>>,
    pub visual_lines: Vec<String>,
    /// (logical_row, start_col_in_logical) per visual row.
    pub visual_to_logical_map: Vec<(usize, usize)>,
    /// start offset within the owning row's transformed line, per visual row.
    pub visual_to_transformed_map: Vec<usize>,
    /// per logical row: sorted (visual_row, start_col_in_logical).
    pub logical_to_visual_map: Vec<Vec<(usize, usize)>>,
    logical_to_transformed_map: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualCursor {
    pub row: usize,
    pub col: usize,
}

/// Memo key for a single logical line's layout: only recomputed when the
/// line's content, the viewport width, or (for the cursor's own line) the
/// cursor column itself changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LineMemoKey {
    width: usize,
    cursor_col: Option<usize>,
    content: String,
}

thread_local! {
    static LINE_LAYOUT_CACHE: RefCell<HashMap<LineMemoKey, std::rc::Rc<LineLayoutCached>>> =
        RefCell::new(HashMap::new());
}

#[derive(Debug, Clone)]
struct LineLayoutCached {
    transformations: Vec<Transformation>,
    transformed: String,
    transformed_to_logical: Vec<usize>,
    logical_to_transformed: Vec<usize>,
    visual_ranges: Vec<(usize, usize)>,
    transformed_chars: Vec<char>,
}

fn line_layout_memoized(line: &str, cursor_col_if_cursor_line: Option<usize>, width: usize) -> std::rc::Rc<LineLayoutCached> {
    let key = LineMemoKey { width, cursor_col: cursor_col_if_cursor_line, content: line.to_string() };
    LINE_LAYOUT_CACHE.with(|cache| {
        if let Some(hit) = cache.borrow().get(&key) {
            return hit.clone();
        }
        let built = build_line_layout(line, cursor_col_if_cursor_line, width);
        let cached = std::rc::Rc::new(LineLayoutCached {
            transformations: built.transformations,
            transformed: built.transformed,
            transformed_to_logical: built.transformed_to_logical,
            logical_to_transformed: built.logical_to_transformed,
            visual_ranges: built.visual_ranges,
            transformed_chars: built.transformed_chars,
        });
        cache.borrow_mut().insert(key, cached.clone());
        cached
    })
}

/// Compute the full layout for `lines` at `width`, with `cursor` deciding
/// which (if any) image transformation renders expanded.
pub fn compute_layout(lines: &[String], width: usize, cursor: (usize, usize)) -> Layout {
    let mut transformations_by_line = Vec::with_capacity(lines.len());
    let mut transformed_lines = Vec::with_capacity(lines.len());
    let mut transformed_to_logical_map = Vec::with_capacity(lines.len());
    let mut logical_to_transformed_map = Vec::with_capacity(lines.len());
    let mut visual_lines = Vec::new();
    let mut visual_to_logical_map = Vec::new();
    let mut visual_to_transformed_map = Vec::new();
    let mut logical_to_visual_map = Vec::with_capacity(lines.len());

    for (row, line) in lines.iter().enumerate() {
        let cursor_col = if cursor.0 == row { Some(cursor.1) } else { None };
        let built = line_layout_memoized(line, cursor_col, width);
        transformations_by_line.push(built.transformations.clone());
        transformed_lines.push(built.transformed.clone());
        transformed_to_logical_map.push(built.transformed_to_logical.clone());
        logical_to_transformed_map.push(built.logical_to_transformed.clone());

        let mut row_entries = Vec::with_capacity(built.visual_ranges.len());
        for &(start, end) in &built.visual_ranges {
            let v = visual_lines.len();
            let text: String = built.transformed_chars[start..end].iter().collect();
            visual_lines.push(text);
            let logical_start = built.transformed_to_logical.get(start).copied().unwrap_or(0);
            visual_to_logical_map.push((row, logical_start));
            visual_to_transformed_map.push(start);
            row_entries.push((v, logical_start));
        }
        logical_to_visual_map.push(row_entries);
    }

    Layout {
        transformations_by_line,
        transformed_lines,
        transformed_to_logical_map,
        visual_lines,
        visual_to_logical_map,
        visual_to_transformed_map,
        logical_to_visual_map,
        logical_to_transformed_map,
    }
}

impl Layout {
    /// Locate the segment in `logicalToVisualMap[row]` whose logical start
    /// is the greatest `<=` cursor column; translate the cursor's logical
    /// column to a transformed column, subtract the segment's transformed
    /// start, and clamp to the segment's visual length (spec.md §4.4).
    pub fn visual_cursor(&self, row: usize, col: usize) -> VisualCursor {
        let Some(entries) = self.logical_to_visual_map.get(row) else {
            return VisualCursor { row: 0, col: 0 };
        };
        if entries.is_empty() {
            return VisualCursor { row: 0, col: 0 };
        }
        let mut chosen = entries[0];
        for &(v, start) in entries {
            if start <= col {
                chosen = (v, start);
            } else {
                break;
            }
        }
        let (visual_row, _) = chosen;
        let transformed_col = self
            .logical_to_transformed_map
            .get(row)
            .and_then(|m| m.get(col))
            .copied()
            .unwrap_or(0);
        let seg_start = self.visual_to_transformed_map.get(visual_row).copied().unwrap_or(0);
        let seg_len = code_point_len(self.visual_lines.get(visual_row).map(String::as_str).unwrap_or(""));
        let local = transformed_col.saturating_sub(seg_start).min(seg_len);
        VisualCursor { row: visual_row, col: local }
    }

    /// Inverse of `visual_cursor`: maps a visual position back to a
    /// logical `(row, col)`, or `None` if out of range.
    pub fn logical_position_from_visual(&self, visual_row: usize, visual_col: usize) -> Option<(usize, usize)> {
        let (row, logical_start) = *self.visual_to_logical_map.get(visual_row)?;
        let transformed_start = *self.visual_to_transformed_map.get(visual_row)?;
        let transformed_col = transformed_start + visual_col;
        let logical_col = self
            .transformed_to_logical_map
            .get(row)
            .and_then(|m| m.get(transformed_col).copied())
            .unwrap_or_else(|| {
                let len = self.transformed_to_logical_map.get(row).map(Vec::len).unwrap_or(0);
                self.transformed_to_logical_map
                    .get(row)
                    .and_then(|m| m.get(len.saturating_sub(1)))
                    .copied()
                    .unwrap_or(logical_start)
            });
        Some((row, logical_col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_buffer_is_one_visual_line() {
        let layout = compute_layout(&["".to_string()], 80, (0, 0));
        assert_eq!(layout.visual_lines.len(), 1);
        assert_eq!(layout.visual_lines[0], "");
        assert_eq!(layout.visual_to_logical_map[0], (0, 0));
    }

    #[test]
    fn image_collapses_when_cursor_elsewhere() {
        let lines = vec!["See @images/cat.png now".to_string()];
        let layout = compute_layout(&lines, 80, (0, 0));
        assert_eq!(layout.transformed_lines[0], "See [Image cat.png] now");
    }

    #[test]
    fn image_expands_when_cursor_inside() {
        let lines = vec!["See @images/cat.png now".to_string()];
        let layout = compute_layout(&lines, 80, (0, 6));
        assert_eq!(layout.transformed_lines[0], "See @images/cat.png now");
    }

    #[test]
    fn wrap_consumes_breaking_space() {
        let lines = vec!["xx @path/img.png yy".to_string()];
        let layout = compute_layout(&lines, 20, (0, 0));
        assert_eq!(layout.visual_lines, vec!["xx [Image img.png]".to_string(), "yy".to_string()]);
    }

    #[test]
    fn visual_cursor_round_trips() {
        let lines = vec!["hello world".to_string()];
        let layout = compute_layout(&lines, 80, (0, 5));
        let vc = layout.visual_cursor(0, 5);
        assert_eq!(vc, VisualCursor { row: 0, col: 5 });
        let back = layout.logical_position_from_visual(0, 5).unwrap();
        assert_eq!(back, (0, 5));
    }
}
