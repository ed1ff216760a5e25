//! Transformation engine: recognises image-path and paste-placeholder
//! patterns inside a logical line and produces a sorted, non-overlapping
//! list of spans whose rendered form differs from their logical form.
//!
//! Grounded on `chat_composer.rs`'s paste/image integration
//! (`handle_paste_image_path`, `next_large_paste_placeholder`); the
//! placeholder grammar here is the bit-exact one from `spec.md` §6 rather
//! than the teacher's own `[Pasted Content N chars]` wording.

use std::cell::RefCell;
use std::num::NonZeroUsize;

use lru::LruCache;
use regex_lite::Regex;

use crate::unicode::code_point_len;
use crate::unicode::code_point_slice;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationType {
    Image,
    Paste,
}

/// A contiguous logical span whose rendered form differs from its logical
/// form. Column bounds are code-point indices, `logEnd` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformation {
    pub log_start: usize,
    pub log_end: usize,
    pub logical_text: String,
    pub collapsed_text: String,
    pub kind: TransformationType,
    /// Placeholder identifier, set only for `Paste` transformations.
    pub id: Option<String>,
}

fn placeholder_regex() -> &'static Regex {
    static RE: once_cell::sync::OnceCell<Regex> = once_cell::sync::OnceCell::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"\[Pasted Text: \d+ (lines|chars)(?: #\d+)?\]").unwrap()
    })
}

/// Find paste-placeholder spans in `line`. Placeholder grammar:
/// `\[Pasted Text: \d+ (lines|chars)( #\d+)?\]` (spec.md §6).
fn find_paste_spans(line: &str) -> Vec<Transformation> {
    let chars: Vec<char> = line.chars().collect();
    let byte_to_cp: Vec<usize> = {
        let mut v = Vec::with_capacity(line.len() + 1);
        let mut cp = 0usize;
        for (b, _) in line.char_indices() {
            while v.len() <= b {
                v.push(cp);
            }
            cp += 1;
        }
        v.push(chars.len());
        v
    };
    let mut out = Vec::new();
    for m in placeholder_regex().find_iter(line) {
        let start_cp = byte_to_cp.get(m.start()).copied().unwrap_or(0);
        let end_cp = byte_to_cp.get(m.end()).copied().unwrap_or(chars.len());
        let text = m.as_str().to_string();
        out.push(Transformation {
            log_start: start_cp,
            log_end: end_cp,
            logical_text: text.clone(),
            collapsed_text: text.clone(),
            kind: TransformationType::Paste,
            id: Some(text),
        });
    }
    out
}

/// Find image-path spans: `@` followed by a path whose last segment has an
/// image extension, with `\ ` escaping a literal space.
fn find_image_spans(line: &str) -> Vec<Transformation> {
    let chars: Vec<char> = line.chars().collect();
    let n = chars.len();
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < n {
        if chars[i] == '@' {
            let path_start = i + 1;
            let mut j = path_start;
            while j < n {
                if chars[j] == '\\' && j + 1 < n && chars[j + 1] == ' ' {
                    j += 2;
                    continue;
                }
                if chars[j].is_whitespace() {
                    break;
                }
                j += 1;
            }
            let path_end = j;
            if path_end > path_start {
                let path: String = chars[path_start..path_end].iter().collect();
                if let Some(ext) = image_extension(&path) {
                    tracing::trace!(%path, %ext, "recognised image path transformation");
                    let logical_text: String = chars[i..path_end].iter().collect();
                    let collapsed_text = collapsed_image_form(&path, &ext);
                    out.push(Transformation {
                        log_start: i,
                        log_end: path_end,
                        logical_text,
                        collapsed_text,
                        kind: TransformationType::Image,
                        id: None,
                    });
                    i = path_end;
                    continue;
                }
            }
        }
        i += 1;
    }
    out
}

fn unescape_path(path: &str) -> String {
    path.replace("\\ ", " ")
}

fn image_extension(path: &str) -> Option<String> {
    let unescaped = unescape_path(path);
    let last_segment = unescaped.rsplit('/').next().unwrap_or(&unescaped);
    let dot = last_segment.rfind('.')?;
    let ext = &last_segment[dot + 1..];
    if ext.is_empty() {
        return None;
    }
    let lower = ext.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&lower.as_str()) { Some(lower) } else { None }
}

/// `[Image <truncated-base><ext>]`: base name right-truncated to at most
/// 10 trailing characters, prefixed with `"..."` if longer.
fn collapsed_image_form(path: &str, ext: &str) -> String {
    let unescaped = unescape_path(path);
    let last_segment = unescaped.rsplit('/').next().unwrap_or(&unescaped);
    let dot = last_segment.rfind('.').unwrap_or(last_segment.len());
    let base = &last_segment[..dot];
    let base_cp = code_point_len(base);
    let truncated = if base_cp > 10 {
        format!("...{}", code_point_slice(base, base_cp - 10, base_cp))
    } else {
        base.to_string()
    };
    format!("[Image {truncated}.{ext}]")
}

/// Combine image and paste passes, sort by `logStart`, and drop later
/// overlapping spans (first match, by start position, wins).
pub fn compute_transformations_uncached(line: &str) -> Vec<Transformation> {
    let mut spans = find_image_spans(line);
    spans.extend(find_paste_spans(line));
    spans.sort_by_key(|s| s.log_start);
    let mut out: Vec<Transformation> = Vec::with_capacity(spans.len());
    for span in spans {
        if let Some(last) = out.last() {
            if span.log_start < last.log_end {
                continue;
            }
        }
        out.push(span);
    }
    debug_assert!(out.windows(2).all(|w| w[0].log_end <= w[1].log_start));
    out
}

const TRANSFORM_CACHE_CAP: usize = 256;

thread_local! {
    static TRANSFORM_CACHE: RefCell<LruCache<String, Vec<Transformation>>> = RefCell::new(
        LruCache::new(NonZeroUsize::new(TRANSFORM_CACHE_CAP).unwrap_or(NonZeroUsize::MIN))
    );
}

/// Memoized per-line transformation computation.
pub fn compute_transformations(line: &str) -> Vec<Transformation> {
    TRANSFORM_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some(hit) = cache.get(line) {
            return hit.clone();
        }
        let computed = compute_transformations_uncached(line);
        cache.put(line.to_string(), computed.clone());
        computed
    })
}

/// The span containing `col` on a line's transformation list. `include_edge`
/// controls whether `col == log_end` counts as inside.
pub fn transform_under_cursor(
    col: usize,
    spans: &[Transformation],
    include_edge: bool,
) -> Option<&Transformation> {
    spans.iter().find(|s| {
        col >= s.log_start && (if include_edge { col <= s.log_end } else { col < s.log_end })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn image_path_collapses() {
        let spans = compute_transformations_uncached("See @images/cat.png now");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, TransformationType::Image);
        assert_eq!(spans[0].collapsed_text, "[Image cat.png]");
        assert_eq!(spans[0].log_start, 4);
    }

    #[test]
    fn image_base_name_truncated() {
        let spans = compute_transformations_uncached("@path/areallylongfilename.png");
        assert_eq!(spans[0].collapsed_text, "[Image ...ngfilename.png]");
    }

    #[test]
    fn escaped_space_kept_in_path() {
        let spans = compute_transformations_uncached(r"@my\ pic.png end");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].logical_text, r"@my\ pic.png");
        assert_eq!(spans[0].collapsed_text, "[Image my pic.png]");
    }

    #[test]
    fn non_image_at_path_is_not_a_transformation() {
        let spans = compute_transformations_uncached("@handle mentions someone");
        assert!(spans.is_empty());
    }

    #[test]
    fn paste_placeholder_detected() {
        let spans = compute_transformations_uncached("before [Pasted Text: 6 lines] after");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, TransformationType::Paste);
        assert_eq!(spans[0].id.as_deref(), Some("[Pasted Text: 6 lines]"));
    }

    #[test]
    fn paste_placeholder_with_disambiguator() {
        let spans = compute_transformations_uncached("[Pasted Text: 10 chars #2]");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].id.as_deref(), Some("[Pasted Text: 10 chars #2]"));
    }

    #[test]
    fn overlapping_spans_first_wins() {
        // Degenerate but exercises the sort+drop logic.
        let line = "@a.png";
        let spans = compute_transformations_uncached(line);
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn transform_under_cursor_finds_containing_span() {
        let spans = compute_transformations_uncached("See @images/cat.png now");
        let hit = transform_under_cursor(6, &spans, false);
        assert!(hit.is_some());
        let miss = transform_under_cursor(0, &spans, false);
        assert!(miss.is_none());
    }
}
