//! Highlight context locator.
//!
//! Given the full text of a document and a user highlight, find the highlight and return a
//! bounded window of the surrounding *original* text. Never fails: degenerate input or a miss
//! yields the start of the document with `found = false`.

use crate::normalize::{fold, NormalizedText};
use serde::{Deserialize, Serialize};

/// Policy knobs for [`locate`]. All lengths are in chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Normalized highlights shorter than this are not searched.
    pub min_highlight_chars: usize,
    /// Over-long highlights are retried using only this many leading chars.
    pub probe_chars: usize,
    /// Prefix length for the direct (non-normalized) anchor search.
    pub anchor_prefix_chars: usize,
    /// Context taken before and after the match.
    pub radius_chars: usize,
    /// Hard ceiling on the returned window.
    pub max_window_chars: usize,
    /// Size of the start-of-document window used when nothing matches.
    pub fallback_chars: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            min_highlight_chars: 8,
            probe_chars: 140,
            anchor_prefix_chars: 24,
            radius_chars: 1_500,
            max_window_chars: 6_000,
            fallback_chars: 3_500,
        }
    }
}

impl LocatorConfig {
    /// Clamp into a consistent configuration.
    ///
    /// `min_highlight_chars >= 1`, `probe_chars >= min_highlight_chars`,
    /// `max_window_chars >= 1`, `fallback_chars <= max_window_chars`.
    pub fn sanitized(&self) -> Self {
        let min_highlight_chars = self.min_highlight_chars.max(1);
        let max_window_chars = self.max_window_chars.max(1);
        Self {
            min_highlight_chars,
            probe_chars: self.probe_chars.max(min_highlight_chars),
            anchor_prefix_chars: self.anchor_prefix_chars.max(1),
            radius_chars: self.radius_chars,
            max_window_chars,
            fallback_chars: self.fallback_chars.clamp(1, max_window_chars),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocateOutcome {
    /// The whole normalized highlight matched.
    Exact,
    /// Only the leading probe of an over-long highlight matched.
    ProbePrefix,
    /// Highlight too short to search; fallback window.
    HighlightTooShort,
    /// Nothing matched; fallback window.
    NoMatch,
}

impl LocateOutcome {
    pub fn found(&self) -> bool {
        matches!(self, LocateOutcome::Exact | LocateOutcome::ProbePrefix)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LocateOutcome::Exact => "exact",
            LocateOutcome::ProbePrefix => "probe_prefix",
            LocateOutcome::HighlightTooShort => "highlight_too_short",
            LocateOutcome::NoMatch => "no_match",
        }
    }
}

/// How a normalized match position was carried back into the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// Exact, via the normalization offset map.
    OffsetMap,
    /// Case-insensitive search for the raw highlight prefix in the original text.
    DirectPrefix,
    /// Normalized index scaled by original/normalized length. Approximate: the error is
    /// bounded by the amount of whitespace collapsed before the match.
    Proportional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    /// Contiguous slice of the original document.
    pub text: String,
    pub found: bool,
    pub outcome: LocateOutcome,
    pub anchor: Option<Anchor>,
    /// Char offset of the window in the original document.
    pub start_char: usize,
    /// Char offset (exclusive) of the window in the original document.
    pub end_char: usize,
    /// Char span of the match in the original document, when found.
    pub match_start_char: Option<usize>,
    pub match_end_char: Option<usize>,
}

/// Locate `highlight` in `document` and return a bounded context window.
pub fn locate(document: &str, highlight: &str, cfg: &LocatorConfig) -> ContextWindow {
    let cfg = cfg.sanitized();

    let hl = NormalizedText::new(highlight);
    if hl.char_len() < cfg.min_highlight_chars {
        return fallback_window(document, &cfg, LocateOutcome::HighlightTooShort);
    }

    let doc = NormalizedText::new(document);
    let (hit, outcome) = match doc.find(hl.folded()) {
        Some(b) => (Some((b, hl.folded().len())), LocateOutcome::Exact),
        None if hl.char_len() > cfg.probe_chars => {
            let (head, _) = truncate_chars(hl.as_str(), cfg.probe_chars);
            let probe = fold(head.trim_end());
            (
                doc.find(&probe).map(|b| (b, probe.len())),
                LocateOutcome::ProbePrefix,
            )
        }
        None => (None, LocateOutcome::NoMatch),
    };

    let Some((folded_byte, folded_len)) = hit else {
        return fallback_window(document, &cfg, LocateOutcome::NoMatch);
    };

    let (span, anchor) = anchor_in_original(document, &doc, folded_byte, folded_len, highlight, &cfg);
    window_around(document, span, anchor, outcome, &cfg)
}

/// Carry a folded match back into original byte offsets, trying the offset map, then a direct
/// prefix search, then a proportional estimate.
pub(crate) fn anchor_in_original(
    document: &str,
    doc: &NormalizedText,
    folded_byte: usize,
    folded_len: usize,
    highlight: &str,
    cfg: &LocatorConfig,
) -> ((usize, usize), Anchor) {
    if let Some(span) = doc.original_span(folded_byte, folded_len) {
        return (span, Anchor::OffsetMap);
    }

    let match_chars = doc
        .folded()
        .get(folded_byte..folded_byte.saturating_add(folded_len))
        .map(|s| s.chars().count())
        .unwrap_or_else(|| highlight.trim().chars().count())
        .max(1);

    let (prefix, _) = truncate_chars(highlight.trim(), cfg.anchor_prefix_chars);
    if let Some(start) = find_ignore_case(document, &prefix) {
        let end = advance_chars(document, start, match_chars);
        return ((start, end), Anchor::DirectPrefix);
    }

    let folded_index = doc
        .folded()
        .get(..folded_byte.min(doc.folded().len()))
        .map(|s| s.chars().count())
        .unwrap_or(0);
    let original_chars = document.chars().count();
    let est = (folded_index as u128 * original_chars as u128
        / doc.folded_char_len().max(1) as u128) as usize;
    let start = char_to_byte(document, est.min(original_chars));
    let end = advance_chars(document, start, match_chars);
    ((start, end), Anchor::Proportional)
}

fn window_around(
    document: &str,
    (match_start, match_end): (usize, usize),
    anchor: Anchor,
    outcome: LocateOutcome,
    cfg: &LocatorConfig,
) -> ContextWindow {
    let total = document.chars().count();
    let ms = byte_to_char_index(document, match_start);
    let me = byte_to_char_index(document, match_end).max(ms);
    let max = cfg.max_window_chars;

    let mut start = ms.saturating_sub(cfg.radius_chars);
    let mut end = me.saturating_add(cfg.radius_chars).min(total);
    if end - start > max {
        let match_len = me - ms;
        if match_len >= max {
            start = ms;
            end = (ms + max).min(total);
        } else {
            let center = ms + match_len / 2;
            start = center.saturating_sub(max / 2);
            end = start + max;
            if end > total {
                end = total;
                start = total.saturating_sub(max);
            }
        }
    }

    ContextWindow {
        text: slice_chars(document, start, end),
        found: outcome.found(),
        outcome,
        anchor: Some(anchor),
        start_char: start,
        end_char: end,
        match_start_char: Some(ms),
        match_end_char: Some(me),
    }
}

fn fallback_window(document: &str, cfg: &LocatorConfig, outcome: LocateOutcome) -> ContextWindow {
    let (text, _clipped) = truncate_chars(document, cfg.fallback_chars);
    let end_char = text.chars().count();
    ContextWindow {
        text,
        found: false,
        outcome,
        anchor: None,
        start_char: 0,
        end_char,
        match_start_char: None,
        match_end_char: None,
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> (String, bool) {
    let end = char_to_byte(s, max_chars);
    (s[..end].to_string(), end < s.len())
}

fn byte_to_char_index(s: &str, byte: usize) -> usize {
    s.get(..byte).map(|p| p.chars().count()).unwrap_or(0)
}

/// Byte offset of the `char_index`-th char, or `s.len()` past the end.
fn char_to_byte(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(b, _)| b)
        .unwrap_or(s.len())
}

fn advance_chars(s: &str, from_byte: usize, n: usize) -> usize {
    let rest = s.get(from_byte..).unwrap_or("");
    from_byte + char_to_byte(rest, n)
}

fn slice_chars(s: &str, start_char: usize, end_char: usize) -> String {
    if end_char <= start_char {
        return String::new();
    }
    let a = char_to_byte(s, start_char);
    let b = advance_chars(s, a, end_char - start_char);
    s[a..b].to_string()
}

/// Char-wise case-insensitive search. Returns a byte offset into `haystack`.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() {
        return None;
    }
    let eq = |a: char, b: char| a == b || a.to_lowercase().eq(b.to_lowercase());
    'outer: for (i, _) in haystack.char_indices() {
        let mut rest = haystack[i..].chars();
        for &n in &needle {
            match rest.next() {
                Some(h) if eq(h, n) => {}
                Some(_) => continue 'outer,
                None => return None,
            }
        }
        return Some(i);
    }
    None
}
