//! Matching-oriented text normalization.
//!
//! - whitespace runs (including newlines) collapse to one space, ends are trimmed
//! - curly double/single quotes become straight quotes
//! - case is preserved in [`normalize`]; [`NormalizedText`] additionally keeps a
//!   lowercase view for comparisons
//!
//! The output is used only for matching, never shown to users.

/// Map typographic quotes to their ASCII equivalents.
fn unify_quote(ch: char) -> char {
    match ch {
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{00AB}'
        | '\u{00BB}' => '"',
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => '\'',
        _ => ch,
    }
}

/// Normalize a string for matching. Pure and idempotent.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(unify_quote(ch));
    }
    out
}

/// Per-char lowercase. Used on both sides of every comparison so that case folding is
/// consistent even where `str::to_lowercase` would apply context rules.
pub fn fold(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// A normalized view of some original text, with a map back to original byte offsets.
#[derive(Debug, Clone)]
pub struct NormalizedText {
    text: String,
    folded: String,
    /// Byte offset into `folded` of each folded char.
    folded_starts: Vec<usize>,
    /// Original byte span `[start, end)` that produced each folded char.
    /// A collapsed space spans the whole whitespace run.
    origin: Vec<(usize, usize)>,
}

impl NormalizedText {
    pub fn new(original: &str) -> Self {
        let mut text = String::with_capacity(original.len());
        let mut folded = String::with_capacity(original.len());
        let mut folded_starts = Vec::with_capacity(original.len());
        let mut origin = Vec::with_capacity(original.len());
        let mut pending_ws: Option<(usize, usize)> = None;

        for (i, ch) in original.char_indices() {
            let end = i + ch.len_utf8();
            if ch.is_whitespace() {
                if !text.is_empty() {
                    let start = pending_ws.map(|(s, _)| s).unwrap_or(i);
                    pending_ws = Some((start, end));
                }
                continue;
            }
            if let Some(span) = pending_ws.take() {
                text.push(' ');
                folded_starts.push(folded.len());
                folded.push(' ');
                origin.push(span);
            }
            let q = unify_quote(ch);
            text.push(q);
            for lc in q.to_lowercase() {
                folded_starts.push(folded.len());
                folded.push(lc);
                origin.push((i, end));
            }
        }

        Self {
            text,
            folded,
            folded_starts,
            origin,
        }
    }

    /// Case-preserving normalized text (same as [`normalize`] of the original).
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Lowercase matching view.
    pub fn folded(&self) -> &str {
        &self.folded
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn folded_char_len(&self) -> usize {
        self.folded_starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// First occurrence of an already-folded needle, as a byte offset into [`Self::folded`].
    pub fn find(&self, folded_needle: &str) -> Option<usize> {
        if folded_needle.is_empty() {
            return None;
        }
        self.folded.find(folded_needle)
    }

    /// Char index into the folded view for a folded byte offset, if it is a char start.
    pub fn folded_char_index(&self, folded_byte: usize) -> Option<usize> {
        self.folded_starts.binary_search(&folded_byte).ok()
    }

    /// Map a folded match `[folded_byte, folded_byte + folded_len)` to an original byte span.
    ///
    /// Returns `None` when the range is empty, out of bounds, or not on char boundaries.
    pub fn original_span(&self, folded_byte: usize, folded_len: usize) -> Option<(usize, usize)> {
        if folded_len == 0 {
            return None;
        }
        let end_byte = folded_byte.checked_add(folded_len)?;
        if end_byte > self.folded.len() {
            return None;
        }
        let first = self.folded_char_index(folded_byte)?;
        let last = if end_byte == self.folded.len() {
            self.folded_starts.len().checked_sub(1)?
        } else {
            self.folded_char_index(end_byte)?.checked_sub(1)?
        };
        if last < first {
            return None;
        }
        Some((self.origin[first].0, self.origin[last].1))
    }
}
