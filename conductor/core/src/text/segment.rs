//! Sentence Segmentation
//!
//! Splits response text into fragments the robot speaks one at a time.
//!
//! A fragment ends at sentence punctuation (`.`, `...`, `?`, `!`, or one of
//! those followed by a closing quote) when the punctuation is followed by
//! whitespace or the end of the text. Scanning runs left to right and the
//! earliest separator wins; at a single position the longest separator wins,
//! so `Fine...` stays one fragment instead of becoming `Fine.` plus `..`.
//! Fragments keep their punctuation, are trimmed, and are never empty.
//!
//! # Streaming
//!
//! [`Segmenter`] applies the same rules to a growing buffer. A fragment is
//! only released once nothing appended later could change it: its separator
//! must already be followed by whitespace. A separator sitting at the very
//! end of the buffer might still grow (`.` into `...`, or gain a closing
//! quote), so that fragment is held back until more text or
//! [`Segmenter::finish`] arrives.

/// Sentence separators, longest first so a longer match wins at a position
const SEPARATORS: &[&str] = &[
    "...\u{201D}",
    "...\u{2019}",
    "...\"",
    "...",
    ".\u{201D}",
    "?\u{201D}",
    "!\u{201D}",
    ".\u{2019}",
    "?\u{2019}",
    "!\u{2019}",
    ".\"",
    "?\"",
    "!\"",
    "\u{2026}",
    ".",
    "?",
    "!",
];

/// Byte offset just past the first fragment boundary at or after `from`
fn next_boundary(text: &str, from: usize) -> Option<usize> {
    let rest = &text[from..];
    for (offset, _) in rest.char_indices() {
        let tail = &rest[offset..];
        for separator in SEPARATORS {
            if let Some(after) = tail.strip_prefix(separator) {
                if after.is_empty() || after.starts_with(char::is_whitespace) {
                    return Some(from + offset + separator.len());
                }
            }
        }
    }
    None
}

fn push_trimmed(fragments: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        fragments.push(trimmed.to_string());
    }
}

/// Split complete text into ordered fragments
///
/// Trailing text without a separator becomes the final fragment as-is.
#[must_use]
pub fn segment(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut start = 0;
    while let Some(end) = next_boundary(text, start) {
        push_trimmed(&mut fragments, &text[start..end]);
        start = end;
    }
    push_trimmed(&mut fragments, &text[start..]);
    fragments
}

/// Incremental segmenter for streamed responses
///
/// Never re-emits text: every byte of the buffer belongs to at most one
/// released fragment.
#[derive(Debug, Default)]
pub struct Segmenter {
    buffer: String,
    consumed: usize,
    finished: bool,
}

impl Segmenter {
    /// Create an empty segmenter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return the fragments it completed
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.push_str(delta);

        let mut fragments = Vec::new();
        while let Some(end) = next_boundary(&self.buffer, self.consumed) {
            if end == self.buffer.len() {
                break;
            }
            push_trimmed(&mut fragments, &self.buffer[self.consumed..end]);
            self.consumed = end;
        }
        fragments
    }

    /// Mark production complete and return whatever is left
    pub fn finish(&mut self) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let fragments = segment(&self.buffer[self.consumed..]);
        self.consumed = self.buffer.len();
        fragments
    }

    /// Everything pushed so far
    #[must_use]
    pub fn text(&self) -> &str {
        &self.buffer
    }
}
