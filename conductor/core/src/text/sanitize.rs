//! Speech sanitization
//!
//! Language models answer with markdown, emoji, typographic quotes, and
//! accented letters. The robot's voice reads plain ASCII best, so every
//! fragment passes through [`sanitize`] before it is spoken.
//!
//! The work is a declarative table of `(pattern, replacement)` rules applied
//! in order after diacritics are stripped. Add a rule by adding a row.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Ordered substitution rules
const RULES: &[(&str, &str)] = &[
    // Markdown and markup noise
    (r"[&^*#@]", ""),
    // Emoji, pictographs, dingbats, flags, and their joiners
    (
        r"[\x{1F000}-\x{1FAFF}\x{2600}-\x{27BF}\x{2B00}-\x{2BFF}\x{FE0F}\x{200D}]",
        "",
    ),
    (r"[\x{2018}\x{2019}]", "'"),
    (r"[\x{201C}\x{201D}]", "\""),
    (r"[\x{2014}\x{2013}]", "-"),
    (r"\x{2026}", "..."),
    (r"\x{00A0}", " "),
    (r"\x{2022}", "-"),
    (r"\x{00BC}", "1/4"),
    (r"\x{00BD}", "1/2"),
    (r"\x{00BE}", "3/4"),
    (r"\x{00D7}", "x"),
    (r"\x{00F7}", "/"),
    (r"\x{00A9}", "(c)"),
    (r"\x{00AE}", "(r)"),
    (r"\x{2122}", "(tm)"),
    // Spell the acronym out so the voice does not say "eye"
    (r"\bAI\b", "A. I."),
    // Tidy what the removals leave behind
    (r"\s+([.,!?;:])", "$1"),
    (r"(A\. I\.)\.", "$1"),
    (r" {2,}", " "),
];

static COMPILED: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    RULES
        .iter()
        .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
            Ok(regex) => Some((regex, *replacement)),
            Err(e) => {
                tracing::error!(pattern, error = %e, "Invalid sanitization rule skipped");
                None
            }
        })
        .collect()
});

/// Strip diacritics by decomposing and dropping combining marks
fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Normalize text for the robot's speech synthesizer
#[must_use]
pub fn sanitize(text: &str) -> String {
    let mut out = strip_diacritics(text);
    for (regex, replacement) in COMPILED.iter() {
        if regex.is_match(&out) {
            out = regex.replace_all(&out, *replacement).into_owned();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_all_compile() {
        assert_eq!(COMPILED.len(), RULES.len());
    }

    #[test]
    fn test_strips_diacritics() {
        assert_eq!(sanitize("café crème façade"), "cafe creme facade");
    }

    #[test]
    fn test_drops_markdown_and_emoji() {
        assert_eq!(sanitize("**Bold** move 🚀✨"), "Bold move ");
        assert_eq!(sanitize("# Heading"), " Heading");
    }

    #[test]
    fn test_maps_typography_to_ascii() {
        assert_eq!(
            sanitize("\u{201C}It\u{2019}s\u{201D} fine\u{2026} 5\u{00D7}3 \u{2014} ok"),
            "\"It's\" fine... 5x3 - ok"
        );
        assert_eq!(sanitize("\u{00BD} cup\u{00A0}of tea\u{2122}"), "1/2 cup of tea(tm)");
    }

    #[test]
    fn test_spells_out_ai() {
        assert_eq!(sanitize("I am an AI robot"), "I am an A. I. robot");
        assert_eq!(sanitize("AIR and PAIR stay"), "AIR and PAIR stay");
        assert_eq!(sanitize("I'm an AI."), "I'm an A. I.");
        assert_eq!(sanitize("Ask the AI..."), "Ask the A. I...");
    }

    #[test]
    fn test_removals_leave_no_stray_spacing() {
        assert_eq!(sanitize("Cafe time \u{2615}."), "Cafe time.");
        assert_eq!(sanitize("Launch \u{1F680} now , please !"), "Launch now, please!");
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "Hello there. How are you?";
        assert_eq!(sanitize(text), text);
    }
}
