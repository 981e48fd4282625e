//! Hinglish vocabulary normalization.
//!
//! Rewrites colloquial Hindi time words into canonical English so the rule
//! table only has to know one vocabulary. Matching is whole-word and
//! case-insensitive; the output is lowercased with whitespace collapsed.
//! Canonical text is a fixed point: `normalize(normalize(x)) == normalize(x)`.

use std::sync::LazyLock;

use regex::Regex;

/// Source word (or regex alternation) to canonical replacement.
///
/// Order matters only where a longer phrase contains a shorter entry, so
/// multi-word phrases come first.
const LEXICON: &[(&str, &str)] = &[
    ("parso", "day after tomorrow"),
    ("kal", "tomorrow"),
    ("aaj", "today"),
    ("subah|savere", "morning"),
    ("dopahar|dopehar", "afternoon"),
    ("shaam", "evening"),
    ("raat", "night"),
    ("baad", "after"),
    ("pehle", "before"),
    ("min|minute", "minutes"),
    ("ghante|ghanta", "hours"),
    ("din", "days"),
    ("hafte|hafta", "week"),
    ("mahina|mahine", "month"),
];

static VOCABULARY: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    LEXICON
        .iter()
        .filter_map(|(words, canonical)| {
            Regex::new(&format!(r"(?i)\b(?:{words})\b"))
                .ok()
                .map(|re| (re, *canonical))
        })
        .collect()
});

/// Number of compiled vocabulary rules.
pub fn vocabulary_len() -> usize {
    VOCABULARY.len()
}

/// Normalize `text` into canonical lowercase English time vocabulary.
pub fn normalize(text: &str) -> String {
    let mut out = text.to_lowercase();
    for (pattern, canonical) in VOCABULARY.iter() {
        if pattern.is_match(&out) {
            out = pattern.replace_all(&out, *canonical).into_owned();
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
