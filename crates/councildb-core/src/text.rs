//! Text folding helpers shared by the cache and the query stages.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

fn fold(input: &str) -> String {
    input.nfkd().filter(|c| !is_combining_mark(*c)).flat_map(char::to_lowercase).collect()
}

/// Canonical form of a question used as a cache key.
///
/// Compatibility-decomposes, drops diacritics, lowercases, removes every
/// character that is not a letter, digit, underscore or whitespace, and
/// collapses whitespace. Idempotent.
pub fn normalize_question(input: &str) -> String {
    // Lowercasing can expose new decomposable characters, so fold twice.
    let folded = fold(&fold(input));
    let kept: String = folded
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether any of `needles` is a substring of the already-lowercased `haystack`.
pub fn contains_any<S: AsRef<str>>(haystack: &str, needles: &[S]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_ref()))
}

/// First `max` characters of `s`, respecting char boundaries.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
