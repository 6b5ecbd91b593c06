//! Input normalization and cache key derivation.
//! Texts are trimmed before any key derivation, so whitespace-padded variants
//! share one cache entry. No further normalization is applied.

use std::collections::HashSet;

/// Trim `text`, returning None when nothing is left.
pub fn normalize(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Cache key for a normalized text: `"{target}::{text}"`.
pub fn cache_key(text: &str, target: &str) -> String {
    format!("{target}::{text}")
}

/// Normalize every input and drop blanks and duplicates, keeping first-seen order.
pub fn unique_texts<'a, I>(texts: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    texts
        .into_iter()
        .filter_map(normalize)
        .filter(|text| seen.insert(*text))
        .map(str::to_string)
        .collect()
}
