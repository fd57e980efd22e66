//! Query and name normalization shared by the index writer and the
//! search-time query builders. Both sides must agree on tokenization,
//! otherwise phrase and permuted matching silently miss.

/// Punctuation ignored when comparing name lengths for exact matching.
/// Mirrors the characters stripped by the scoring adjustment in the
/// original name index.
const LENGTH_PUNCTUATION: [char; 5] = [' ', '.', ',', '-', '\''];

/// Normalize a raw query: drop quote characters and trim whitespace.
///
/// Quotes would otherwise be interpreted as phrase syntax by the index;
/// callers always get phrase semantics through the `Phrase` method instead.
pub fn normalize_query(raw: &str) -> String {
    raw.replace('"', "").trim().to_string()
}

/// Lowercased whitespace tokens of an already-normalized query.
pub fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}

/// Character count with separator punctuation removed.
///
/// Used by the exact strategy so that a short query cannot match a longer
/// name that merely starts or ends with it.
pub fn punct_stripped_len(text: &str) -> u64 {
    text.chars()
        .filter(|c| !LENGTH_PUNCTUATION.contains(c))
        .count() as u64
}
