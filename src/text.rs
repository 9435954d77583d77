//! Canonicalization of free-text chemical names into lookup keys.
//!
//! The same function is applied to dataset synonyms at index build time and to
//! extracted names at query time, so the two sides always agree on key shape.

use unicode_normalization::UnicodeNormalization;

/// Characters carrying no meaning in a chemical name. Hyphens, commas,
/// parentheses, brackets and `+` are deliberately absent: they distinguish
/// isomers and oxidation states (`1,2-dichloroethane`, `iron(iii) oxide`).
const STRIPPED_PUNCTUATION: &[char] = &[
    '\'', '"', '`', ';', ':', '!', '?', '*', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}',
];

/// En dash, em dash and horizontal bar.
const DASH_VARIANTS: &[char] = &['\u{2013}', '\u{2014}', '\u{2015}'];

/// Normalize a raw chemical name into its lookup key.
///
/// NFKC folding, dash unification, removal of non-semantic punctuation,
/// lowercasing, and whitespace collapsing. Leading and trailing periods are
/// dropped (sentence punctuation that leaks through extraction). The function is
/// pure and idempotent: `normalize_name(&normalize_name(s)) == normalize_name(s)`.
#[must_use]
pub fn normalize_name(raw: &str) -> String {
    let folded: String = raw
        .nfkc()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .map(|c| if DASH_VARIANTS.contains(&c) { '-' } else { c })
        .collect();
    let lowered = folded.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

/// Similarity in `[0, 1]` between two already-normalized names.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}
