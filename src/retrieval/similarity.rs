//! Lexical similarity between short texts.
//!
//! Texts are normalised (lowercase, anything not alphanumeric becomes a
//! space, runs of whitespace collapse) and split into word tokens of at
//! least two characters. Scores are in `0.0..=1.0`.

use std::collections::HashSet;

/// Exact normalised phrasing matches score this; token overlap never reaches it.
pub const EXACT: f64 = 1.0;
const OVERLAP_CEILING: f64 = 0.99;

pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn tokens(text: &str) -> HashSet<String> {
    normalize(text)
        .split(' ')
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

/// Sørensen–Dice coefficient of two token sets.
pub fn dice(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    (2 * shared) as f64 / (a.len() + b.len()) as f64
}

/// Score an utterance against one stored phrasing.
pub fn phrasing_score(utterance: &str, phrasing: &str) -> f64 {
    let u = normalize(utterance);
    if u.is_empty() {
        return 0.0;
    }
    if u == normalize(phrasing) {
        return EXACT;
    }
    OVERLAP_CEILING * dice(&tokens(utterance), &tokens(phrasing))
}

/// Fraction of the distinct utterance tokens that occur in `window`.
pub fn coverage(utterance_tokens: &HashSet<String>, window: &str) -> f64 {
    if utterance_tokens.is_empty() {
        return 0.0;
    }
    let window_tokens = tokens(window);
    let found = utterance_tokens.iter().filter(|t| window_tokens.contains(*t)).count();
    found as f64 / utterance_tokens.len() as f64
}
