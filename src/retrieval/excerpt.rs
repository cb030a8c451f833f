//! Fixed-size windows over source-document text.

use std::collections::HashSet;

use serde::Serialize;
use text_splitter::TextSplitter;

use crate::store::SourceDocument;

use super::similarity::coverage;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Excerpt {
    pub source_id: String,
    pub title: String,
    pub text: String,
    pub score: f64,
}

/// Score every window of every document. Windows below `min_score` are dropped.
pub(crate) fn score_windows(
    utterance_tokens: &HashSet<String>,
    sources: &[SourceDocument],
    window_chars: usize,
    min_score: f64,
) -> Vec<Excerpt> {
    if utterance_tokens.is_empty() || window_chars == 0 {
        return Vec::new();
    }
    let splitter = TextSplitter::new(window_chars);
    let mut out = Vec::new();
    for doc in sources.iter().filter(|d| d.is_active) {
        for window in splitter.chunks(&doc.extracted_text) {
            if window.trim().is_empty() {
                continue;
            }
            let score = coverage(utterance_tokens, window);
            if score >= min_score {
                out.push(Excerpt {
                    source_id: doc.id.clone(),
                    title: doc.title.clone(),
                    text: window.to_string(),
                    score,
                });
            }
        }
    }
    out
}
