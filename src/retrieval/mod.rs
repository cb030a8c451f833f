//! Matcher: ranks knowledge entries and source excerpts for one utterance.
//!
//! Entries are scored by their best phrasing (canonical question or any
//! alternative), excerpts by token coverage of a fixed-size window. Anything
//! under its threshold is discarded; when nothing survives the result is a
//! miss.

mod excerpt;
pub mod similarity;

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::error::AppError;
use crate::store::{KnowledgeEntry, SourceDocument, Store};

pub use excerpt::Excerpt;

/// Optional narrowing supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchHints {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
    pub entry: KnowledgeEntry,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchResult {
    pub entries: Vec<ScoredEntry>,
    pub excerpts: Vec<Excerpt>,
}

impl MatchResult {
    pub fn is_miss(&self) -> bool {
        self.entries.is_empty() && self.excerpts.is_empty()
    }

    pub fn top_entry(&self) -> Option<&KnowledgeEntry> {
        self.entries.first().map(|s| &s.entry)
    }
}

#[derive(Debug, Clone)]
pub struct Matcher {
    config: RetrievalConfig,
}

impl Matcher {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    /// Rank `entries` against `utterance`. Only active entries passing the
    /// hints and scoring at least `min_confidence` are returned, best first,
    /// at most `max_entries` of them.
    pub fn rank_entries(
        &self,
        utterance: &str,
        hints: &MatchHints,
        entries: &[KnowledgeEntry],
    ) -> Vec<ScoredEntry> {
        let mut scored: Vec<ScoredEntry> = entries
            .iter()
            .filter(|e| e.is_active && passes_hints(e, hints))
            .filter_map(|e| {
                let score = e
                    .phrasings()
                    .map(|p| similarity::phrasing_score(utterance, p))
                    .fold(0.0_f64, f64::max);
                (score >= self.config.min_confidence)
                    .then(|| ScoredEntry { entry: e.clone(), score })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.entry.priority.cmp(&a.entry.priority))
                .then_with(|| b.entry.usage_count.cmp(&a.entry.usage_count))
        });
        scored.truncate(self.config.max_entries);
        scored
    }

    /// Best `max_excerpts` windows across all active sources.
    pub fn rank_excerpts(&self, utterance: &str, sources: &[SourceDocument]) -> Vec<Excerpt> {
        let mut found = excerpt::score_windows(
            &similarity::tokens(utterance),
            sources,
            self.config.excerpt_window_chars,
            self.config.source_min_confidence,
        );
        found.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        found.truncate(self.config.max_excerpts);
        found
    }

    /// Pure ranking over already-loaded records.
    pub fn rank(
        &self,
        utterance: &str,
        hints: &MatchHints,
        entries: &[KnowledgeEntry],
        sources: &[SourceDocument],
    ) -> MatchResult {
        MatchResult {
            entries: self.rank_entries(utterance, hints, entries),
            excerpts: self.rank_excerpts(utterance, sources),
        }
    }

    /// Load active records from `store`, rank them, and on a hit bump the
    /// top entry's usage counter. The bump is best effort and never fails
    /// the match.
    pub fn run(
        &self,
        store: &Store,
        utterance: &str,
        hints: &MatchHints,
    ) -> Result<MatchResult, AppError> {
        let entries = store.list_active_entries()?;
        let sources = store.list_active_sources()?;
        let result = self.rank(utterance, hints, &entries, &sources);

        debug!(
            entries = result.entries.len(),
            excerpts = result.excerpts.len(),
            top_score = result.entries.first().map(|s| s.score).unwrap_or(0.0),
            "matcher: ranked"
        );

        if let Some(top) = result.top_entry() {
            if let Err(e) = store.increment_usage(&top.id) {
                warn!(entry_id = %top.id, error = %e, "matcher: usage increment failed");
            }
        }
        Ok(result)
    }
}

fn passes_hints(entry: &KnowledgeEntry, hints: &MatchHints) -> bool {
    if let Some(category) = &hints.category {
        if !entry.category.to_lowercase().eq(&category.trim().to_lowercase()) {
            return false;
        }
    }
    hints.tags.is_empty() || hints.tags.iter().any(|t| entry.tags.contains(t))
}
