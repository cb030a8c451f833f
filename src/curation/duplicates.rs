//! Near-duplicate detection for proposed knowledge entries.
//!
//! Advisory only: warnings are returned next to a successful write and never
//! block it.

use serde::Serialize;

use crate::retrieval::similarity::normalize;
use crate::store::KnowledgeEntry;

/// Shortest common run (in characters) that can count as a duplicate.
const MIN_COMMON_RUN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DuplicateReason {
    /// The existing phrasing contains the proposal.
    ContainsProposal,
    /// The proposal contains the existing phrasing.
    ContainedInProposal,
    CommonSubstring { length: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateWarning {
    pub entry_id: String,
    pub category: String,
    /// The existing phrasing that triggered the warning.
    pub phrasing: String,
    pub reason: DuplicateReason,
}

/// Active entries in `category` (case-insensitive) with a phrasing that looks
/// like `proposed_question`. At most one warning per entry.
pub fn find_likely_duplicates(
    category: &str,
    proposed_question: &str,
    existing: &[KnowledgeEntry],
) -> Vec<DuplicateWarning> {
    let proposal = normalize(proposed_question);
    if proposal.is_empty() {
        return Vec::new();
    }
    let category = category.trim().to_lowercase();

    existing
        .iter()
        .filter(|e| e.is_active && e.category.trim().to_lowercase() == category)
        .filter_map(|e| {
            e.phrasings().find_map(|p| {
                compare(&proposal, &normalize(p)).map(|reason| DuplicateWarning {
                    entry_id: e.id.clone(),
                    category: e.category.clone(),
                    phrasing: p.to_string(),
                    reason,
                })
            })
        })
        .collect()
}

fn compare(proposal: &str, existing: &str) -> Option<DuplicateReason> {
    if existing.is_empty() {
        return None;
    }
    if existing.contains(proposal) {
        return Some(DuplicateReason::ContainsProposal);
    }
    if proposal.contains(existing) {
        return Some(DuplicateReason::ContainedInProposal);
    }
    let shorter = proposal.chars().count().min(existing.chars().count());
    let threshold = MIN_COMMON_RUN.max(shorter.div_ceil(2));
    let length = longest_common_substring(proposal, existing);
    (length >= threshold).then_some(DuplicateReason::CommonSubstring { length })
}

/// Length in characters of the longest run shared by `a` and `b`.
fn longest_common_substring(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev = vec![0usize; b.len() + 1];
    let mut best = 0;
    for ca in &a {
        let mut row = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                row[j + 1] = prev[j] + 1;
                best = best.max(row[j + 1]);
            }
        }
        prev = row;
    }
    best
}
