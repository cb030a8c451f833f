//! Unanswered-question miner.
//!
//! Every miss writes one raw row. Reads group those rows by a normalised key
//! (trimmed, lowercased, truncated) so repeated gaps surface by frequency.

use std::collections::HashMap;

use serde::Serialize;
use tracing::info;

use crate::config::UnansweredConfig;
use crate::error::AppError;
use crate::store::{KnowledgeEntry, NewKnowledgeEntry, Store, UnansweredQuestion};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnansweredGroup {
    pub key: String,
    /// Text of the most recent instance.
    pub question: String,
    pub count: usize,
    pub last_at: String,
}

#[derive(Debug, Clone)]
pub struct Miner {
    config: UnansweredConfig,
}

impl Miner {
    pub fn new(config: UnansweredConfig) -> Self {
        Self { config }
    }

    /// Lowercased prefix of the trimmed question. Trimmed again after
    /// truncation, so a key never ends in whitespace and round-trips through
    /// [`dismiss`](Self::dismiss) and friends.
    pub fn group_key(&self, question: &str) -> String {
        let prefix: String = question
            .trim()
            .to_lowercase()
            .chars()
            .take(self.config.key_prefix_len)
            .collect();
        prefix.trim_end().to_string()
    }

    /// Group raw rows. Sorted by count, then recency; at most
    /// `min(limit, max_page)` groups.
    pub fn group(&self, rows: &[UnansweredQuestion], limit: usize) -> Vec<UnansweredGroup> {
        let mut groups: HashMap<String, UnansweredGroup> = HashMap::new();
        for row in rows {
            let key = self.group_key(&row.user_question);
            if key.is_empty() {
                continue;
            }
            groups
                .entry(key.clone())
                .and_modify(|g| {
                    g.count += 1;
                    if row.created_at > g.last_at {
                        g.last_at = row.created_at.clone();
                        g.question = row.user_question.clone();
                    }
                })
                .or_insert_with(|| UnansweredGroup {
                    key,
                    question: row.user_question.clone(),
                    count: 1,
                    last_at: row.created_at.clone(),
                });
        }

        let mut groups: Vec<UnansweredGroup> = groups.into_values().collect();
        groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| b.last_at.cmp(&a.last_at)));
        groups.truncate(limit.min(self.config.max_page));
        groups
    }

    pub fn list_groups(&self, store: &Store, limit: usize) -> Result<Vec<UnansweredGroup>, AppError> {
        Ok(self.group(&store.list_unanswered()?, limit))
    }

    fn rows_for(&self, store: &Store, key: &str) -> Result<Vec<UnansweredQuestion>, AppError> {
        let key = key.trim().to_lowercase();
        Ok(store
            .list_unanswered()?
            .into_iter()
            .filter(|r| self.group_key(&r.user_question) == key)
            .collect())
    }

    /// Delete exactly the rows whose key equals `key`. Returns how many.
    pub fn dismiss(&self, store: &Store, key: &str) -> Result<usize, AppError> {
        let ids: Vec<i64> = self.rows_for(store, key)?.iter().map(|r| r.id).collect();
        if ids.is_empty() {
            return Err(AppError::NotFound(format!("unanswered group '{key}'")));
        }
        let deleted = store.delete_unanswered(&ids)?;
        info!(key, deleted, "unanswered: group dismissed");
        Ok(deleted)
    }

    /// A new entry pre-filled with the group's most recent question.
    pub fn draft(&self, store: &Store, key: &str) -> Result<NewKnowledgeEntry, AppError> {
        let rows = self.rows_for(store, key)?;
        let latest = rows
            .first()
            .ok_or_else(|| AppError::NotFound(format!("unanswered group '{key}'")))?;
        Ok(NewKnowledgeEntry {
            question: latest.user_question.trim().to_string(),
            ..NewKnowledgeEntry::default()
        })
    }

    /// Turn a group into a knowledge entry, then dismiss the group.
    pub fn convert(
        &self,
        store: &Store,
        key: &str,
        answer: &str,
        category: &str,
    ) -> Result<KnowledgeEntry, AppError> {
        let mut new = self.draft(store, key)?;
        new.answer = answer.to_string();
        new.category = category.to_string();
        let entry = store.insert_entry(new)?;
        self.dismiss(store, key)?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;

    fn row(id: i64, q: &str, at: &str) -> UnansweredQuestion {
        UnansweredQuestion {
            id,
            user_question: q.into(),
            session_id: "s".into(),
            created_at: at.into(),
        }
    }

    fn miner() -> Miner {
        Miner::new(UnansweredConfig::default())
    }

    #[test]
    fn groups_by_normalised_prefix() {
        let rows = vec![
            row(1, "Mag ik boos zijn?", "2025-01-01T10:00:00.000Z"),
            row(2, "  mag ik BOOS zijn?", "2025-01-02T10:00:00.000Z"),
            row(3, "Hoe lang duurt rouw?", "2025-01-03T10:00:00.000Z"),
        ];
        let groups = miner().group(&rows, 10);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "mag ik boos zijn?");
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].question, "  mag ik BOOS zijn?");
        assert_eq!(groups[1].count, 1);
    }

    #[test]
    fn long_questions_share_a_prefix_key() {
        let base = "a".repeat(60);
        let rows = vec![
            row(1, &format!("{base} eerste staart"), "2025-01-01T00:00:00.000Z"),
            row(2, &format!("{base} tweede staart"), "2025-01-01T00:00:01.000Z"),
        ];
        let groups = miner().group(&rows, 10);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key.chars().count(), 60);
    }

    #[test]
    fn key_cut_at_whitespace_still_finds_its_rows() {
        let (_dir, store) = temp_store();
        let question = format!("{} staart", "a".repeat(59));
        store.record_unanswered(&question, "s1").unwrap();

        let groups = miner().list_groups(&store, 10).unwrap();
        assert_eq!(groups.len(), 1);
        let key = groups[0].key.clone();
        assert_eq!(key, "a".repeat(59));

        assert_eq!(miner().draft(&store, &key).unwrap().question, question);
        assert_eq!(miner().dismiss(&store, &key).unwrap(), 1);
        assert!(store.list_unanswered().unwrap().is_empty());
    }

    #[test]
    fn page_is_capped() {
        let rows: Vec<_> = (0..150)
            .map(|i| row(i, &format!("vraag {i}"), "2025-01-01T00:00:00.000Z"))
            .collect();
        assert_eq!(miner().group(&rows, 500).len(), 100);
        assert_eq!(miner().group(&rows, 7).len(), 7);
    }

    #[test]
    fn dismiss_deletes_only_that_key() {
        let (_dir, store) = temp_store();
        store.record_unanswered("Mag ik boos zijn?", "s1").unwrap();
        store.record_unanswered("mag ik boos zijn?", "s2").unwrap();
        store.record_unanswered("Hoe lang duurt rouw?", "s3").unwrap();

        assert_eq!(miner().dismiss(&store, "mag ik boos zijn?").unwrap(), 2);
        let left = store.list_unanswered().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].user_question, "Hoe lang duurt rouw?");
        assert!(matches!(miner().dismiss(&store, "mag ik boos zijn?"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn convert_creates_entry_and_clears_group() {
        let (_dir, store) = temp_store();
        store.record_unanswered("Hoe lang duurt rouw?", "s1").unwrap();
        let entry = miner()
            .convert(&store, "hoe lang duurt rouw?", "Daar staat geen termijn voor.", "Rouw")
            .unwrap();
        assert_eq!(entry.question, "Hoe lang duurt rouw?");
        assert_eq!(entry.usage_count, 0);
        assert!(store.list_unanswered().unwrap().is_empty());
    }

    #[test]
    fn convert_without_answer_keeps_rows() {
        let (_dir, store) = temp_store();
        store.record_unanswered("Hoe lang duurt rouw?", "s1").unwrap();
        let err = miner().convert(&store, "hoe lang duurt rouw?", "", "Rouw").unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(store.list_unanswered().unwrap().len(), 1);
    }
}
