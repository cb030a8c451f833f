//! Knowledge entries: curated question/answer pairs with alternative phrasings.

use std::collections::BTreeSet;

use rusqlite::{Row, params, types::Type};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::{Store, new_id, now_iso8601, to_json};

const DEFAULT_PRIORITY: u8 = 5;

/// A curated question/answer pair: the unit of factual knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    /// Canonical question.
    pub question: String,
    /// Canonical answer.
    pub answer: String,
    /// Interchangeable phrasings of `question`, in curation order.
    pub alternative_questions: Vec<String>,
    /// Interchangeable phrasings of `answer`, used for response variety.
    pub alternative_answers: Vec<String>,
    pub category: String,
    pub tags: BTreeSet<String>,
    /// 1–10; breaks ranking ties (higher first).
    pub priority: u8,
    pub is_active: bool,
    /// Incremented on each successful match. Advisory, not exact.
    pub usage_count: u64,
    pub average_rating: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl KnowledgeEntry {
    /// Canonical question followed by every alternative, in order.
    pub fn phrasings(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.question.as_str())
            .chain(self.alternative_questions.iter().map(String::as_str))
    }
}

/// Fields for inserting a new entry. Every field may be omitted when
/// deserializing; [`validate`](Self::validate) reports what is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewKnowledgeEntry {
    pub question: String,
    pub answer: String,
    pub alternative_questions: Vec<String>,
    pub alternative_answers: Vec<String>,
    pub category: String,
    pub tags: BTreeSet<String>,
    pub priority: Option<u8>,
    pub is_active: Option<bool>,
}

impl NewKnowledgeEntry {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            category: category.into(),
            ..Self::default()
        }
    }

    /// Reject missing required fields before anything touches the database.
    pub fn validate(&self) -> Result<(), AppError> {
        require("question", &self.question)?;
        require("answer", &self.answer)?;
        require("category", &self.category)?;
        if let Some(p) = self.priority {
            validate_priority(p)?;
        }
        Ok(())
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeUpdate {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub alternative_questions: Option<Vec<String>>,
    pub alternative_answers: Option<Vec<String>>,
    pub category: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub priority: Option<u8>,
    pub is_active: Option<bool>,
    pub average_rating: Option<f64>,
}

impl KnowledgeUpdate {
    fn apply(self, entry: &mut KnowledgeEntry) -> Result<(), AppError> {
        if let Some(q) = self.question {
            require("question", &q)?;
            entry.question = q.trim().to_string();
        }
        if let Some(a) = self.answer {
            require("answer", &a)?;
            entry.answer = a.trim().to_string();
        }
        if let Some(c) = self.category {
            require("category", &c)?;
            entry.category = c.trim().to_string();
        }
        if let Some(p) = self.priority {
            validate_priority(p)?;
            entry.priority = p;
        }
        if let Some(alts) = self.alternative_questions {
            entry.alternative_questions = clean_list(alts);
        }
        if let Some(alts) = self.alternative_answers {
            entry.alternative_answers = clean_list(alts);
        }
        if let Some(tags) = self.tags {
            entry.tags = tags;
        }
        if let Some(active) = self.is_active {
            entry.is_active = active;
        }
        if let Some(rating) = self.average_rating {
            entry.average_rating = Some(rating);
        }
        Ok(())
    }
}

/// Listing filter for operator views.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryFilter {
    #[serde(default)]
    pub active_only: bool,
    #[serde(default)]
    pub category: Option<String>,
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        Err(AppError::validation(field, "must not be empty"))
    } else {
        Ok(())
    }
}

fn validate_priority(p: u8) -> Result<(), AppError> {
    if (1..=10).contains(&p) {
        Ok(())
    } else {
        Err(AppError::validation("priority", format!("must be between 1 and 10, got {p}")))
    }
}

/// Trim, drop empties, drop exact repeats; order preserved.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

const ENTRY_COLUMNS: &str = "id, question, answer, alternative_questions, alternative_answers, \
     category, tags, priority, is_active, usage_count, average_rating, created_at, updated_at";

/// Decode a JSON list column. A malformed value fails the row instead of
/// reading as empty.
fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<KnowledgeEntry> {
    let priority: i64 = row.get(7)?;
    let usage: i64 = row.get(9)?;
    Ok(KnowledgeEntry {
        id: row.get(0)?,
        question: row.get(1)?,
        answer: row.get(2)?,
        alternative_questions: json_column(row, 3)?,
        alternative_answers: json_column(row, 4)?,
        category: row.get(5)?,
        tags: json_column(row, 6)?,
        priority: priority.clamp(1, 10) as u8,
        is_active: row.get(8)?,
        usage_count: usage.max(0) as u64,
        average_rating: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl Store {
    /// Validate and insert a new entry. `usage_count` starts at 0.
    pub fn insert_entry(&self, new: NewKnowledgeEntry) -> Result<KnowledgeEntry, AppError> {
        new.validate()?;
        let now = now_iso8601();
        let entry = KnowledgeEntry {
            id: new_id(),
            question: new.question.trim().to_string(),
            answer: new.answer.trim().to_string(),
            alternative_questions: clean_list(new.alternative_questions),
            alternative_answers: clean_list(new.alternative_answers),
            category: new.category.trim().to_string(),
            tags: new.tags,
            priority: new.priority.unwrap_or(DEFAULT_PRIORITY),
            is_active: new.is_active.unwrap_or(true),
            usage_count: 0,
            average_rating: None,
            created_at: now.clone(),
            updated_at: now,
        };

        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO knowledge_entries ({ENTRY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"),
            params![
                entry.id,
                entry.question,
                entry.answer,
                to_json(&entry.alternative_questions, "alternative_questions")?,
                to_json(&entry.alternative_answers, "alternative_answers")?,
                entry.category,
                to_json(&entry.tags, "tags")?,
                entry.priority as i64,
                entry.is_active,
                entry.usage_count as i64,
                entry.average_rating,
                entry.created_at,
                entry.updated_at,
            ],
        )
        .map_err(|e| AppError::Store(format!("insert knowledge entry: {e}")))?;
        Ok(entry)
    }

    pub fn get_entry(&self, id: &str) -> Result<KnowledgeEntry, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {ENTRY_COLUMNS} FROM knowledge_entries WHERE id = ?1"))
            .map_err(|e| AppError::Store(format!("prepare get_entry: {e}")))?;
        let mut rows = stmt
            .query_map(params![id], entry_from_row)
            .map_err(|e| AppError::Store(format!("query get_entry: {e}")))?;
        match rows.next() {
            Some(row) => row.map_err(|e| AppError::Store(format!("map entry {id}: {e}"))),
            None => Err(AppError::NotFound(format!("knowledge entry {id}"))),
        }
    }

    /// Entries ordered by category, then priority (highest first), then age.
    pub fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<KnowledgeEntry>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM knowledge_entries
                 WHERE (?1 = 0 OR is_active = 1)
                   AND (?2 IS NULL OR lower(category) = lower(?2))
                 ORDER BY category, priority DESC, created_at"
            ))
            .map_err(|e| AppError::Store(format!("prepare list_entries: {e}")))?;
        let rows = stmt
            .query_map(params![filter.active_only, filter.category], entry_from_row)
            .map_err(|e| AppError::Store(format!("query list_entries: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| AppError::Store(format!("map list_entries row: {e}")))?);
        }
        Ok(entries)
    }

    pub fn list_active_entries(&self) -> Result<Vec<KnowledgeEntry>, AppError> {
        self.list_entries(&EntryFilter { active_only: true, category: None })
    }

    pub fn count_active_entries(&self) -> Result<usize, AppError> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM knowledge_entries WHERE is_active = 1", [], |r| r.get(0))
            .map_err(|e| AppError::Store(format!("count active entries: {e}")))?;
        Ok(n as usize)
    }

    /// Apply a partial update and bump `updated_at`.
    pub fn update_entry(&self, id: &str, update: KnowledgeUpdate) -> Result<KnowledgeEntry, AppError> {
        let mut entry = self.get_entry(id)?;
        update.apply(&mut entry)?;
        entry.updated_at = now_iso8601();

        let conn = self.conn()?;
        conn.execute(
            "UPDATE knowledge_entries SET question = ?2, answer = ?3, alternative_questions = ?4,
                 alternative_answers = ?5, category = ?6, tags = ?7, priority = ?8, is_active = ?9,
                 average_rating = ?10, updated_at = ?11
             WHERE id = ?1",
            params![
                entry.id,
                entry.question,
                entry.answer,
                to_json(&entry.alternative_questions, "alternative_questions")?,
                to_json(&entry.alternative_answers, "alternative_answers")?,
                entry.category,
                to_json(&entry.tags, "tags")?,
                entry.priority as i64,
                entry.is_active,
                entry.average_rating,
                entry.updated_at,
            ],
        )
        .map_err(|e| AppError::Store(format!("update knowledge entry {id}: {e}")))?;
        Ok(entry)
    }

    /// Single-statement increment; concurrent increments may interleave but
    /// never read-modify-write stale values.
    pub fn increment_usage(&self, id: &str) -> Result<(), AppError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE knowledge_entries SET usage_count = usage_count + 1 WHERE id = ?1",
            params![id],
        )
        .map_err(|e| AppError::Store(format!("increment usage for {id}: {e}")))?;
        Ok(())
    }

    pub fn delete_entry(&self, id: &str) -> Result<(), AppError> {
        let conn = self.conn()?;
        let n = conn
            .execute("DELETE FROM knowledge_entries WHERE id = ?1", params![id])
            .map_err(|e| AppError::Store(format!("delete knowledge entry {id}: {e}")))?;
        if n == 0 {
            return Err(AppError::NotFound(format!("knowledge entry {id}")));
        }
        Ok(())
    }
}
