//! The `bot_settings` singleton: global knowledge text and behaviour rules.

use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::{Store, now_iso8601};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotSettings {
    /// Free-text background knowledge included in every generation request.
    pub knowledge: String,
    /// Newline-separated behaviour rules. Curation only ever appends here.
    pub rules: String,
    pub updated_at: String,
}

/// Result of a rules append: the text before and after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesUpdate {
    pub previous: String,
    pub rules: String,
}

impl Store {
    pub fn get_settings(&self) -> Result<BotSettings, AppError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT knowledge, rules, updated_at FROM bot_settings WHERE id = 1",
                [],
                |r| {
                    Ok(BotSettings {
                        knowledge: r.get(0)?,
                        rules: r.get(1)?,
                        updated_at: r.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(|e| AppError::Store(format!("read bot_settings: {e}")))?;
        Ok(row.unwrap_or_default())
    }

    /// Operator edit. `None` leaves a field as it is.
    pub fn update_settings(
        &self,
        knowledge: Option<&str>,
        rules: Option<&str>,
    ) -> Result<BotSettings, AppError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE bot_settings
             SET knowledge = COALESCE(?1, knowledge),
                 rules = COALESCE(?2, rules),
                 updated_at = ?3
             WHERE id = 1",
            params![knowledge, rules, now_iso8601()],
        )
        .map_err(|e| AppError::Store(format!("update bot_settings: {e}")))?;
        drop(conn);
        self.get_settings()
    }

    /// Append `text` as a new line of `rules`. The append happens inside one
    /// SQL statement so a concurrent append is never lost.
    pub fn append_rules(&self, text: &str) -> Result<RulesUpdate, AppError> {
        let addition = text.trim();
        if addition.is_empty() {
            return Err(AppError::validation("proposed_text", "must not be empty"));
        }

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Store(format!("begin append_rules: {e}")))?;
        let previous: String = tx
            .query_row("SELECT rules FROM bot_settings WHERE id = 1", [], |r| r.get(0))
            .map_err(|e| AppError::Store(format!("read rules: {e}")))?;
        tx.execute(
            "UPDATE bot_settings
             SET rules = CASE WHEN rules = '' THEN ?1 ELSE rules || char(10) || ?1 END,
                 updated_at = ?2
             WHERE id = 1",
            params![addition, now_iso8601()],
        )
        .map_err(|e| AppError::Store(format!("append rules: {e}")))?;
        let rules: String = tx
            .query_row("SELECT rules FROM bot_settings WHERE id = 1", [], |r| r.get(0))
            .map_err(|e| AppError::Store(format!("read rules: {e}")))?;
        tx.commit()
            .map_err(|e| AppError::Store(format!("commit append_rules: {e}")))?;

        Ok(RulesUpdate { previous, rules })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::temp_store;
    use super::*;

    #[test]
    fn fresh_settings_are_empty() {
        let (_dir, store) = temp_store();
        let s = store.get_settings().unwrap();
        assert!(s.knowledge.is_empty());
        assert!(s.rules.is_empty());
    }

    #[test]
    fn append_keeps_previous_rules() {
        let (_dir, store) = temp_store();
        store.update_settings(None, Some("Wees warm en geduldig.")).unwrap();
        let update = store.append_rules("Verwijs bij crisis naar 113.").unwrap();
        assert_eq!(update.previous, "Wees warm en geduldig.");
        assert_eq!(update.rules, "Wees warm en geduldig.\nVerwijs bij crisis naar 113.");
        assert!(update.rules.starts_with(&update.previous));
    }

    #[test]
    fn append_to_empty_has_no_leading_newline() {
        let (_dir, store) = temp_store();
        let update = store.append_rules("  Eerste regel.  ").unwrap();
        assert_eq!(update.rules, "Eerste regel.");
    }

    #[test]
    fn append_empty_is_validation_error() {
        let (_dir, store) = temp_store();
        assert!(matches!(store.append_rules("   "), Err(AppError::Validation { .. })));
    }

    #[test]
    fn update_leaves_unset_fields() {
        let (_dir, store) = temp_store();
        store.update_settings(Some("Over rouw."), Some("Regel.")).unwrap();
        let s = store.update_settings(Some("Nieuwe kennis."), None).unwrap();
        assert_eq!(s.knowledge, "Nieuwe kennis.");
        assert_eq!(s.rules, "Regel.");
    }
}
