//! Raw miss events. Grouping happens at read time in [`crate::unanswered`].

use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::{Store, now_iso8601};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnansweredQuestion {
    pub id: i64,
    pub user_question: String,
    pub session_id: String,
    pub created_at: String,
}

impl Store {
    pub fn record_unanswered(
        &self,
        user_question: &str,
        session_id: &str,
    ) -> Result<UnansweredQuestion, AppError> {
        let created_at = now_iso8601();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO unanswered_questions (user_question, session_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![user_question, session_id, created_at],
        )
        .map_err(|e| AppError::Store(format!("record unanswered question: {e}")))?;
        Ok(UnansweredQuestion {
            id: conn.last_insert_rowid(),
            user_question: user_question.to_string(),
            session_id: session_id.to_string(),
            created_at,
        })
    }

    /// Every recorded miss, newest first.
    pub fn list_unanswered(&self) -> Result<Vec<UnansweredQuestion>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_question, session_id, created_at FROM unanswered_questions
                 ORDER BY created_at DESC, id DESC",
            )
            .map_err(|e| AppError::Store(format!("prepare list_unanswered: {e}")))?;
        let rows = stmt
            .query_map([], |r| {
                Ok(UnansweredQuestion {
                    id: r.get(0)?,
                    user_question: r.get(1)?,
                    session_id: r.get(2)?,
                    created_at: r.get(3)?,
                })
            })
            .map_err(|e| AppError::Store(format!("query list_unanswered: {e}")))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| AppError::Store(format!("map unanswered row: {e}")))?);
        }
        Ok(out)
    }

    /// Delete the given rows in one transaction. Returns how many went.
    pub fn delete_unanswered(&self, ids: &[i64]) -> Result<usize, AppError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Store(format!("begin delete_unanswered: {e}")))?;
        let mut deleted = 0;
        {
            let mut stmt = tx
                .prepare("DELETE FROM unanswered_questions WHERE id = ?1")
                .map_err(|e| AppError::Store(format!("prepare delete_unanswered: {e}")))?;
            for id in ids {
                deleted += stmt
                    .execute(params![id])
                    .map_err(|e| AppError::Store(format!("delete unanswered {id}: {e}")))?;
            }
        }
        tx.commit()
            .map_err(|e| AppError::Store(format!("commit delete_unanswered: {e}")))?;
        Ok(deleted)
    }
}
