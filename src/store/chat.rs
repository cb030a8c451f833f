//! Conversation log: sessions and their ordered messages.
//!
//! Message text is never rewritten. The only mutable columns are the
//! feedback flag and the curation state attached to it.

use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};

use crate::curation::CurationState;
use crate::error::AppError;

use super::{Store, new_id, now_iso8601};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Bot,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Bot => "bot",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "bot" { MessageRole::Bot } else { MessageRole::User }
    }
}

/// Operator verdict on a bot message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Helpful,
    NotHelpful,
    #[default]
    None,
}

impl Feedback {
    pub fn as_str(self) -> &'static str {
        match self {
            Feedback::Helpful => "helpful",
            Feedback::NotHelpful => "not_helpful",
            Feedback::None => "none",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "helpful" => Feedback::Helpful,
            "not_helpful" => Feedback::NotHelpful,
            _ => Feedback::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub feedback: Feedback,
    pub feedback_at: Option<String>,
    pub curation_state: Option<CurationState>,
    pub created_at: String,
}

/// A flagged bot message together with the user turn it answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedMessage {
    pub message: ChatMessage,
    pub question: Option<String>,
}

const MESSAGE_COLUMNS: &str =
    "id, session_id, role, content, feedback, feedback_at, curation_state, created_at";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role: String = row.get(2)?;
    let feedback: String = row.get(4)?;
    let state: Option<String> = row.get(6)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: MessageRole::parse(&role),
        content: row.get(3)?,
        feedback: Feedback::parse(&feedback),
        feedback_at: row.get(5)?,
        curation_state: state.as_deref().and_then(|s| s.parse().ok()),
        created_at: row.get(7)?,
    })
}

fn collect<I>(rows: I, what: &str) -> Result<Vec<ChatMessage>, AppError>
where
    I: Iterator<Item = rusqlite::Result<ChatMessage>>,
{
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| AppError::Store(format!("map {what} row: {e}")))?);
    }
    Ok(out)
}

impl Store {
    pub fn create_session(&self) -> Result<ChatSession, AppError> {
        let session = ChatSession { id: new_id(), created_at: now_iso8601() };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO chat_sessions (id, created_at) VALUES (?1, ?2)",
            params![session.id, session.created_at],
        )
        .map_err(|e| AppError::Store(format!("insert session: {e}")))?;
        Ok(session)
    }

    /// Create the session row if `id` has not been seen before.
    pub fn ensure_session(&self, id: &str) -> Result<(), AppError> {
        if id.trim().is_empty() {
            return Err(AppError::validation("session_id", "must not be empty"));
        }
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO chat_sessions (id, created_at) VALUES (?1, ?2)",
            params![id, now_iso8601()],
        )
        .map_err(|e| AppError::Store(format!("ensure session {id}: {e}")))?;
        Ok(())
    }

    pub fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage, AppError> {
        let msg = ChatMessage {
            id: new_id(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            feedback: Feedback::None,
            feedback_at: None,
            curation_state: None,
            created_at: now_iso8601(),
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO chat_messages (id, session_id, role, content, feedback, created_at)
             VALUES (?1, ?2, ?3, ?4, 'none', ?5)",
            params![msg.id, msg.session_id, role.as_str(), msg.content, msg.created_at],
        )
        .map_err(|e| AppError::Store(format!("append message to {session_id}: {e}")))?;
        Ok(msg)
    }

    pub fn get_message(&self, id: &str) -> Result<ChatMessage, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE id = ?1"))
            .map_err(|e| AppError::Store(format!("prepare get_message: {e}")))?;
        let mut rows = stmt
            .query_map(params![id], message_from_row)
            .map_err(|e| AppError::Store(format!("query get_message: {e}")))?;
        match rows.next() {
            Some(row) => row.map_err(|e| AppError::Store(format!("map message {id}: {e}"))),
            None => Err(AppError::NotFound(format!("message {id}"))),
        }
    }

    /// Full history of a session in insertion order.
    pub fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE session_id = ?1 ORDER BY seq"
            ))
            .map_err(|e| AppError::Store(format!("prepare list_messages: {e}")))?;
        let rows = stmt
            .query_map(params![session_id], message_from_row)
            .map_err(|e| AppError::Store(format!("query list_messages: {e}")))?;
        collect(rows, "list_messages")
    }

    /// The most recent `n` messages of a session, oldest first.
    pub fn last_messages(&self, session_id: &str, n: usize) -> Result<Vec<ChatMessage>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM (
                     SELECT seq, {MESSAGE_COLUMNS} FROM chat_messages
                     WHERE session_id = ?1 ORDER BY seq DESC LIMIT ?2
                 ) ORDER BY seq"
            ))
            .map_err(|e| AppError::Store(format!("prepare last_messages: {e}")))?;
        let rows = stmt
            .query_map(params![session_id, n as i64], message_from_row)
            .map_err(|e| AppError::Store(format!("query last_messages: {e}")))?;
        collect(rows, "last_messages")
    }

    /// Set the feedback flag and the curation state that goes with it.
    pub fn set_feedback(
        &self,
        id: &str,
        feedback: Feedback,
        state: Option<CurationState>,
    ) -> Result<ChatMessage, AppError> {
        let feedback_at = (feedback != Feedback::None).then(now_iso8601);
        let conn = self.conn()?;
        let n = conn
            .execute(
                "UPDATE chat_messages SET feedback = ?2, feedback_at = ?3, curation_state = ?4
                 WHERE id = ?1",
                params![id, feedback.as_str(), feedback_at, state.map(|s| s.as_str())],
            )
            .map_err(|e| AppError::Store(format!("set feedback on {id}: {e}")))?;
        if n == 0 {
            return Err(AppError::NotFound(format!("message {id}")));
        }
        drop(conn);
        self.get_message(id)
    }

    pub fn set_curation_state(&self, id: &str, state: CurationState) -> Result<(), AppError> {
        let conn = self.conn()?;
        let n = conn
            .execute(
                "UPDATE chat_messages SET curation_state = ?2 WHERE id = ?1",
                params![id, state.as_str()],
            )
            .map_err(|e| AppError::Store(format!("set curation state on {id}: {e}")))?;
        if n == 0 {
            return Err(AppError::NotFound(format!("message {id}")));
        }
        Ok(())
    }

    /// Bot messages carrying `verdict`, most recently flagged first, each with
    /// the closest preceding user message of the same session.
    ///
    /// Messages whose curation has reached a terminal state are archived and
    /// skipped unless `include_archived` is set.
    pub fn list_flagged(
        &self,
        verdict: Feedback,
        include_archived: bool,
    ) -> Result<Vec<FlaggedMessage>, AppError> {
        let archived: Vec<&str> = CurationState::ARCHIVED.iter().map(|s| s.as_str()).collect();
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT m.id, m.session_id, m.role, m.content, m.feedback, m.feedback_at,
                        m.curation_state, m.created_at,
                        (SELECT u.content FROM chat_messages u
                         WHERE u.session_id = m.session_id AND u.role = 'user' AND u.seq < m.seq
                         ORDER BY u.seq DESC LIMIT 1)
                 FROM chat_messages m
                 WHERE m.role = 'bot' AND m.feedback = ?1
                   AND (?2 = 1 OR m.curation_state IS NULL
                        OR m.curation_state NOT IN (?3, ?4, ?5))
                 ORDER BY m.feedback_at DESC, m.seq DESC",
            )
            .map_err(|e| AppError::Store(format!("prepare list_flagged: {e}")))?;
        let rows = stmt
            .query_map(
                params![verdict.as_str(), include_archived, archived[0], archived[1], archived[2]],
                |row| {
                    Ok(FlaggedMessage { message: message_from_row(row)?, question: row.get(8)? })
                },
            )
            .map_err(|e| AppError::Store(format!("query list_flagged: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| AppError::Store(format!("map list_flagged row: {e}")))?);
        }
        Ok(out)
    }

    pub fn delete_message(&self, id: &str) -> Result<(), AppError> {
        let conn = self.conn()?;
        let n = conn
            .execute("DELETE FROM chat_messages WHERE id = ?1", params![id])
            .map_err(|e| AppError::Store(format!("delete message {id}: {e}")))?;
        if n == 0 {
            return Err(AppError::NotFound(format!("message {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::temp_store;
    use super::*;

    #[test]
    fn messages_keep_insertion_order() {
        let (_dir, store) = temp_store();
        store.ensure_session("s1").unwrap();
        store.append_message("s1", MessageRole::User, "Hallo").unwrap();
        store.append_message("s1", MessageRole::Bot, "Hoi, fijn dat je er bent.").unwrap();
        store.append_message("s1", MessageRole::User, "Ik mis mijn moeder.").unwrap();

        let all = store.list_messages("s1").unwrap();
        let texts: Vec<&str> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["Hallo", "Hoi, fijn dat je er bent.", "Ik mis mijn moeder."]);

        let last = store.last_messages("s1", 2).unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].role, MessageRole::Bot);
        assert_eq!(last[1].content, "Ik mis mijn moeder.");
    }

    #[test]
    fn ensure_session_is_idempotent() {
        let (_dir, store) = temp_store();
        store.ensure_session("abc").unwrap();
        store.ensure_session("abc").unwrap();
        assert!(matches!(store.ensure_session(" "), Err(AppError::Validation { .. })));
    }

    #[test]
    fn append_to_unknown_session_fails() {
        let (_dir, store) = temp_store();
        assert!(store.append_message("missing", MessageRole::User, "hoi").is_err());
    }

    #[test]
    fn flagged_listing_includes_question() {
        let (_dir, store) = temp_store();
        let session = store.create_session().unwrap();
        store.append_message(&session.id, MessageRole::User, "Hoe reset ik mijn wachtwoord?").unwrap();
        let bot = store.append_message(&session.id, MessageRole::Bot, "Geen idee.").unwrap();

        store
            .set_feedback(&bot.id, Feedback::NotHelpful, Some(CurationState::Flagged))
            .unwrap();
        let flagged = store.list_flagged(Feedback::NotHelpful, false).unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].question.as_deref(), Some("Hoe reset ik mijn wachtwoord?"));
        assert_eq!(flagged[0].message.curation_state, Some(CurationState::Flagged));
        assert!(store.list_flagged(Feedback::Helpful, false).unwrap().is_empty());
    }

    #[test]
    fn handled_messages_are_archived() {
        let (_dir, store) = temp_store();
        let session = store.create_session().unwrap();
        let bot = store.append_message(&session.id, MessageRole::Bot, "Antwoord").unwrap();
        store
            .set_feedback(&bot.id, Feedback::NotHelpful, Some(CurationState::Flagged))
            .unwrap();
        store.set_curation_state(&bot.id, CurationState::Handled).unwrap();

        assert!(store.list_flagged(Feedback::NotHelpful, false).unwrap().is_empty());
        assert_eq!(store.list_flagged(Feedback::NotHelpful, true).unwrap().len(), 1);
    }

    #[test]
    fn delete_message_removes_row() {
        let (_dir, store) = temp_store();
        let session = store.create_session().unwrap();
        let msg = store.append_message(&session.id, MessageRole::Bot, "weg").unwrap();
        store.delete_message(&msg.id).unwrap();
        assert!(matches!(store.get_message(&msg.id), Err(AppError::NotFound(_))));
        assert!(matches!(store.delete_message(&msg.id), Err(AppError::NotFound(_))));
    }
}
