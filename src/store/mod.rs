//! SQLite persistence for the knowledge store, source corpus, bot settings,
//! conversation log and unanswered-question rows.
//!
//! ## Storage layout
//! ```text
//! {work_dir}/
//! ├── rouw.db          # all record types, one table each
//! └── sources/         # uploaded PDFs, named {source_id}.pdf
//! ```
//!
//! Every operation opens its own connection (WAL, busy timeout) and is
//! blocking. Async callers wrap calls in [`Store::blocking`], which moves
//! them onto the blocking pool.

mod chat;
mod knowledge;
mod schema;
mod settings;
mod sources;
mod unanswered;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::AppError;

pub use chat::{ChatMessage, ChatSession, Feedback, FlaggedMessage, MessageRole};
pub use knowledge::{EntryFilter, KnowledgeEntry, KnowledgeUpdate, NewKnowledgeEntry};
pub use settings::{BotSettings, RulesUpdate};
pub use sources::{NewSourceDocument, SourceDocument, SourceKind};
pub use unanswered::UnansweredQuestion;

/// Handle to the on-disk store. Cheap to clone; holds paths only.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
    files_dir: PathBuf,
}

impl Store {
    /// Open (creating if needed) the database at `db_path` and the directory
    /// for stored source files, then bring the schema up to date.
    pub fn open(db_path: &Path, files_dir: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        fs::create_dir_all(files_dir).map_err(|e| {
            AppError::Store(format!("cannot create {}: {e}", files_dir.display()))
        })?;

        let store = Self { db_path: db_path.to_path_buf(), files_dir: files_dir.to_path_buf() };
        let conn = store.conn()?;
        schema::migrate(&conn)?;
        Ok(store)
    }

    /// Open the store inside `work_dir` using the standard file names.
    pub fn open_in(work_dir: &Path) -> Result<Self, AppError> {
        Self::open(&work_dir.join("rouw.db"), &work_dir.join("sources"))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Directory where uploaded source files are kept.
    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    /// Open a connection and apply the standard pragmas.
    ///
    /// - `journal_mode = WAL`: readers proceed alongside a writer.
    /// - `foreign_keys = ON`
    /// - `busy_timeout = 5000`: wait up to 5 s before `SQLITE_BUSY`.
    pub(crate) fn conn(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.db_path).map_err(|e| {
            AppError::Store(format!("open {}: {e}", self.db_path.display()))
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| AppError::Store(format!("set journal_mode WAL: {e}")))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| AppError::Store(format!("set foreign_keys ON: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Store(format!("set busy_timeout: {e}")))?;
        Ok(conn)
    }

    /// Run `f` against a clone of this handle on the blocking pool.
    pub async fn blocking<T, F>(&self, what: &'static str, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Store) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| AppError::Store(format!("{what} join: {e}")))?
    }
}

/// Current UTC time as RFC 3339 with millisecond precision, e.g.
/// `"2025-04-01T12:00:00.123Z"`. Fixed width, so strings sort chronologically.
pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Fresh time-ordered identifier (UUID v7).
pub(crate) fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Serialise a list/set column.
pub(crate) fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| AppError::Store(format!("serialize {what}: {e}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Store;
    use tempfile::TempDir;

    /// Fresh store in a temp dir. Keep the `TempDir` alive for the test.
    pub fn temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().expect("tempdir");
        let store = Store::open_in(dir.path()).expect("open store");
        (dir, store)
    }
}
