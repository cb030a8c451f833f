//! Source corpus: long-form text extracted from fetched pages and uploaded PDFs.

use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppError;

use super::{Store, new_id, now_iso8601};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Url,
    Pdf,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Url => "url",
            SourceKind::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub title: String,
    pub kind: SourceKind,
    /// The fetched URL, or the stored file name for uploads.
    pub origin: String,
    pub extracted_text: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSourceDocument {
    /// Pre-allocated so uploaded files can be named after the record.
    pub id: Option<String>,
    pub title: String,
    pub kind: SourceKind,
    pub origin: String,
    pub extracted_text: String,
}

const SOURCE_COLUMNS: &str =
    "id, title, kind, origin, extracted_text, is_active, created_at, updated_at";

fn source_from_row(row: &Row<'_>) -> rusqlite::Result<SourceDocument> {
    let kind: String = row.get(2)?;
    Ok(SourceDocument {
        id: row.get(0)?,
        title: row.get(1)?,
        kind: if kind == "pdf" { SourceKind::Pdf } else { SourceKind::Url },
        origin: row.get(3)?,
        extracted_text: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl Store {
    pub fn insert_source(&self, new: NewSourceDocument) -> Result<SourceDocument, AppError> {
        if new.title.trim().is_empty() {
            return Err(AppError::validation("title", "must not be empty"));
        }
        let now = now_iso8601();
        let doc = SourceDocument {
            id: new.id.unwrap_or_else(new_id),
            title: new.title.trim().to_string(),
            kind: new.kind,
            origin: new.origin,
            extracted_text: new.extracted_text,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        };
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO source_documents ({SOURCE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                doc.id,
                doc.title,
                doc.kind.as_str(),
                doc.origin,
                doc.extracted_text,
                doc.is_active,
                doc.created_at,
                doc.updated_at,
            ],
        )
        .map_err(|e| AppError::Store(format!("insert source document: {e}")))?;
        Ok(doc)
    }

    pub fn get_source(&self, id: &str) -> Result<SourceDocument, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {SOURCE_COLUMNS} FROM source_documents WHERE id = ?1"))
            .map_err(|e| AppError::Store(format!("prepare get_source: {e}")))?;
        let mut rows = stmt
            .query_map(params![id], source_from_row)
            .map_err(|e| AppError::Store(format!("query get_source: {e}")))?;
        match rows.next() {
            Some(row) => row.map_err(|e| AppError::Store(format!("map source {id}: {e}"))),
            None => Err(AppError::NotFound(format!("source document {id}"))),
        }
    }

    fn query_sources(&self, active_only: bool) -> Result<Vec<SourceDocument>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SOURCE_COLUMNS} FROM source_documents
                 WHERE (?1 = 0 OR is_active = 1) ORDER BY created_at DESC"
            ))
            .map_err(|e| AppError::Store(format!("prepare list_sources: {e}")))?;
        let rows = stmt
            .query_map(params![active_only], source_from_row)
            .map_err(|e| AppError::Store(format!("query list_sources: {e}")))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| AppError::Store(format!("map source row: {e}")))?);
        }
        Ok(out)
    }

    /// All documents, newest first.
    pub fn list_sources(&self) -> Result<Vec<SourceDocument>, AppError> {
        self.query_sources(false)
    }

    pub fn list_active_sources(&self) -> Result<Vec<SourceDocument>, AppError> {
        self.query_sources(true)
    }

    pub fn set_source_active(&self, id: &str, active: bool) -> Result<SourceDocument, AppError> {
        let conn = self.conn()?;
        let n = conn
            .execute(
                "UPDATE source_documents SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, active, now_iso8601()],
            )
            .map_err(|e| AppError::Store(format!("toggle source {id}: {e}")))?;
        if n == 0 {
            return Err(AppError::NotFound(format!("source document {id}")));
        }
        drop(conn);
        self.get_source(id)
    }

    /// Path an uploaded PDF for `id` is stored at.
    pub fn source_file_path(&self, id: &str) -> std::path::PathBuf {
        self.files_dir().join(format!("{id}.pdf"))
    }

    /// Remove the record and, for uploads, the stored file. A file that is
    /// already gone is not an error.
    pub fn delete_source(&self, id: &str) -> Result<SourceDocument, AppError> {
        let doc = self.get_source(id)?;
        let conn = self.conn()?;
        conn.execute("DELETE FROM source_documents WHERE id = ?1", params![id])
            .map_err(|e| AppError::Store(format!("delete source {id}: {e}")))?;

        if doc.kind == SourceKind::Pdf {
            let path = self.source_file_path(id);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove stored source file"),
            }
        }
        Ok(doc)
    }
}
