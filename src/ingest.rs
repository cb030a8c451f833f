//! Source-document ingestion: fetch or receive a document, recover its text,
//! store it in the corpus.
//!
//! HTML is converted to Markdown-ish text with `htmd`, PDFs are read with
//! `pdf-extract`. Either way whitespace is collapsed and the text is capped
//! at [`MAX_TEXT_CHARS`]. Documents that yield fewer than
//! [`MIN_TEXT_CHARS`] characters are rejected and nothing is stored.

use std::time::Duration;

use tracing::{info, warn};

use crate::error::AppError;
use crate::store::{NewSourceDocument, SourceDocument, SourceKind, Store, new_id};

pub const MAX_TEXT_CHARS: usize = 100_000;
pub const MIN_TEXT_CHARS: usize = 20;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Collapse all whitespace runs to single spaces and cap the length.
pub fn clean_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(MAX_TEXT_CHARS) {
        Some((cut, _)) => collapsed[..cut].to_string(),
        None => collapsed,
    }
}

/// Clean `raw` and reject it when too little text survives.
pub fn accept_text(raw: &str, what: &str) -> Result<String, AppError> {
    let text = clean_text(raw);
    let n = text.chars().count();
    if n < MIN_TEXT_CHARS {
        return Err(AppError::Extraction(format!(
            "{what}: only {n} characters of text recovered"
        )));
    }
    Ok(text)
}

pub fn html_to_text(html: &str) -> Result<String, AppError> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript", "head"])
        .build();
    converter
        .convert(html)
        .map_err(|e| AppError::Extraction(format!("html conversion: {e}")))
}

pub fn pdf_to_text(bytes: &[u8]) -> Result<String, AppError> {
    if bytes.len() < 5 || &bytes[..4] != b"%PDF" {
        return Err(AppError::Extraction("not a PDF file".into()));
    }
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| AppError::Extraction(format!("pdf extraction: {e}")))
}

/// Contents of the first `<title>` element, if any.
pub fn html_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title>")?;
    let title = clean_text(&html[start..end]);
    (!title.is_empty()).then_some(title)
}

async fn pdf_to_text_blocking(bytes: Vec<u8>) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || pdf_to_text(&bytes))
        .await
        .map_err(|e| AppError::Extraction(format!("pdf extraction aborted: {e}")))?
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    client: reqwest::Client,
}

impl Ingestor {
    pub fn new() -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("rouw-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Http(format!("build http client: {e}")))?;
        Ok(Self { client })
    }

    /// Fetch `url` and store its text. `title` defaults to the page's
    /// `<title>`, then to the URL itself.
    pub async fn ingest_url(
        &self,
        store: &Store,
        url: &str,
        title: Option<String>,
    ) -> Result<SourceDocument, AppError> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AppError::validation("url", "must start with http:// or https://"));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Extraction(format!("fetch {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Extraction(format!("fetch {url}: HTTP {}", status.as_u16())));
        }
        let is_pdf = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/pdf"));

        let (raw, page_title) = if is_pdf {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| AppError::Extraction(format!("read {url}: {e}")))?;
            (pdf_to_text_blocking(bytes.to_vec()).await?, None)
        } else {
            let html = response
                .text()
                .await
                .map_err(|e| AppError::Extraction(format!("read {url}: {e}")))?;
            (html_to_text(&html)?, html_title(&html))
        };
        let text = accept_text(&raw, url)?;

        let title = title
            .filter(|t| !t.trim().is_empty())
            .or(page_title)
            .unwrap_or_else(|| url.to_string());
        let new = NewSourceDocument {
            id: None,
            title,
            kind: SourceKind::Url,
            origin: url.to_string(),
            extracted_text: text,
        };
        let doc = store.blocking("insert source", move |s| s.insert_source(new)).await?;
        info!(source_id = %doc.id, url, chars = doc.extracted_text.chars().count(), "ingest: url stored");
        Ok(doc)
    }

    /// Extract an uploaded PDF, keep the file under the store's files
    /// directory and record it.
    pub async fn ingest_pdf(
        &self,
        store: &Store,
        title: &str,
        bytes: Vec<u8>,
    ) -> Result<SourceDocument, AppError> {
        if title.trim().is_empty() {
            return Err(AppError::validation("title", "must not be empty"));
        }
        let text = accept_text(&pdf_to_text_blocking(bytes.clone()).await?, title)?;

        let id = new_id();
        let path = store.source_file_path(&id);
        tokio::fs::write(&path, &bytes).await?;

        let new = NewSourceDocument {
            id: Some(id.clone()),
            title: title.to_string(),
            kind: SourceKind::Pdf,
            origin: format!("{id}.pdf"),
            extracted_text: text,
        };
        match store.blocking("insert source", move |s| s.insert_source(new)).await {
            Ok(doc) => {
                info!(source_id = %doc.id, bytes = bytes.len(), "ingest: pdf stored");
                Ok(doc)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %rm, "ingest: orphaned upload left behind");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;

    #[test]
    fn clean_collapses_and_caps() {
        assert_eq!(clean_text("  een\n\n twee\tdrie  "), "een twee drie");
        let long = "x".repeat(MAX_TEXT_CHARS + 50);
        assert_eq!(clean_text(&long).chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn short_text_is_extraction_error() {
        assert!(matches!(accept_text("   kort   ", "doc"), Err(AppError::Extraction(_))));
        assert!(accept_text("Dit is ruim genoeg tekst om op te slaan.", "doc").is_ok());
    }

    #[test]
    fn html_skips_scripts() {
        let html = "<html><head><title>Over rouw</title><style>p{}</style></head>\
                    <body><script>alert(1)</script><p>Rouw is <b>normaal</b>.</p></body></html>";
        let text = html_to_text(html).unwrap();
        assert!(text.contains("Rouw is"));
        assert!(!text.contains("alert"));
        assert_eq!(html_title(html).as_deref(), Some("Over rouw"));
    }

    #[test]
    fn non_pdf_bytes_rejected() {
        assert!(matches!(pdf_to_text(b"hello world"), Err(AppError::Extraction(_))));
    }

    #[tokio::test]
    async fn bad_upload_stores_nothing() {
        let (_dir, store) = temp_store();
        let ingestor = Ingestor::new().unwrap();
        let err = ingestor.ingest_pdf(&store, "Folder", b"not a pdf".to_vec()).await.unwrap_err();
        assert!(matches!(err, AppError::Extraction(_)));
        assert!(store.list_sources().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(store.files_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn url_scheme_validated() {
        let (_dir, store) = temp_store();
        let err = Ingestor::new().unwrap().ingest_url(&store, "ftp://x", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
