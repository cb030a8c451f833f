//! Application-wide error types.

use thiserror::Error;

use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(String),

    /// A required field is missing or out of range on a write. Carries the
    /// field name so operator UIs can point at it.
    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited")]
    RateLimited,

    /// The external generation call failed. Retryable; nothing was persisted
    /// for the bot side of the exchange.
    #[error("generation error: {0}")]
    Generation(String),

    /// Document ingestion recovered no usable text. The document is not stored.
    #[error("extraction error: {0}")]
    Extraction(String),

    #[error("invalid curation transition: {0}")]
    InvalidTransition(String),

    #[error("http error: {0}")]
    Http(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation { field: field.to_string(), message: message.into() }
    }

    /// `true` when the caller may simply try the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Generation(_) | AppError::RateLimited)
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        AppError::Generation(e.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn validation_error_names_field() {
        let e = AppError::validation("answer", "must not be empty");
        let msg = e.to_string();
        assert!(msg.contains("answer"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn provider_error_becomes_generation() {
        let e: AppError = ProviderError::Request("HTTP 503".into()).into();
        assert!(matches!(e, AppError::Generation(_)));
        assert!(e.is_retryable());
    }

    #[test]
    fn store_error_is_not_retryable() {
        assert!(!AppError::Store("locked".into()).is_retryable());
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }
}
