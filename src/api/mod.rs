//! Axum HTTP surface for the chat UI and the admin UI.
//!
//! ## URL layout
//!
//! ```text
//! GET    /api/health
//! POST   /api/sessions
//! GET    /api/sessions/{id}/messages
//! POST   /api/sessions/{id}/messages        (one chat turn)
//! POST   /api/messages/{id}/feedback
//! POST   /api/match/preview
//! GET    /api/curation/flagged
//! GET    /api/curation/good-examples
//! POST   /api/curation/commit
//! POST   /api/curation/duplicates
//! POST   /api/curation/{id}/analyze
//! POST   /api/curation/{id}/discard
//! POST   /api/curation/{id}/handled
//! DELETE /api/curation/{id}
//! GET    /api/unanswered
//! GET    /api/unanswered/draft?key=
//! POST   /api/unanswered/dismiss
//! POST   /api/unanswered/convert
//! GET    /api/knowledge                      POST /api/knowledge
//! GET    /api/knowledge/{id}                 PATCH, DELETE
//! POST   /api/knowledge/{id}/phrasings
//! GET    /api/settings                       PUT /api/settings
//! GET    /api/sources
//! POST   /api/sources/url
//! POST   /api/sources/pdf?title=             (raw PDF body)
//! PATCH  /api/sources/{id}                   DELETE /api/sources/{id}
//! ```

mod handlers;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppError;
use crate::service::BotService;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn build_router(service: BotService) -> Router {
    Router::new()
        .route("/api/health",                        get(handlers::health))
        .route("/api/sessions",                      post(handlers::create_session))
        .route("/api/sessions/{session_id}/messages", get(handlers::session_messages).post(handlers::chat))
        .route("/api/messages/{message_id}/feedback", post(handlers::feedback))
        .route("/api/match/preview",                 post(handlers::preview_match))
        .route("/api/curation/flagged",              get(handlers::list_flagged))
        .route("/api/curation/good-examples",        get(handlers::good_examples))
        .route("/api/curation/commit",               post(handlers::commit))
        .route("/api/curation/duplicates",           post(handlers::preview_duplicates))
        .route("/api/curation/{message_id}/analyze", post(handlers::analyze))
        .route("/api/curation/{message_id}/discard", post(handlers::discard))
        .route("/api/curation/{message_id}/handled", post(handlers::mark_handled))
        .route("/api/curation/{message_id}",         axum::routing::delete(handlers::delete_flagged))
        .route("/api/unanswered",                    get(handlers::unanswered_groups))
        .route("/api/unanswered/draft",              get(handlers::draft_from_group))
        .route("/api/unanswered/dismiss",            post(handlers::dismiss_group))
        .route("/api/unanswered/convert",            post(handlers::convert_group))
        .route("/api/knowledge",                     get(handlers::list_entries).post(handlers::create_entry))
        .route(
            "/api/knowledge/{entry_id}",
            get(handlers::get_entry).patch(handlers::update_entry).delete(handlers::delete_entry),
        )
        .route("/api/knowledge/{entry_id}/phrasings", post(handlers::generate_phrasings))
        .route("/api/settings",                      get(handlers::get_settings).put(handlers::update_settings))
        .route("/api/sources",                       get(handlers::list_sources))
        .route("/api/sources/url",                   post(handlers::ingest_url))
        .route(
            "/api/sources/pdf",
            post(handlers::ingest_pdf).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/sources/{source_id}",
            axum::routing::patch(handlers::toggle_source).delete(handlers::delete_source),
        )
        .with_state(service)
}

/// Serve the API on `bind_addr` until `shutdown` is cancelled.
pub async fn serve(bind_addr: &str, service: BotService, shutdown: CancellationToken) -> Result<(), AppError> {
    let router = build_router(service);
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Http(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, "api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Http(format!("server error: {e}")))?;

    info!("api shut down");
    Ok(())
}
