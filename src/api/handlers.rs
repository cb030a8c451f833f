//! Axum handlers for `/api/*` routes.
//!
//! Handlers receive the [`BotService`] via [`State`] and return a JSON
//! [`Response`]. Every error goes through [`error_response`], which picks
//! the status code from the [`AppError`] variant.

use std::collections::BTreeSet;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::curation::CurationSuggestion;
use crate::error::AppError;
use crate::retrieval::MatchHints;
use crate::service::BotService;
use crate::store::{EntryFilter, Feedback, KnowledgeUpdate, NewKnowledgeEntry};

const DEFAULT_GROUP_LIMIT: usize = 50;

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct ChatRequest {
    message: String,
}

#[derive(Deserialize)]
pub(super) struct FeedbackRequest {
    verdict: Feedback,
}

#[derive(Deserialize)]
pub(super) struct PreviewRequest {
    utterance: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tags: BTreeSet<String>,
}

#[derive(Deserialize)]
pub(super) struct FlaggedQuery {
    #[serde(default)]
    verdict: Option<Feedback>,
    #[serde(default)]
    include_archived: bool,
}

#[derive(Deserialize)]
pub(super) struct DuplicatesRequest {
    category: String,
    question: String,
    #[serde(default)]
    exclude_id: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct LimitQuery {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
pub(super) struct KeyRequest {
    key: String,
}

#[derive(Deserialize)]
pub(super) struct ConvertRequest {
    key: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    category: String,
}

#[derive(Deserialize)]
pub(super) struct SettingsRequest {
    #[serde(default)]
    knowledge: Option<String>,
    #[serde(default)]
    rules: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct UrlRequest {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct PdfQuery {
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
pub(super) struct ToggleRequest {
    is_active: bool,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

pub(super) fn status_for(e: &AppError) -> StatusCode {
    match e {
        AppError::Validation { .. } => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AppError::Generation(_) => StatusCode::BAD_GATEWAY,
        AppError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::InvalidTransition(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: AppError) -> Response {
    let status = status_for(&e);
    if status.is_server_error() {
        warn!(status = status.as_u16(), error = %e, "api: request failed");
    }
    let body = match &e {
        AppError::Validation { field, message } => Json(json!({
            "error": "validation",
            "field": field,
            "message": message,
        })),
        AppError::NotFound(_) => json_error("not_found", &e),
        AppError::RateLimited => json_error("rate_limited", &e),
        AppError::Generation(_) => json_error("generation", &e),
        AppError::Extraction(_) => json_error("extraction", &e),
        AppError::InvalidTransition(_) => json_error("invalid_transition", &e),
        _ => json_error("internal", &e),
    };
    (status, body).into_response()
}

fn respond<T: Serialize>(result: Result<T, AppError>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => error_response(e),
    }
}

fn created<T: Serialize>(result: Result<T, AppError>) -> Response {
    match result {
        Ok(value) => (StatusCode::CREATED, Json(value)).into_response(),
        Err(e) => error_response(e),
    }
}

fn no_content(result: Result<(), AppError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

// ── Chat ──────────────────────────────────────────────────────────────────────

/// GET /api/health
pub(super) async fn health(State(service): State<BotService>) -> Response {
    let entries = service.store().blocking("health", |s| s.count_active_entries()).await;
    match entries {
        Ok(n) => Json(json!({
            "status": "ok",
            "provider": service.provider_name(),
            "active_entries": n,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/sessions
pub(super) async fn create_session(State(service): State<BotService>) -> Response {
    created(service.create_session().await)
}

/// GET /api/sessions/{session_id}/messages
pub(super) async fn session_messages(
    State(service): State<BotService>,
    Path(session_id): Path<String>,
) -> Response {
    respond(service.session_messages(&session_id).await)
}

/// POST /api/sessions/{session_id}/messages
pub(super) async fn chat(
    State(service): State<BotService>,
    Path(session_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Response {
    respond(service.match_and_respond(&session_id, &req.message).await)
}

/// POST /api/messages/{message_id}/feedback
pub(super) async fn feedback(
    State(service): State<BotService>,
    Path(message_id): Path<String>,
    Json(req): Json<FeedbackRequest>,
) -> Response {
    respond(service.flag_message(&message_id, req.verdict).await)
}

/// POST /api/match/preview
pub(super) async fn preview_match(
    State(service): State<BotService>,
    Json(req): Json<PreviewRequest>,
) -> Response {
    let hints = MatchHints { category: req.category, tags: req.tags };
    respond(service.preview_match(&req.utterance, hints).await)
}

// ── Curation ──────────────────────────────────────────────────────────────────

/// GET /api/curation/flagged?verdict=not_helpful&include_archived=false
pub(super) async fn list_flagged(
    State(service): State<BotService>,
    Query(q): Query<FlaggedQuery>,
) -> Response {
    let verdict = q.verdict.unwrap_or(Feedback::NotHelpful);
    respond(service.list_flagged(verdict, q.include_archived).await)
}

/// GET /api/curation/good-examples
pub(super) async fn good_examples(State(service): State<BotService>) -> Response {
    respond(service.good_examples().await)
}

/// POST /api/curation/{message_id}/analyze
pub(super) async fn analyze(
    State(service): State<BotService>,
    Path(message_id): Path<String>,
) -> Response {
    respond(service.analyze_flagged_message(&message_id).await)
}

/// POST /api/curation/commit
pub(super) async fn commit(
    State(service): State<BotService>,
    Json(suggestion): Json<CurationSuggestion>,
) -> Response {
    respond(service.commit_suggestion(suggestion).await)
}

/// POST /api/curation/duplicates
pub(super) async fn preview_duplicates(
    State(service): State<BotService>,
    Json(req): Json<DuplicatesRequest>,
) -> Response {
    respond(service.preview_duplicates(&req.category, &req.question, req.exclude_id).await)
}

/// POST /api/curation/{message_id}/discard
pub(super) async fn discard(
    State(service): State<BotService>,
    Path(message_id): Path<String>,
) -> Response {
    respond(service.discard_suggestion(&message_id).await.map(|state| json!({ "state": state })))
}

/// POST /api/curation/{message_id}/handled
pub(super) async fn mark_handled(
    State(service): State<BotService>,
    Path(message_id): Path<String>,
) -> Response {
    respond(service.mark_handled(&message_id).await.map(|state| json!({ "state": state })))
}

/// DELETE /api/curation/{message_id}
pub(super) async fn delete_flagged(
    State(service): State<BotService>,
    Path(message_id): Path<String>,
) -> Response {
    no_content(service.delete_flagged(&message_id).await)
}

// ── Unanswered ────────────────────────────────────────────────────────────────

/// GET /api/unanswered?limit=
pub(super) async fn unanswered_groups(
    State(service): State<BotService>,
    Query(q): Query<LimitQuery>,
) -> Response {
    respond(service.list_unanswered_groups(q.limit.unwrap_or(DEFAULT_GROUP_LIMIT)).await)
}

/// GET /api/unanswered/draft?key=
pub(super) async fn draft_from_group(
    State(service): State<BotService>,
    Query(q): Query<KeyRequest>,
) -> Response {
    respond(service.draft_from_group(&q.key).await)
}

/// POST /api/unanswered/dismiss
pub(super) async fn dismiss_group(
    State(service): State<BotService>,
    Json(req): Json<KeyRequest>,
) -> Response {
    respond(service.dismiss_unanswered_group(&req.key).await.map(|n| json!({ "deleted": n })))
}

/// POST /api/unanswered/convert
pub(super) async fn convert_group(
    State(service): State<BotService>,
    Json(req): Json<ConvertRequest>,
) -> Response {
    created(service.convert_group(&req.key, &req.answer, &req.category).await)
}

// ── Knowledge ─────────────────────────────────────────────────────────────────

/// GET /api/knowledge?active_only=&category=
pub(super) async fn list_entries(
    State(service): State<BotService>,
    Query(filter): Query<EntryFilter>,
) -> Response {
    respond(service.list_entries(filter).await)
}

/// POST /api/knowledge
pub(super) async fn create_entry(
    State(service): State<BotService>,
    Json(new): Json<NewKnowledgeEntry>,
) -> Response {
    created(service.create_entry(new).await)
}

/// GET /api/knowledge/{entry_id}
pub(super) async fn get_entry(
    State(service): State<BotService>,
    Path(entry_id): Path<String>,
) -> Response {
    respond(service.get_entry(&entry_id).await)
}

/// PATCH /api/knowledge/{entry_id}
pub(super) async fn update_entry(
    State(service): State<BotService>,
    Path(entry_id): Path<String>,
    Json(update): Json<KnowledgeUpdate>,
) -> Response {
    respond(service.update_entry(&entry_id, update).await)
}

/// DELETE /api/knowledge/{entry_id}
pub(super) async fn delete_entry(
    State(service): State<BotService>,
    Path(entry_id): Path<String>,
) -> Response {
    no_content(service.delete_entry(&entry_id).await)
}

/// POST /api/knowledge/{entry_id}/phrasings
pub(super) async fn generate_phrasings(
    State(service): State<BotService>,
    Path(entry_id): Path<String>,
) -> Response {
    respond(service.generate_alternative_phrasings(&entry_id).await)
}

// ── Settings ──────────────────────────────────────────────────────────────────

/// GET /api/settings
pub(super) async fn get_settings(State(service): State<BotService>) -> Response {
    respond(service.get_settings().await)
}

/// PUT /api/settings
pub(super) async fn update_settings(
    State(service): State<BotService>,
    Json(req): Json<SettingsRequest>,
) -> Response {
    respond(service.update_settings(req.knowledge, req.rules).await)
}

// ── Sources ───────────────────────────────────────────────────────────────────

/// GET /api/sources
pub(super) async fn list_sources(State(service): State<BotService>) -> Response {
    respond(service.list_sources().await)
}

/// POST /api/sources/url
pub(super) async fn ingest_url(
    State(service): State<BotService>,
    Json(req): Json<UrlRequest>,
) -> Response {
    created(service.ingest_url(&req.url, req.title).await)
}

/// POST /api/sources/pdf?title= with the PDF as the request body.
pub(super) async fn ingest_pdf(
    State(service): State<BotService>,
    Query(q): Query<PdfQuery>,
    body: Bytes,
) -> Response {
    created(service.ingest_pdf(&q.title, body.to_vec()).await)
}

/// PATCH /api/sources/{source_id}
pub(super) async fn toggle_source(
    State(service): State<BotService>,
    Path(source_id): Path<String>,
    Json(req): Json<ToggleRequest>,
) -> Response {
    respond(service.set_source_active(&source_id, req.is_active).await)
}

/// DELETE /api/sources/{source_id}
pub(super) async fn delete_source(
    State(service): State<BotService>,
    Path(source_id): Path<String>,
) -> Response {
    respond(service.delete_source(&source_id).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(&AppError::validation("answer", "x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AppError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&AppError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(&AppError::Generation("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&AppError::Extraction("x".into())), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(&AppError::Store("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
