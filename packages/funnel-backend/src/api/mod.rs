use axum::{
    http::StatusCode,
    response::Json,
    routing::{get, patch, post, put},
    Router,
};
use funnel_core::board::BoardError;
use serde::Serialize;

mod board;
mod cards;
mod events;

use crate::state::AppState;

/// Axum REST API routes.
///
///   GET    /status                               -> health check
///   GET    /board                                -> full board snapshot
///   POST   /board/drag                           -> apply a drop result
///   POST   /stages                               -> add stage
///   PATCH  /stages/:stageId                      -> rename / recolor stage
///   DELETE /stages/:stageId                      -> delete stage
///   PUT    /stages/order                         -> reorder stages
///   POST   /stages/:stageId/sections             -> add section
///   PATCH  /stages/:stageId/sections/:sectionId  -> edit section
///   DELETE /stages/:stageId/sections/:sectionId  -> delete section
///   PUT    /stages/:stageId/sections/order       -> reorder sections
///   POST   /cards                                -> save a draft card
///   PATCH  /cards/:cardId                        -> generic card update
///   DELETE /cards/:cardId                        -> delete card
///   POST   /cards/:cardId/{take,assignee,stage,tier,phase,notes}
///   GET    /notifications/unread                 -> unread count
///   POST   /notifications/read                   -> mark all read
///   GET    /events                               -> SSE stream of board events
///   GET    /logs, /logs/stream                   -> backend log entries
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(events::status))
        .route("/board", get(board::get_board))
        .route("/board/drag", post(board::apply_drag))
        .route("/stages", post(board::add_stage))
        .route("/stages/order", put(board::reorder_stages))
        .route(
            "/stages/{stage_id}",
            patch(board::edit_stage).delete(board::delete_stage),
        )
        .route("/stages/{stage_id}/sections", post(board::add_section))
        .route(
            "/stages/{stage_id}/sections/order",
            put(board::reorder_sections),
        )
        .route(
            "/stages/{stage_id}/sections/{section_id}",
            patch(board::edit_section).delete(board::delete_section),
        )
        .route("/cards", post(cards::create_card))
        .route(
            "/cards/{card_id}",
            patch(cards::update_card).delete(cards::delete_card),
        )
        .route("/cards/{card_id}/take", post(cards::take_card))
        .route("/cards/{card_id}/assignee", post(cards::change_assignee))
        .route("/cards/{card_id}/stage", post(cards::change_stage))
        .route("/cards/{card_id}/tier", post(cards::change_tier))
        .route("/cards/{card_id}/phase", post(cards::change_activity_phase))
        .route("/cards/{card_id}/notes", post(cards::add_note))
        .route("/notifications/unread", get(events::unread_count))
        .route("/notifications/read", post(events::mark_read))
        .route("/events", get(events::sse_events))
        .route("/logs", get(events::list_logs))
        .route("/logs/stream", get(events::stream_logs))
}

// ── Shared types and helpers used across sub-modules ────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn log_api_issue(status: StatusCode, target: &'static str, message: impl AsRef<str>) {
    let message = message.as_ref();
    if status.is_server_error() {
        log::error!(target: target, "{}", message);
    } else {
        log::warn!(target: target, "{}", message);
    }
}

fn api_error(status: StatusCode, target: &'static str, error: String) -> ApiError {
    log_api_issue(status, target, &error);
    (status, Json(ErrorResponse { error }))
}

fn not_found(target: &'static str, what: &str, id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, target, format!("{} not found: {}", what, id))
}

fn unauthenticated(target: &'static str) -> ApiError {
    api_error(
        StatusCode::UNAUTHORIZED,
        target,
        BoardError::Unauthenticated.to_string(),
    )
}

fn board_error_status(error: &BoardError) -> StatusCode {
    match error {
        BoardError::MissingClientName
        | BoardError::UnknownStage(_)
        | BoardError::DuplicateCard(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BoardError::Unauthenticated => StatusCode::UNAUTHORIZED,
        BoardError::Remote(_) => StatusCode::BAD_GATEWAY,
    }
}
