use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        Json, Sse,
    },
};
use funnel_core::poll;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use super::{api_error, ApiError};
use crate::state::AppState;

/// SSE endpoint: streams BoardEvent as JSON to connected clients.
pub async fn sse_events(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let json = serde_json::to_string(&event).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let actual_port = state.live_port.lock().map(|p| *p).unwrap_or(state.port);
    let (pipeline_id, synced) = {
        let board = state.board();
        (board.pipeline_id().to_string(), board.is_synced())
    };
    Json(serde_json::json!({
        "status": "running",
        "port": actual_port,
        "bind_address": state.bind_address,
        "pipelineId": pipeline_id,
        "synced": synced,
        "localOnly": state.local_only,
    }))
}

pub async fn list_logs() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "entries": crate::log_bridge::recent_entries(),
        "filePath": crate::log_bridge::log_file_path(),
    }))
}

pub async fn stream_logs() -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = crate::log_bridge::subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|item| {
        let entry = match item {
            Ok(entry) => entry,
            Err(_) => return None,
        };
        let payload = match serde_json::to_string(&entry) {
            Ok(payload) => payload,
            Err(_) => return None,
        };
        Some(Ok(Event::default().data(payload)))
    });
    Sse::new(stream)
}

/// Last count published by the background poller.
pub async fn unread_count(State(state): State<AppState>) -> Json<serde_json::Value> {
    let count = *state.unread.borrow();
    Json(serde_json::json!({ "count": count }))
}

pub async fn mark_read(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = poll::mark_notifications_read(state.remote.as_ref(), &state.user_id)
        .await
        .map_err(|e| {
            api_error(
                StatusCode::BAD_GATEWAY,
                "funnel.api.mark_read",
                format!("Failed to mark notifications read: {}", e),
            )
        })?;
    let _ = state
        .event_tx
        .send(crate::state::BoardEvent::UnreadCount { count: 0 });
    Ok(Json(serde_json::json!({ "updated": updated })))
}
