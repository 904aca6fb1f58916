/// Shared application state passed to axum handlers.
use funnel_core::board::BoardStore;
use funnel_core::storage::RemoteStore;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};

/// Pushed to `/events` subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BoardEvent {
    #[serde(rename_all = "camelCase")]
    BoardChanged { pipeline_id: String },
    UnreadCount { count: usize },
}

#[derive(Clone)]
pub struct AppState {
    pub board: Arc<Mutex<BoardStore>>,
    pub remote: Arc<dyn RemoteStore>,
    pub event_tx: broadcast::Sender<BoardEvent>,
    pub unread: watch::Receiver<usize>,
    /// Acting user id, for notification queries.
    pub user_id: String,
    pub local_only: bool,
    pub port: u16,
    pub bind_address: String,
    pub live_port: Arc<Mutex<u16>>,
}

impl AppState {
    /// Lock the board. Never hold the guard across an await.
    pub fn board(&self) -> MutexGuard<'_, BoardStore> {
        self.board.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn board_changed(&self, pipeline_id: &str) {
        let _ = self.event_tx.send(BoardEvent::BoardChanged {
            pipeline_id: pipeline_id.to_string(),
        });
    }
}
