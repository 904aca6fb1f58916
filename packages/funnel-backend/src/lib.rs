/// Funnel backend: config loading, remote store selection, board session,
/// notification polling and the HTTP server.
pub mod api;
mod config;
mod local_state;
mod log_bridge;
pub mod rest_store;
mod server;
pub mod state;

use crate::state::{AppState, BoardEvent};
use funnel_core::board::BoardStore;
use funnel_core::poll::UnreadPoller;
use funnel_core::session::{
    PipelineResolver, Session, SlugResolver, StaticAuth, StorePipelineResolver,
};
use funnel_core::storage::memory::MemoryStore;
use funnel_core::storage::RemoteStore;
use funnel_core::types::BoardState;
use std::sync::{Arc, Mutex};

const DEFAULT_PIPELINE: &str = "default";

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = log_bridge::init() {
        log_bridge::write_fallback_line(&format!("failed to initialize backend logger: {}", e));
    }

    let config = config::load_config(&config::default_config_path());
    let identity = config::load_or_create_identity(&config::default_identity_path())?;
    let member = identity.member();
    log::info!(
        "[funnel.backend] Acting as {} ({}){}",
        member.name,
        member.id,
        if member.is_manager() { ", manager" } else { "" }
    );

    let remote: Arc<dyn RemoteStore>;
    let resolver: Arc<dyn PipelineResolver>;
    let store_url = config.store_url.as_deref().filter(|url| !url.trim().is_empty());
    match store_url {
        Some(url) => {
            log::info!("[funnel.backend] Using record store at {}", url);
            remote = Arc::new(rest_store::RestStore::new(url, config.store_token.clone()));
            resolver = Arc::new(StorePipelineResolver::new(remote.clone()));
        }
        None => {
            log::warn!("[funnel.backend] No store configured, board changes stay in memory");
            remote = Arc::new(MemoryStore::new());
            resolver = Arc::new(SlugResolver);
        }
    }
    let local_only = store_url.is_none();

    let ui_state_path = local_state::default_ui_state_path();
    let slug = config
        .pipeline
        .clone()
        .or_else(|| local_state::load(&ui_state_path).last_pipeline)
        .unwrap_or_else(|| DEFAULT_PIPELINE.to_string());
    local_state::remember_pipeline(&ui_state_path, &slug);

    let session = Session::new(remote.clone(), Arc::new(StaticAuth(Some(member.clone()))), resolver);
    let board = session.open_board(&slug).await;
    log::info!(
        "[funnel.backend] Opened pipeline '{}' ({} stages, {} cards)",
        slug,
        board.state().stages.len(),
        board.state().cards.len()
    );

    let poller = UnreadPoller::spawn(remote.clone(), member.id.clone(), config.poll_interval());
    let (event_tx, _) = tokio::sync::broadcast::channel::<BoardEvent>(256);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Forward poller updates to SSE subscribers
    let mut unread_rx = poller.subscribe();
    let mut forward_shutdown = shutdown_rx.clone();
    let forward_tx = event_tx.clone();
    let forward = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = unread_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let count = *unread_rx.borrow_and_update();
                    let _ = forward_tx.send(BoardEvent::UnreadCount { count });
                }
                _ = forward_shutdown.changed() => break,
            }
        }
    });

    let board = Arc::new(Mutex::new(board));
    let state = AppState {
        board: board.clone(),
        remote,
        event_tx,
        unread: poller.subscribe(),
        user_id: member.id.clone(),
        local_only,
        port: config.port,
        bind_address: config.bind_address.clone(),
        live_port: Arc::new(Mutex::new(config.port)),
    };

    let (port, server) = server::spawn_server(state, shutdown_rx).await?;
    log::info!("[funnel.backend] Ready on port {}", port);

    tokio::signal::ctrl_c().await?;
    log::info!("[funnel.backend] Shutting down");

    let _ = shutdown_tx.send(true);
    poller.cancel();
    if let Err(e) = server.await {
        log::warn!("[funnel.backend] Server task ended abnormally: {}", e);
    }
    let _ = forward.await;

    // Drain pending remote writes before exit
    let store = {
        let mut guard = board.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(
            &mut *guard,
            BoardStore::local(BoardState::default(), slug.as_str(), None),
        )
    };
    store.dispose().await;
    Ok(())
}
