use crate::api::api_router;
use crate::state::AppState;
/// HTTP server: spawns axum on a background tokio task.
use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

/// Bind and serve until `shutdown` flips to true. Returns the bound port
/// (which differs from the configured one when that is 0).
pub async fn spawn_server(
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(u16, JoinHandle<()>), std::io::Error> {
    let port = state.port;
    let bind_addr = state.bind_address.clone();
    let live_port = state.live_port.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app: Router = api_router().layer(cors).with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_addr, port)).await?;
    let actual_port = listener.local_addr()?.port();
    *live_port.lock().unwrap_or_else(|e| e.into_inner()) = actual_port;

    log::info!(
        target: "funnel.server",
        "HTTP server listening on http://{}:{}",
        bind_addr,
        actual_port
    );

    let handle = tokio::spawn(async move {
        let signal = async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(signal).await {
            log::error!(target: "funnel.server", "HTTP server exited with error: {}", e);
        }
    });

    Ok((actual_port, handle))
}
