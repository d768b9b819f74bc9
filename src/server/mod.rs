//! Loopback playback server (spec.md §6): a plain static file server rooted
//! at the items directory, bound once at startup and held on the same port
//! for the process lifetime so a player's URLs stay valid across pauses and
//! resumes.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tokio::signal;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use dtg_common::ItemId;

use crate::streaming;

/// Shared application context for the playback server.
#[derive(Clone)]
pub struct AppContext {
    pub items_root: PathBuf,
}

/// Create the Axum router: a health check plus the items directory served
/// directly underneath `/`.
pub fn create_router(ctx: AppContext) -> Router {
    let items_root = ctx.items_root.clone();

    Router::new()
        .route("/health", get(health_check))
        .merge(streaming::playback_router(&items_root))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> &'static str {
    "ok"
}

/// A running playback server. Dropping or calling [`shutdown`] stops it.
pub struct PlaybackServerHandle {
    pub local_addr: SocketAddr,
    join_handle: JoinHandle<()>,
}

impl PlaybackServerHandle {
    /// Build the URL a player should open for `item_id`'s master playlist.
    pub fn playback_url(&self, item_id: &ItemId) -> String {
        format!(
            "http://{}/{}/master.m3u8",
            self.local_addr,
            dtg_common::path_key::safe_item_id(item_id.as_str())
        )
    }

    /// Abort the server task.
    pub fn shutdown(self) {
        self.join_handle.abort();
    }
}

/// Bind and start the playback server. `port` of `0` lets the OS assign an
/// ephemeral port; the bound address is captured here and held for the
/// handle's lifetime, so callers only need to resolve it once.
pub async fn start_playback_server(
    host: &str,
    port: u16,
    items_root: PathBuf,
) -> Result<PlaybackServerHandle> {
    let ctx = AppContext { items_root };
    let app = create_router(ctx);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("invalid playback server bind address")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(%local_addr, "playback server listening");

    let join_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            tracing::error!(error = %e, "playback server exited with error");
        }
    });

    Ok(PlaybackServerHandle {
        local_addr,
        join_handle,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("failed to install ctrl+c handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install sigterm handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_playback_server_serves_master_playlist() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("movie-1")).unwrap();
        std::fs::write(dir.path().join("movie-1/master.m3u8"), "#EXTM3U\n").unwrap();

        let handle = start_playback_server("127.0.0.1", 0, dir.path().to_path_buf())
            .await
            .unwrap();
        let url = handle.playback_url(&ItemId::new("movie-1"));

        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert_eq!(body, "#EXTM3U\n");

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_health_check_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start_playback_server("127.0.0.1", 0, dir.path().to_path_buf())
            .await
            .unwrap();

        let body = reqwest::get(format!("http://{}/health", handle.local_addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_port_is_held_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start_playback_server("127.0.0.1", 0, dir.path().to_path_buf())
            .await
            .unwrap();
        let addr_one = handle.local_addr;
        let addr_two = handle.local_addr;
        assert_eq!(addr_one, addr_two);
        handle.shutdown();
    }
}
