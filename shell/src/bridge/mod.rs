//! Presentation bridge
//!
//! In-process HTTP/WebSocket server on loopback through which the
//! presentation layer reaches the gateway, the updater and the window
//! manager. It also serves the packaged UI.

pub mod handlers;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use shared::{process_error, process_info, ProcessId};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::core::ShellContext;
use crate::error::{ShellError, ShellResult};
use crate::services::{ApiGateway, PageTracker};
use crate::updater::Updater;

/// Everything the handlers need; cheap to clone
#[derive(Clone)]
pub struct BridgeState {
    pub gateway: Arc<ApiGateway>,
    pub updater: Updater,
    pub context: ShellContext,
    pub pages: Arc<PageTracker>,
    pub started_at: DateTime<Utc>,
}

impl BridgeState {
    pub fn new(gateway: Arc<ApiGateway>, updater: Updater, context: ShellContext, pages: Arc<PageTracker>) -> Self {
        Self {
            gateway,
            updater,
            context,
            pages,
            started_at: Utc::now(),
        }
    }
}

/// Build the router; `static_dir` becomes the fallback for UI assets
pub fn build_router(state: BridgeState, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/ping", get(handlers::ping))
        .route("/api/versions", get(handlers::versions))
        .route("/api/call-backend", post(handlers::call_backend))
        .route("/api/backend-port", get(handlers::backend_port))
        .route("/api/backend-status", get(handlers::backend_status))
        .route("/api/update/status", get(handlers::update_status))
        .route("/api/update/check", post(handlers::update_check))
        .route("/api/update/respond", post(handlers::update_respond))
        .route("/api/update/install", post(handlers::update_install))
        .route("/api/window/activate", post(handlers::window_activate))
        .route("/ws", get(websocket::websocket_handler));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true)),
        None => router,
    };

    router
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()).into_inner())
        .with_state(state)
}

/// Running bridge server
pub struct BridgeServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl BridgeServer {
    /// Bind `addr` and start serving in the background
    pub async fn bind(addr: SocketAddr, state: BridgeState, static_dir: Option<PathBuf>) -> ShellResult<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ShellError::bridge(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener.local_addr()?;
        let router = build_router(state, static_dir);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                process_error!(ProcessId::current(), "Bridge server error: {}", e);
            }
        });

        process_info!(ProcessId::current(), "🌐 Bridge listening on http://{}", local_addr);
        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Stop accepting connections and wait for the server task
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // open websockets keep graceful shutdown pending; don't wait on them forever
        if tokio::time::timeout(std::time::Duration::from_secs(2), &mut self.task).await.is_err() {
            self.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShellConfig;
    use crate::core::ShellEvent;
    use crate::traits::{ArtifactRef, FeedRelease, MockInstaller, MockUpdateFeed};
    use futures_util::StreamExt;
    use serde_json::{json, Value};
    use shared::{BackendProcessHandle, ReleaseInfo};
    use std::time::Duration;
    use tokio::sync::{mpsc, watch};

    struct Harness {
        server: BridgeServer,
        events: mpsc::UnboundedReceiver<ShellEvent>,
        backend: watch::Sender<BackendProcessHandle>,
        client: reqwest::Client,
    }

    impl Harness {
        fn url(&self, path: &str) -> String {
            format!("{}{}", self.server.base_url(), path)
        }

        async fn post(&self, path: &str, body: Value) -> Value {
            self.client
                .post(self.url(path))
                .json(&body)
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap()
        }

        async fn get(&self, path: &str) -> Value {
            self.client.get(self.url(path)).send().await.unwrap().json().await.unwrap()
        }
    }

    async fn harness(feed: MockUpdateFeed, static_dir: Option<PathBuf>) -> Harness {
        let config = Arc::new(ShellConfig::for_app_dir(std::env::temp_dir()).unwrap());
        let (backend, backend_rx) = watch::channel(BackendProcessHandle::not_started());
        let (events_tx, events) = mpsc::unbounded_channel();
        let context = ShellContext::new(backend_rx, events_tx.clone(), config);

        let gateway = Arc::new(ApiGateway::from_context(&context).unwrap());
        let updater = Updater::new(Arc::new(feed), Arc::new(MockInstaller::new()), "1.0.0");
        let pages = PageTracker::new(Duration::from_millis(50), events_tx);
        let state = BridgeState::new(gateway, updater, context, pages);

        let server = BridgeServer::bind("127.0.0.1:0".parse().unwrap(), state, static_dir)
            .await
            .unwrap();
        Harness {
            server,
            events,
            backend,
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
        }
    }

    fn newer_release() -> FeedRelease {
        FeedRelease {
            info: ReleaseInfo {
                version: "1.3.0".to_string(),
                release_date: "2025-09-07".to_string(),
                release_notes: None,
            },
            artifact: ArtifactRef {
                url: "http://127.0.0.1:1/app.AppImage".to_string(),
                sha512: None,
                size: None,
            },
        }
    }

    #[tokio::test]
    async fn test_ping_and_health() {
        let h = harness(MockUpdateFeed::new(), None).await;
        assert_eq!(
            h.get("/api/ping").await,
            json!({"message": "pong", "greeting": "Hello from the desktop shell!"})
        );
        assert_eq!(h.get("/health").await["status"], "ok");
        assert_eq!(h.get("/api/versions").await["shell"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_call_backend_errors_are_envelopes() {
        let h = harness(MockUpdateFeed::new(), None).await;

        let unknown_method = h
            .post("/api/call-backend", json!({"method": "BREW", "endpoint": "/coffee"}))
            .await;
        assert_eq!(unknown_method["success"], false);
        assert!(unknown_method["error"].as_str().unwrap().contains("BREW"));

        let no_backend = h
            .post("/api/call-backend", json!({"method": "GET", "endpoint": "/api/health"}))
            .await;
        assert_eq!(no_backend["success"], false);

        let malformed = h.post("/api/call-backend", json!({"endpoint": "/x"})).await;
        assert_eq!(malformed["success"], false);
    }

    #[tokio::test]
    async fn test_backend_port_and_status_follow_supervisor() {
        let h = harness(MockUpdateFeed::new(), None).await;
        assert_eq!(h.get("/api/backend-port").await, json!({"port": null}));

        h.backend.send_modify(|handle| {
            handle.generation = 1;
            handle.port = Some(8765);
            handle.status = shared::BackendStatus::Running;
        });
        assert_eq!(h.get("/api/backend-port").await, json!({"port": 8765}));
        assert_eq!(h.get("/api/backend-status").await["status"], "running");
    }

    #[tokio::test]
    async fn test_update_routes() {
        let mut feed = MockUpdateFeed::new();
        feed.expect_latest().times(1).returning(|| Ok(newer_release()));
        let h = harness(feed, None).await;

        assert_eq!(h.get("/api/update/status").await["status"], "idle");

        let checked = h.post("/api/update/check", json!({})).await;
        assert_eq!(checked["success"], true);
        assert_eq!(checked["data"]["status"], "update-available");
        assert_eq!(checked["data"]["versionInfo"]["version"], "1.3.0");

        let bogus = h.post("/api/update/respond", json!({"action": "maybe"})).await;
        assert_eq!(bogus["success"], false);

        let later = h.post("/api/update/respond", json!({"action": "later"})).await;
        assert_eq!(later["data"]["status"], "up-to-date");

        let install = h.post("/api/update/install", json!({})).await;
        assert_eq!(install["success"], false);
    }

    #[tokio::test]
    async fn test_activate_reaches_shell_loop() {
        let mut h = harness(MockUpdateFeed::new(), None).await;
        let response = h.post("/api/window/activate", json!({})).await;
        assert_eq!(response["success"], true);
        assert_eq!(h.events.recv().await, Some(ShellEvent::ActivateRequested));
    }

    #[tokio::test]
    async fn test_static_fallback_serves_ui() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Calculator</h1>").unwrap();
        let h = harness(MockUpdateFeed::new(), Some(dir.path().to_path_buf())).await;

        let body = h.client.get(h.url("/")).send().await.unwrap().text().await.unwrap();
        assert!(body.contains("Calculator"));
    }

    #[tokio::test]
    async fn test_websocket_pushes_snapshots_and_tracks_page() {
        let mut feed = MockUpdateFeed::new();
        feed.expect_latest().returning(|| Ok(newer_release()));
        let mut h = harness(feed, None).await;

        let ws_url = format!("ws://{}/ws", h.server.local_addr());
        let (mut socket, _) = tokio_tungstenite::connect_async(ws_url).await.unwrap();
        assert_eq!(h.events.recv().await, Some(ShellEvent::WindowOpened));

        let first = next_json(&mut socket).await;
        assert_eq!(first["type"], "update-status");
        assert_eq!(first["payload"]["status"], "idle");
        assert_eq!(next_json(&mut socket).await["type"], "backend-status");

        h.post("/api/update/check", json!({})).await;
        assert_eq!(next_json(&mut socket).await["payload"]["status"], "checking");
        assert_eq!(next_json(&mut socket).await["payload"]["status"], "update-available");

        drop(socket);
        assert_eq!(h.events.recv().await, Some(ShellEvent::WindowClosed));
    }

    async fn next_json<S>(socket: &mut S) -> Value
    where
        S: futures_util::Stream<Item = Result<tokio_tungstenite::tungstenite::Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        serde_json::from_str::<Value>(message.to_text().unwrap()).unwrap()
    }
}
