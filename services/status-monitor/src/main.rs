//! Impact Leaders status monitor
//!
//! Headless rendition of the dashboard's API status screen:
//! 1. Resolves the backend origin the same way the dashboard client does
//! 2. Polls `/health` and the configured API probes on a fixed interval
//! 3. Serves the latest snapshot on `/status` and Prometheus metrics on `/metrics`

mod config;
mod metrics;
mod monitor;

use anyhow::{Context, Result};
use api_client::{ApiClient, LoggingNavigator};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{AuthStorage, FileBackend, MemoryBackend, StorageManager};
use tokio::net::TcpListener;
use tokio::sync::{RwLock, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, StorageConfig};
use crate::monitor::{Monitor, SharedSnapshot, StatusSnapshot};

/// Time allowed for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    snapshot: SharedSnapshot,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Session store for authenticated probes.
fn build_storage(config: &StorageConfig) -> Result<StorageManager> {
    match &config.path {
        Some(path) => {
            let backend = FileBackend::open(path.clone())
                .with_context(|| format!("failed to open session store {}", path.display()))?;
            Ok(StorageManager::new(Arc::new(backend)))
        }
        None => Ok(StorageManager::new(Arc::new(MemoryBackend::new()))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting impact-status-monitor");

    // Install before the client emits anything
    let prometheus_handle = metrics::install_recorder();

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let origin = config.origin().context("failed to resolve backend origin")?;

    info!(
        listen_addr = %config.monitor.listen_addr,
        origin = %origin,
        interval_secs = config.monitor.interval_secs,
        probes = config.probes.len(),
        "configuration loaded"
    );

    let auth = AuthStorage::new(build_storage(&config.storage)?);
    if !auth.is_authenticated() {
        warn!("no stored session, probes will run unauthenticated");
    }

    let client = ApiClient::builder(&origin)
        .auth(auth)
        .navigator(Arc::new(LoggingNavigator::default()))
        .build();

    let snapshot: SharedSnapshot = Arc::new(RwLock::new(StatusSnapshot::pending()));
    let poller = Monitor::new(
        Arc::new(client),
        config.probes.clone(),
        config.request_timeout(),
        config.api.retries,
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let poller_handle = tokio::spawn(poller.run(snapshot.clone(), config.interval(), stop_rx));

    let app_state = AppState {
        snapshot,
        started_at: Instant::now(),
        prometheus: prometheus_handle,
    };
    let app = build_router(app_state, config.monitor.max_connections);

    let listen_addr = config.monitor.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    let _ = stop_tx.send(true);
    let _ = shutdown_tx.send(());

    // Drain timer starts at signal receipt
    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    // A poll in progress may be waiting on the backend
    if tokio::time::timeout(DRAIN_TIMEOUT, poller_handle).await.is_err() {
        warn!("poller did not stop in time");
    }

    info!("shutdown complete");
    Ok(())
}

/// Liveness of the monitor itself.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Latest snapshot; 503 while the backend is down or not yet checked.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await.clone();
    let status = if snapshot.backend.up {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };
    (status, axum::Json(snapshot))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::CheckResult;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use storage::AuthSession;
    use tower::ServiceExt;

    fn test_prometheus_handle() -> PrometheusHandle {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        recorder.handle()
    }

    fn test_app_state(snapshot: StatusSnapshot) -> AppState {
        AppState {
            snapshot: Arc::new(RwLock::new(snapshot)),
            started_at: Instant::now(),
            prometheus: test_prometheus_handle(),
        }
    }

    fn healthy_snapshot() -> StatusSnapshot {
        StatusSnapshot {
            backend: CheckResult {
                up: true,
                status: 200,
                latency_ms: 8,
                message: None,
            },
            probes: vec![],
            checked_at: Some(1_700_000_000_000),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_reports_uptime() {
        let app = build_router(test_app_state(StatusSnapshot::pending()), 100);
        let (status, json) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn status_is_503_before_first_check() {
        let app = build_router(test_app_state(StatusSnapshot::pending()), 100);
        let (status, json) = get_json(app, "/status").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["backend"]["up"], false);
        assert_eq!(json["backend"]["message"], "not checked yet");
        assert!(json["checked_at"].is_null());
    }

    #[tokio::test]
    async fn status_is_200_when_backend_up() {
        let app = build_router(test_app_state(healthy_snapshot()), 100);
        let (status, json) = get_json(app, "/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["backend"]["status"], 200);
        assert_eq!(json["checked_at"], 1_700_000_000_000u64);
    }

    #[tokio::test]
    async fn status_reflects_snapshot_updates() {
        let state = test_app_state(healthy_snapshot());
        let snapshot = state.snapshot.clone();
        let app = build_router(state, 100);

        snapshot.write().await.backend.up = false;
        let (status, _) = get_json(app, "/status").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let app = build_router(test_app_state(StatusSnapshot::pending()), 100);
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = build_router(test_app_state(StatusSnapshot::pending()), 100);
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn storage_defaults_to_memory() {
        let storage = build_storage(&StorageConfig::default()).unwrap();
        assert!(storage.is_available());
        assert!(!AuthStorage::new(storage).is_authenticated());
    }

    #[test]
    fn storage_reads_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let writer = AuthStorage::new(build_storage(&StorageConfig { path: Some(path.clone()) }).unwrap());
        writer.save_tokens(&AuthSession::new("monitor-token", None, None));

        let reader = AuthStorage::new(build_storage(&StorageConfig { path: Some(path) }).unwrap());
        assert_eq!(reader.get_access_token().as_deref(), Some("monitor-token"));
    }
}
