//! Cloud Shell Gateway
//!
//! Single-binary Rust service that:
//! 1. Brokers Google OAuth (authorization-code grant) at /auth and /callback
//! 2. Caches the access token under a key derived from the caller
//! 3. Relays Cloud Shell environment status and starts suspended environments

mod admin;
mod config;
mod connect;
mod environment;
mod error;
mod metrics;
mod oauth;
mod session;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::Request;
use axum::middleware::{self as axum_middleware, Next};
use axum::response::Response;
use axum::routing::any;
use cloudshell_api::CloudShellClient;
use cloudshell_auth::{FileTokenStore, IdentityKey, MemoryTokenStore, TokenStore};
use common::Secret;
use reqwest::Url;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::admin::AdminState;
use crate::config::{Config, StoreBackend};
use crate::oauth::OAuthSettings;

/// Time allowed for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    http: reqwest::Client,
    api: CloudShellClient,
    oauth: Arc<OAuthSettings>,
    store: Arc<dyn TokenStore>,
    identity: Arc<dyn IdentityKey>,
    secret_key: Arc<Secret<String>>,
    ssh_public_key: Arc<str>,
}

/// Build the public router.
///
/// The session layer wraps every route including the fallback, so unmatched
/// paths answer 401 until a token is cached. `lifecycle_routes` swaps the
/// placeholder on /token, /start and /addPublicKey for live handlers.
fn build_router(state: AppState, max_connections: usize, lifecycle_routes: bool) -> Router {
    let mut router = Router::new()
        .route("/auth", any(oauth::authorize))
        .route("/callback", any(oauth::callback))
        .route("/status", any(environment::status))
        .route("/connect", any(environment::connect));

    if lifecycle_routes {
        router = router
            .route("/token", any(environment::token))
            .route("/start", any(environment::start))
            .route("/addPublicKey", any(environment::add_public_key));
    }

    router
        .fallback(environment::placeholder)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            session::bootstrap,
        ))
        .layer(axum_middleware::from_fn(track_request))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Tag each request with an id, and record its route, status and latency.
async fn track_request(request: Request, next: Next) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let route = metrics::route_label(request.uri().path());
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let started = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let status = response.status().as_u16();
    metrics::record_request(route, status, started.elapsed().as_secs_f64());
    span.in_scope(|| debug!(status, "request completed"));
    response
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

    info!("starting cloudshell-gateway");
    let started_at = Instant::now();

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        admin_listen_addr = ?config.server.admin_listen_addr,
        api_url = %config.cloudshell.api_url,
        store = ?config.store.backend,
        identity = ?config.identity.strategy,
        lifecycle_routes = config.server.lifecycle_routes,
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.server.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let store: Arc<dyn TokenStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryTokenStore::new()),
        StoreBackend::File => {
            let store = FileTokenStore::load(config.store.path.clone())
                .await
                .with_context(|| {
                    format!("failed to open token store {}", config.store.path.display())
                })?;
            let entries = store.len().await;
            info!(path = %config.store.path.display(), entries, "token store loaded");
            Arc::new(store)
        }
    };

    let identity = config
        .identity_key()
        .context("failed to build identity strategy")?;

    let authorize_endpoint = Url::parse(&config.oauth.authorize_endpoint)
        .context("invalid oauth.authorize_endpoint")?;

    let credentials = std::mem::take(&mut config.credentials);
    let oauth = OAuthSettings {
        authorize_endpoint,
        token_endpoint: config.oauth.token_endpoint.clone(),
        client_id: credentials.client_id,
        client_secret: credentials.client_secret,
        public_url: config.oauth.public_url.clone(),
        fallback_origin: format!("http://{}", config.server.listen_addr),
    };

    let state = AppState {
        api: CloudShellClient::new(http.clone(), config.cloudshell.api_url.clone()),
        http,
        oauth: Arc::new(oauth),
        store: store.clone(),
        identity: identity.clone(),
        secret_key: Arc::new(credentials.secret_key),
        ssh_public_key: Arc::from(credentials.ssh_public_key),
    };

    let app = build_router(
        state,
        config.server.max_connections,
        config.server.lifecycle_routes,
    );

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    // Every server drains once the watch flips to true
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let admin_handle = match config.server.admin_listen_addr {
        Some(admin_addr) => {
            let admin_listener = TcpListener::bind(admin_addr)
                .await
                .with_context(|| format!("failed to bind admin listener to {admin_addr}"))?;
            let admin_app = admin::build_admin_router(AdminState {
                started_at,
                prometheus: prometheus_handle,
                store,
                identity,
            });
            info!(addr = %admin_addr, "admin listener ready");
            Some(tokio::spawn(serve(
                admin_listener,
                admin_app,
                shutdown_rx.clone(),
            )))
        }
        None => None,
    };

    let server_handle = tokio::spawn(serve(listener, app, shutdown_rx));
    info!(addr = %listen_addr, "accepting requests");

    shutdown_signal().await;

    // Signal the servers to begin draining
    let _ = shutdown_tx.send(true);

    // The drain timer starts at signal receipt
    let drain = async {
        let result = server_handle.await;
        if let Some(handle) = admin_handle {
            if let Ok(Err(e)) = handle.await {
                error!(error = %e, "admin listener error during shutdown");
            }
        }
        result
    };

    match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
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
