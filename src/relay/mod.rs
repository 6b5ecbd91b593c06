//! Relay service: credentialed passthrough to the upstream repository API and
//! a signing relay for the translation provider.
//!
//! Routes:
//! - `GET /upstream/*path` forwards to the upstream API with the server-held token.
//! - `POST /translate` signs and forwards a translation request.
//! - `GET /metrics` reports outbound latency percentiles.
//!
//! Every response carries permissive CORS headers and any `OPTIONS` request is
//! answered with an empty 204. The relay keeps no per-request shared state
//! beyond read-only configuration, the HTTP client and the metrics registry.

mod error;
pub mod sign;
mod translate;
mod upstream;

pub use error::RelayError;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::metrics::MetricsRegistry;

const USER_AGENT: &str = concat!("hublingo-relay/", env!("CARGO_PKG_VERSION"));

/// Shared state for the relay handlers.
pub struct RelayState {
    pub config: RelayConfig,
    /// Pooled client for provider and upstream calls, bounded by `config.timeout`.
    pub http: reqwest::Client,
    pub metrics: Arc<MetricsRegistry>,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            config,
            http,
            metrics: Arc::new(MetricsRegistry::new()),
        })
    }
}

/// Build the relay router.
pub fn router(state: Arc<RelayState>) -> Router {
    let body_limit = state.config.body_limit;
    Router::new()
        .route("/translate", post(translate::translate_handler))
        .route("/upstream/*path", get(upstream::proxy_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the relay on an existing listener until `shutdown` is cancelled.
/// Tests bind 127.0.0.1:0 and pass the listener in.
pub async fn run_relay_on_listener(
    listener: TcpListener,
    config: RelayConfig,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if config.credentials.is_none() {
        warn!("TRANSLATE_APP_ID / TRANSLATE_APP_SECRET not set, /translate will answer 500");
    }
    if config.upstream_token.is_none() {
        info!("GITHUB_TOKEN not set, upstream requests are unauthenticated");
    }

    let state = Arc::new(RelayState::new(config)?);
    let addr = listener.local_addr()?;
    info!(%addr, "relay listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("relay stopped");
    Ok(())
}

/// Bind `config.bind_addr()` and serve until `shutdown` is cancelled.
pub async fn run_relay(
    config: RelayConfig,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(config.bind_addr()).await?;
    run_relay_on_listener(listener, config, shutdown).await
}

/// Permissive CORS: any origin, and `OPTIONS` short-circuits to 204.
async fn cors(request: Request, next: Next) -> Response {
    let requested_headers = request
        .headers()
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned();

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        requested_headers.unwrap_or_else(|| HeaderValue::from_static("Content-Type, Authorization")),
    );
    response
}

async fn metrics_handler(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

async fn not_found() -> RelayError {
    RelayError::NotFound
}
