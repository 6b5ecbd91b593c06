//! `GET /upstream/*path`: credentialed passthrough to the upstream API.
//!
//! The path is forwarded as it arrived on the wire. Percent escapes such as
//! `%2F`, `%3F` and `%23` stay escaped.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::{RelayError, RelayState};
use crate::metrics::{metric_names, request_id};

const FAILURE_MESSAGE: &str = "upstream request failed";
const ROUTE_PREFIX: &str = "/upstream";

pub(super) async fn proxy_handler(
    State(state): State<Arc<RelayState>>,
    OriginalUri(uri): OriginalUri,
) -> Result<Response, RelayError> {
    let request_id = request_id();
    let path = uri.path().strip_prefix(ROUTE_PREFIX).unwrap_or(uri.path());
    let url = upstream_url(&state.config.upstream_base_url, path, uri.query());

    let mut request = state
        .http
        .get(&url)
        .header(header::ACCEPT, "application/json");
    if let Some(token) = &state.config.upstream_token {
        request = request.bearer_auth(token);
    }

    let timer = state.metrics.timer(metric_names::UPSTREAM_CALL);
    let sent = request.send().await;
    timer.finish(&sent);
    let response = sent.map_err(|e| RelayError::from_transport(FAILURE_MESSAGE, &e))?;

    let status = response.status().as_u16();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let body = response
        .bytes()
        .await
        .map_err(|e| RelayError::from_transport(FAILURE_MESSAGE, &e))?;

    if !(200..300).contains(&status) {
        return Err(RelayError::from_status(FAILURE_MESSAGE, status, &body));
    }

    debug!(request_id = %request_id, url = %url, status, bytes = body.len(), "upstream request proxied");

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    let mut proxied = (status, Bytes::from(body.to_vec())).into_response();
    proxied.headers_mut().insert(
        header::CONTENT_TYPE,
        content_type
            .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok())
            .unwrap_or_else(|| HeaderValue::from_static("application/json")),
    );
    Ok(proxied)
}

/// Join the upstream base URL, the captured path and the raw query string.
fn upstream_url(base: &str, path: &str, query: Option<&str>) -> String {
    let mut url = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}
