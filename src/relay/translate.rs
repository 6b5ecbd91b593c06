//! `POST /translate`: validate, sign and forward to the translation provider.
//!
//! The provider expects a form-encoded POST of `q, from, to, appid, salt, sign`
//! and answers `{"from": .., "to": .., "trans_result": [{"src": .., "dst": ..}]}`,
//! or `{"error_code": .., "error_msg": ..}` on failure.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::error::body_detail;
use super::sign::{make_salt, sign};
use super::{RelayError, RelayState};
use crate::metrics::{metric_names, request_id};
use crate::translate::DEFAULT_TARGET;

const DEFAULT_SOURCE: &str = "auto";
const FAILURE_MESSAGE: &str = "translation request failed";

#[derive(Debug, PartialEq, Eq)]
struct TranslateInput {
    text: String,
    target: String,
    from: String,
}

#[derive(Debug, Serialize)]
pub(super) struct TranslateReply {
    translation: String,
    detected: String,
}

pub(super) async fn translate_handler(
    State(state): State<Arc<RelayState>>,
    body: Bytes,
) -> Result<Json<TranslateReply>, RelayError> {
    let input = parse_input(&body)?;
    let credentials = state
        .config
        .credentials
        .as_ref()
        .ok_or(RelayError::NotConfigured)?;

    let request_id = request_id();
    let salt = make_salt();
    let signature = sign(&credentials.app_id, &input.text, &salt, &credentials.app_secret);
    let form = [
        ("q", input.text.as_str()),
        ("from", input.from.as_str()),
        ("to", input.target.as_str()),
        ("appid", credentials.app_id.as_str()),
        ("salt", salt.as_str()),
        ("sign", signature.as_str()),
    ];

    debug!(
        request_id = %request_id,
        chars = input.text.chars().count(),
        from = %input.from,
        to = %input.target,
        "forwarding translation request"
    );

    let timer = state.metrics.timer(metric_names::PROVIDER_CALL);
    let sent = state
        .http
        .post(&state.config.provider_url)
        .form(&form)
        .send()
        .await;
    timer.finish(&sent);
    let response = sent.map_err(|e| RelayError::from_transport(FAILURE_MESSAGE, &e))?;

    let status = response.status().as_u16();
    let payload = response
        .bytes()
        .await
        .map_err(|e| RelayError::from_transport(FAILURE_MESSAGE, &e))?;
    if !(200..300).contains(&status) {
        return Err(RelayError::from_status(FAILURE_MESSAGE, status, &payload));
    }

    let detail = body_detail(&payload);
    match extract_translation(&detail, &input.from) {
        Some(reply) => {
            info!(request_id = %request_id, detected = %reply.detected, "translation relayed");
            Ok(Json(reply))
        }
        None => Err(RelayError::MalformedResponse { detail }),
    }
}

/// Validate the JSON body. `text` must be a non-blank string; `target` and
/// `from` default when missing or blank.
fn parse_input(body: &[u8]) -> Result<TranslateInput, RelayError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| RelayError::InvalidInput("request body must be a JSON object".into()))?;

    let text = match value.get("text") {
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        Some(Value::String(_)) => return Err(RelayError::InvalidInput("text must not be blank".into())),
        Some(_) => return Err(RelayError::InvalidInput("text must be a string".into())),
        None => return Err(RelayError::InvalidInput("text is required".into())),
    };

    Ok(TranslateInput {
        text,
        target: string_field(&value, "target").unwrap_or_else(|| DEFAULT_TARGET.to_string()),
        from: string_field(&value, "from").unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
    })
}

fn string_field(value: &Value, name: &str) -> Option<String> {
    value
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First non-empty `trans_result[].dst`, with the detected source language.
fn extract_translation(payload: &Value, requested_from: &str) -> Option<TranslateReply> {
    let translation = payload
        .get("trans_result")?
        .as_array()?
        .first()?
        .get("dst")?
        .as_str()
        .filter(|dst| !dst.is_empty())?
        .to_string();
    let detected = payload
        .get("from")
        .and_then(Value::as_str)
        .unwrap_or(requested_from)
        .to_string();
    Some(TranslateReply {
        translation,
        detected,
    })
}
