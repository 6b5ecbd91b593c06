//! Translator backed by the relay's `/translate` endpoint.
//! Connection pooling via reqwest; every request is bounded by a timeout,
//! and timeouts are reported like any other provider failure.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{TranslateError, Translation, Translator};

/// Default per-request timeout for the relay round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RelayTranslator {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct TranslateBody<'a> {
    text: &'a str,
    target: &'a str,
}

#[derive(Deserialize)]
struct TranslateReply {
    translation: Option<String>,
    detected: Option<String>,
    error: Option<String>,
}

impl RelayTranslator {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TranslateError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TranslateError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .build()
            .map_err(|e| TranslateError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Translator for RelayTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<Translation, TranslateError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&TranslateBody { text, target })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranslateError::Unavailable("translation request timed out".into())
                } else {
                    TranslateError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::Unavailable(format!(
                "unexpected status {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let reply: TranslateReply = response
            .json()
            .await
            .map_err(|e| TranslateError::Unavailable(e.to_string()))?;

        match reply.translation {
            Some(translation) if !translation.is_empty() => {
                debug!(chars = translation.chars().count(), "translation received");
                Ok(Translation {
                    translation,
                    detected: reply.detected,
                })
            }
            _ => {
                if let Some(error) = reply.error {
                    warn!(error = %error, "translation service responded with error");
                }
                Err(TranslateError::EmptyTranslation)
            }
        }
    }
}
