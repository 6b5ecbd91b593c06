//! Best-effort description translation for the repository browser.
//!
//! Resolution order for one text: circuit breaker, then the translation store
//! (backed by the durable mirror), then in-flight dedup, then the relay's
//! `/translate` endpoint. Failures never reach the caller; they degrade to the
//! original text and open the breaker for the rest of the session.

pub mod breaker;
pub mod client;
pub mod mirror;
pub mod normalize;
pub mod relay_client;
pub mod sqlite_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use breaker::CircuitBreaker;
pub use client::TranslationClient;
pub use mirror::{DurableMirror, MemoryMirrorStore, MirrorStore, STORAGE_KEY, STORAGE_LIMIT};
pub use relay_client::RelayTranslator;
pub use sqlite_store::SqliteMirrorStore;

/// Target locale used when the caller does not name one.
pub const DEFAULT_TARGET: &str = "zh";

/// Result of a successful provider round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub translation: String,
    #[serde(default)]
    pub detected: Option<String>,
}

/// Backend that performs one network translation.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target: &str) -> Result<Translation, TranslateError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TranslateError {
    /// Transport failure, timeout, or non-2xx response. Opens the breaker.
    #[error("translation provider unavailable: {0}")]
    Unavailable(String),
    /// The provider answered 2xx without a usable translation.
    #[error("translation response carried no translation")]
    EmptyTranslation,
}

impl TranslateError {
    /// Whether this failure should permanently disable translation.
    pub fn trips_breaker(&self) -> bool {
        matches!(self, TranslateError::Unavailable(_))
    }
}
