//! Durable mirror of the translation store.
//!
//! Keeps the newest `STORAGE_LIMIT` translations in a single JSON record of
//! `[key, translatedText]` pairs so they survive restarts. The record is read
//! lazily on first use of the translation store and rewritten after every
//! successful translation. Any storage failure marks the mirror unavailable for
//! the rest of the session; translation then continues memory-only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, Once};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::ExpiringCacheStore;

/// Well-known key of the persisted record.
pub const STORAGE_KEY: &str = "github-popular-translation-cache";

/// Maximum number of persisted translations; older ones are dropped.
pub const STORAGE_LIMIT: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("mirror storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("mirror serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("mirror storage unavailable: {0}")]
    Unavailable(String),
}

/// Key/value storage holding the persisted record.
pub trait MirrorStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, MirrorError>;
    fn write(&self, key: &str, value: &str) -> Result<(), MirrorError>;
}

/// Process-local storage, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryMirrorStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryMirrorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MirrorStore for MemoryMirrorStore {
    fn read(&self, key: &str) -> Result<Option<String>, MirrorError> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        self.records.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct DurableMirror {
    backend: Option<Arc<dyn MirrorStore>>,
    load: Once,
    available: AtomicBool,
    /// Serializes snapshot + write so a stale snapshot never overwrites a newer one.
    write_lock: Mutex<()>,
}

impl DurableMirror {
    /// `None` means durable storage does not exist in this environment.
    pub fn new(backend: Option<Arc<dyn MirrorStore>>) -> Self {
        let available = backend.is_some();
        Self {
            backend,
            load: Once::new(),
            available: AtomicBool::new(available),
            write_lock: Mutex::new(()),
        }
    }

    /// A mirror with no backing storage.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Whether the one-time restore has completed.
    pub fn is_loaded(&self) -> bool {
        self.load.state().done()
    }

    /// Restore persisted translations into `store`. Only the first call does
    /// work; it reads storage synchronously, so async callers run it on the
    /// blocking pool.
    pub fn ensure_loaded(&self, store: &ExpiringCacheStore<String, String>) {
        self.load.call_once(|| self.load_into(store));
    }

    fn load_into(&self, store: &ExpiringCacheStore<String, String>) {
        let Some(backend) = self.backend.as_ref() else {
            debug!("no durable storage, translation cache is memory-only");
            return;
        };

        match backend.read(STORAGE_KEY) {
            Ok(Some(raw)) => {
                let pairs = parse_record(&raw);
                let restored = pairs.len();
                for (key, translated) in pairs {
                    store.set(key, translated);
                }
                info!(restored, "translation cache restored from durable storage");
            }
            Ok(None) => {}
            Err(e) => self.mark_unavailable(&e),
        }
    }

    /// Write the newest `STORAGE_LIMIT` entries of `store` to durable storage.
    /// Never fails; errors disable the mirror.
    pub fn persist(&self, store: &ExpiringCacheStore<String, String>) {
        if !self.is_available() {
            return;
        }
        let Some(backend) = self.backend.as_ref() else {
            return;
        };

        let _guard = self.write_lock.lock();
        let entries = store.recent(STORAGE_LIMIT);
        let result = serde_json::to_string(&entries)
            .map_err(MirrorError::from)
            .and_then(|raw| backend.write(STORAGE_KEY, &raw));

        match result {
            Ok(()) => debug!(persisted = entries.len(), "translation cache persisted"),
            Err(e) => self.mark_unavailable(&e),
        }
    }

    fn mark_unavailable(&self, error: &MirrorError) {
        if self.available.swap(false, Ordering::SeqCst) {
            warn!(error = %error, "durable translation storage failed, continuing memory-only");
        }
    }
}

/// Parse a persisted record, keeping every well-formed `[string, string]` pair
/// and skipping anything else.
fn parse_record(raw: &str) -> Vec<(String, String)> {
    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            warn!("persisted translation cache is not a list, ignoring it");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "persisted translation cache is corrupt, ignoring it");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Array(pair) => match pair.as_slice() {
                [Value::String(key), Value::String(translated), ..] => {
                    Some((key.clone(), translated.clone()))
                }
                _ => None,
            },
            _ => None,
        })
        .collect()
}
