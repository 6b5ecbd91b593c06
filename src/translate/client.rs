//! Public translation entry point used by the repository browser.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use super::mirror::DurableMirror;
use super::normalize::{cache_key, normalize, unique_texts};
use super::relay_client::RelayTranslator;
use super::sqlite_store::SqliteMirrorStore;
use super::{CircuitBreaker, MirrorStore, TranslateError, Translator, DEFAULT_TARGET};
use crate::cache::{CacheStats, CoalescingCache, ExpiringCacheStore};
use crate::config::ClientConfig;
use crate::metrics::{metric_names, MetricsRegistry};

type TranslationStore = ExpiringCacheStore<String, String>;

pub struct TranslationClient {
    translator: Arc<dyn Translator>,
    cache: CoalescingCache<String, String, TranslateError>,
    mirror: Arc<DurableMirror>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsRegistry>,
}

impl TranslationClient {
    /// Build a client over `translator` with an explicitly owned translation store.
    pub fn new(translator: Arc<dyn Translator>, store: TranslationStore, mirror: DurableMirror) -> Self {
        let store = Arc::new(store);
        let mirror = Arc::new(mirror);

        let hook_store = Arc::clone(&store);
        let hook_mirror = Arc::clone(&mirror);
        let cache = CoalescingCache::new(store).on_store(move |_key: &String, _value: &String| {
            schedule_persist(Arc::clone(&hook_mirror), Arc::clone(&hook_store));
        });

        Self {
            translator,
            cache,
            mirror,
            breaker: Arc::new(CircuitBreaker::new()),
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Build a relay-backed client from configuration. A mirror database that
    /// cannot be opened leaves the client memory-only.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TranslateError> {
        let translator = RelayTranslator::with_timeout(&config.endpoint, config.timeout)?;

        let backend = config.mirror_path.as_deref().and_then(|path| {
            match SqliteMirrorStore::open(path) {
                Ok(store) => Some(Arc::new(store) as Arc<dyn MirrorStore>),
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "durable storage unavailable, translation cache is memory-only");
                    None
                }
            }
        });

        Ok(Self::new(
            Arc::new(translator),
            ExpiringCacheStore::new(config.store_capacity, config.store_ttl),
            DurableMirror::new(backend),
        ))
    }

    /// Translate `text` into `target`. Never fails: blank input yields `""`
    /// and any provider problem yields the trimmed input unchanged.
    pub async fn translate(&self, text: &str, target: &str) -> String {
        let Some(text) = normalize(text) else {
            return String::new();
        };
        if self.breaker.is_open() {
            return text.to_string();
        }

        self.load_mirror().await;

        let translator = Arc::clone(&self.translator);
        let breaker = Arc::clone(&self.breaker);
        let metrics = Arc::clone(&self.metrics);
        let owned_text = text.to_string();
        let owned_target = target.to_string();

        let outcome = self
            .cache
            .resolve(cache_key(text, target), move || async move {
                if breaker.is_open() {
                    return Err(TranslateError::Unavailable("translation disabled".into()));
                }
                let timer = metrics.timer(metric_names::TRANSLATE_NETWORK);
                let result = translator.translate(&owned_text, &owned_target).await;
                timer.finish(&result);

                match result {
                    Ok(translated) => Ok(translated.translation),
                    Err(e) => {
                        if e.trips_breaker() {
                            breaker.trip(&e.to_string());
                        }
                        Err(e)
                    }
                }
            })
            .await;

        match outcome {
            Ok(translated) => translated,
            Err(e) => {
                debug!(error = %e, "falling back to original text");
                text.to_string()
            }
        }
    }

    /// Translate into the default target locale.
    pub async fn translate_default(&self, text: &str) -> String {
        self.translate(text, DEFAULT_TARGET).await
    }

    /// Translate many texts concurrently. Inputs are trimmed and deduplicated;
    /// the map is keyed by the trimmed text, so padded variants collapse into
    /// one entry.
    pub async fn translate_batch<'a, I>(&self, texts: I, target: &str) -> HashMap<String, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let jobs = unique_texts(texts).into_iter().map(|text| async move {
            let translated = self.translate(&text, target).await;
            (text, translated)
        });
        join_all(jobs).await.into_iter().collect()
    }

    /// True once a provider failure has disabled translation.
    pub fn is_disabled(&self) -> bool {
        self.breaker.is_open()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.store().stats()
    }

    pub fn mirror_available(&self) -> bool {
        self.mirror.is_available()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Restore the mirror on the blocking pool. Racing callers wait there too.
    async fn load_mirror(&self) {
        if self.mirror.is_loaded() {
            return;
        }
        let mirror = Arc::clone(&self.mirror);
        let store = Arc::clone(self.cache.store());
        if let Err(e) = tokio::task::spawn_blocking(move || mirror.ensure_loaded(&store)).await {
            warn!(error = %e, "durable storage load task failed");
        }
    }
}

/// Flush the store to durable storage off the caller's path.
fn schedule_persist(mirror: Arc<DurableMirror>, store: Arc<TranslationStore>) {
    if !mirror.is_available() {
        return;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(move || mirror.persist(&store));
        }
        Err(_) => mirror.persist(&store),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::mirror::{MemoryMirrorStore, STORAGE_KEY};
    use crate::translate::Translation;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    enum Mode {
        Succeed,
        Fail,
        Empty,
    }

    struct MockTranslator {
        calls: AtomicUsize,
        running: AtomicUsize,
        peak: AtomicUsize,
        mode: Mode,
        delay: Duration,
    }

    impl MockTranslator {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                mode,
                delay: Duration::from_millis(20),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Translator for MockTranslator {
        async fn translate(&self, text: &str, target: &str) -> Result<Translation, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            match self.mode {
                Mode::Succeed => Ok(Translation {
                    translation: format!("[{target}] {text}"),
                    detected: Some("en".into()),
                }),
                Mode::Fail => Err(TranslateError::Unavailable("connection refused".into())),
                Mode::Empty => Err(TranslateError::EmptyTranslation),
            }
        }
    }

    fn client_with(translator: Arc<MockTranslator>, mirror: DurableMirror) -> TranslationClient {
        TranslationClient::new(
            translator,
            ExpiringCacheStore::new(200, Duration::from_secs(3600)),
            mirror,
        )
    }

    fn client(translator: Arc<MockTranslator>) -> TranslationClient {
        client_with(translator, DurableMirror::disabled())
    }

    #[tokio::test]
    async fn blank_input_short_circuits() {
        let translator = MockTranslator::new(Mode::Succeed);
        let client = client(translator.clone());

        assert_eq!(client.translate("   ", "zh").await, "");
        assert_eq!(client.translate("", "zh").await, "");
        assert_eq!(translator.calls(), 0);
        assert_eq!(client.cache_stats().total, 0);
    }

    #[tokio::test]
    async fn repeated_and_padded_texts_hit_the_cache() {
        let translator = MockTranslator::new(Mode::Succeed);
        let client = client(translator.clone());

        assert_eq!(client.translate("hello", "zh").await, "[zh] hello");
        assert_eq!(client.translate("  hello\n", "zh").await, "[zh] hello");
        assert_eq!(client.translate("hello", "en").await, "[en] hello");
        assert_eq!(translator.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_translations_share_one_request() {
        let translator = MockTranslator::new(Mode::Succeed);
        let client = client(translator.clone());

        let results = join_all((0..5).map(|_| client.translate_default("repo description"))).await;

        assert_eq!(translator.calls(), 1);
        assert!(results.iter().all(|r| r == "[zh] repo description"));
    }

    #[tokio::test]
    async fn failure_opens_breaker_for_the_session() {
        let translator = MockTranslator::new(Mode::Fail);
        let client = client(translator.clone());

        assert_eq!(client.translate("first", "zh").await, "first");
        assert!(client.is_disabled());

        assert_eq!(client.translate("second", "zh").await, "second");
        assert_eq!(client.translate("first", "en").await, "first");
        assert_eq!(translator.calls(), 1);
    }

    #[tokio::test]
    async fn open_breaker_skips_even_cached_entries() {
        let translator = MockTranslator::new(Mode::Fail);
        let client = client(translator.clone());
        client
            .cache
            .store()
            .set(cache_key("cached", "zh"), "已缓存".to_string());

        client.translate("other", "zh").await;
        assert_eq!(client.translate("cached", "zh").await, "cached");
    }

    #[tokio::test]
    async fn empty_translation_falls_back_without_tripping() {
        let translator = MockTranslator::new(Mode::Empty);
        let client = client(translator.clone());

        assert_eq!(client.translate("hello", "zh").await, "hello");
        assert!(!client.is_disabled());
        assert_eq!(client.translate("hello", "zh").await, "hello");
        assert_eq!(translator.calls(), 2, "empty results are not cached");
    }

    #[tokio::test]
    async fn batch_dedups_trimmed_inputs() {
        let translator = MockTranslator::new(Mode::Succeed);
        let client = client(translator.clone());

        let results = client.translate_batch(["a", "a", " a "], "en").await;

        assert_eq!(translator.calls(), 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results.get("a").map(String::as_str), Some("[en] a"));
    }

    #[tokio::test]
    async fn batch_translates_distinct_texts_concurrently() {
        let translator = MockTranslator::new(Mode::Succeed);
        let client = client(translator.clone());

        let results = client
            .translate_batch(["one", "two", "three", "", "two"], "zh")
            .await;

        assert_eq!(translator.calls(), 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results["three"], "[zh] three");
        assert_eq!(translator.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn restored_translations_avoid_the_network() {
        let backend = Arc::new(MemoryMirrorStore::new());
        backend
            .write(STORAGE_KEY, r#"[["zh::hello","你好"]]"#)
            .unwrap();
        let translator = MockTranslator::new(Mode::Succeed);
        let client = client_with(translator.clone(), DurableMirror::new(Some(backend)));

        assert_eq!(client.translate("hello", "zh").await, "你好");
        assert_eq!(translator.calls(), 0);
    }

    /// Records which thread performed each read.
    #[derive(Default)]
    struct ThreadRecordingStore {
        readers: parking_lot::Mutex<Vec<std::thread::ThreadId>>,
    }

    impl MirrorStore for ThreadRecordingStore {
        fn read(&self, _key: &str) -> Result<Option<String>, crate::translate::mirror::MirrorError> {
            self.readers.lock().push(std::thread::current().id());
            Ok(Some(r#"[["zh::hello","你好"]]"#.to_string()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), crate::translate::mirror::MirrorError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn mirror_is_read_once_off_the_async_thread() {
        let backend = Arc::new(ThreadRecordingStore::default());
        let translator = MockTranslator::new(Mode::Succeed);
        let client = client_with(translator.clone(), DurableMirror::new(Some(backend.clone())));

        let (a, b) = tokio::join!(client.translate("hello", "zh"), client.translate("hello", "zh"));
        assert_eq!((a.as_str(), b.as_str()), ("你好", "你好"));
        client.translate("hello", "zh").await;

        let readers = backend.readers.lock();
        assert_eq!(readers.len(), 1);
        assert_ne!(readers[0], std::thread::current().id());
        assert_eq!(translator.calls(), 0);
    }

    #[tokio::test]
    async fn successful_translation_is_persisted() {
        let backend = Arc::new(MemoryMirrorStore::new());
        let translator = MockTranslator::new(Mode::Succeed);
        let client = client_with(translator, DurableMirror::new(Some(backend.clone())));

        client.translate("hello", "zh").await;

        let mut persisted = None;
        for _ in 0..50 {
            persisted = backend.read(STORAGE_KEY).unwrap();
            if persisted.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(persisted.as_deref(), Some(r#"[["zh::hello","[zh] hello"]]"#));
        assert!(client.mirror_available());
    }
}
