//! Latency and failure tracking for outbound calls.
//!
//! Each named call keeps a sliding window of recent durations plus lifetime
//! call and failure counters. Snapshots report p50/p95/p99 in milliseconds.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Durations kept per call name.
pub const DEFAULT_WINDOW: usize = 512;

/// Identifier attached to every relay request for log correlation.
pub fn request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Times one outbound call; records when finished with the call's result.
#[must_use = "a call timer records nothing until finished"]
pub struct CallTimer {
    name: &'static str,
    started: Instant,
    registry: Arc<MetricsRegistry>,
}

impl CallTimer {
    pub fn finish<T, E>(self, result: &Result<T, E>) -> Duration {
        let elapsed = self.started.elapsed();
        self.registry.observe(self.name, elapsed, result.is_ok());
        elapsed
    }
}

struct LatencyWindow {
    durations: VecDeque<Duration>,
    capacity: usize,
    calls: u64,
    failures: u64,
}

impl LatencyWindow {
    fn new(capacity: usize) -> Self {
        Self {
            durations: VecDeque::with_capacity(capacity),
            capacity,
            calls: 0,
            failures: 0,
        }
    }

    fn push(&mut self, elapsed: Duration, ok: bool) {
        if self.durations.len() == self.capacity {
            self.durations.pop_front();
        }
        self.durations.push_back(elapsed);
        self.calls += 1;
        if !ok {
            self.failures += 1;
        }
    }

    /// Nearest-rank quantile over the window, `q` in `0.0..=1.0`.
    fn quantile(&self, q: f64) -> Option<Duration> {
        if self.durations.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = self.durations.iter().copied().collect();
        sorted.sort_unstable();
        let rank = (q.clamp(0.0, 1.0) * sorted.len() as f64).ceil() as usize;
        Some(sorted[rank.saturating_sub(1)])
    }

    fn summary(&self) -> CallSummary {
        let ms = |q| self.quantile(q).map_or(0.0, |d| d.as_secs_f64() * 1000.0);
        CallSummary {
            calls: self.calls,
            failures: self.failures,
            p50_ms: ms(0.50),
            p95_ms: ms(0.95),
            p99_ms: ms(0.99),
        }
    }
}

pub struct MetricsRegistry {
    windows: Mutex<HashMap<&'static str, LatencyWindow>>,
    window: usize,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window: window.max(1),
        }
    }

    pub fn observe(&self, name: &'static str, elapsed: Duration, ok: bool) {
        self.windows
            .lock()
            .entry(name)
            .or_insert_with(|| LatencyWindow::new(self.window))
            .push(elapsed, ok);
        tracing::trace!(call = name, elapsed_ms = elapsed.as_millis() as u64, ok, "outbound call observed");
    }

    pub fn timer(self: &Arc<Self>, name: &'static str) -> CallTimer {
        CallTimer {
            name,
            started: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    pub fn quantile(&self, name: &str, q: f64) -> Option<Duration> {
        self.windows.lock().get(name).and_then(|w| w.quantile(q))
    }

    /// Per-call summaries, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<&'static str, CallSummary> {
        self.windows
            .lock()
            .iter()
            .map(|(&name, window)| (name, window.summary()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSummary {
    pub calls: u64,
    pub failures: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

pub mod metric_names {
    /// Client: one translation round trip to the relay.
    pub const TRANSLATE_NETWORK: &str = "translate_network";
    /// Client: one uncached upstream API fetch through the relay.
    pub const UPSTREAM_FETCH: &str = "upstream_fetch";
    /// Relay: signed call to the translation provider.
    pub const PROVIDER_CALL: &str = "provider_call";
    /// Relay: proxied call to the upstream repository API.
    pub const UPSTREAM_CALL: &str = "upstream_call";
}
