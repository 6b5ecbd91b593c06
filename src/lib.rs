//! Hublingo: translation cache, request coalescing and signing relay for a
//! repository browser.
//!
//! The client side (`translate`, `api`) caches and deduplicates outbound
//! work; the server side (`relay`) holds the credentials and signs provider
//! requests.

pub mod api;
pub mod cache;
pub mod config;
pub mod metrics;
pub mod relay;
pub mod translate;

use tracing_subscriber::EnvFilter;

pub use api::{ApiError, UpstreamClient};
pub use cache::{CacheStats, CoalescingCache, ExpiringCacheStore};
pub use config::{ClientConfig, RelayConfig};
pub use translate::{TranslateError, Translation, TranslationClient, Translator};

const DEFAULT_LOG_FILTER: &str = "hublingo=debug,tower_http=info";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` switches to
/// line-delimited JSON. Calling it twice is a no-op.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
