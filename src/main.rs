//! `hublingo-relay`: serve the upstream passthrough and translation relay.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use hublingo::config::{RelayConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_UPSTREAM_BASE_URL};

#[derive(Parser, Debug)]
#[command(name = "hublingo-relay", version, about = "Upstream passthrough and translation signing relay")]
struct Args {
    /// Address to bind.
    #[arg(long, value_name = "HOST", env = "RELAY_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Upstream API base URL.
    #[arg(long, value_name = "URL", env = "UPSTREAM_BASE_URL", default_value = DEFAULT_UPSTREAM_BASE_URL)]
    upstream: String,
}

#[tokio::main]
async fn main() {
    // `.env` has to be in the environment before clap reads its `env` fallbacks.
    let _ = dotenv::dotenv();
    let args = Args::parse();
    hublingo::init_tracing();

    let config = RelayConfig {
        host: args.host,
        port: args.port,
        upstream_base_url: args.upstream,
        ..RelayConfig::from_env()
    };
    info!(addr = %config.bind_addr(), upstream = %config.upstream_base_url, "hublingo relay starting");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        signal.cancel();
    });

    if let Err(e) = hublingo::relay::run_relay(config, shutdown).await {
        error!(error = %e, "relay failed");
        std::process::exit(1);
    }
}
