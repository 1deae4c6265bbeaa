//! MCU bridge daemon binary.
//!
//! # Usage
//!
//! ```bash
//! bridge-daemon --config /etc/mcubridge/mcubridge.toml
//! ```

use std::path::PathBuf;

use bridge_daemon::{daemon, Config};
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// MCU serial/MQTT bridge daemon
#[derive(Parser, Debug)]
#[command(name = "bridge-daemon")]
#[command(about = "Bridges an MCU serial link to MQTT")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "/etc/mcubridge/mcubridge.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(config = %args.config.display(), "bridge daemon starting up");
    let config = Config::load_blocking(&args.config)?;

    // `worker_threads` maps "single-threaded cooperative multitasking" to a
    // current-thread runtime; anything above 1 opts into a multi-threaded
    // one, which the architecture tolerates (`RuntimeState` is `Send + Sync`)
    // but doesn't require.
    let mut builder =
        if config.worker_threads <= 1 { tokio::runtime::Builder::new_current_thread() } else { tokio::runtime::Builder::new_multi_thread() };
    if config.worker_threads > 1 {
        builder.worker_threads(config.worker_threads);
    }
    let runtime = builder.enable_all().build().map_err(|err| Box::new(err) as Box<dyn std::error::Error>)?;

    let fatal = runtime.block_on(daemon::run(config));
    tracing::error!(%fatal, "bridge daemon exiting");
    Err(Box::new(fatal))
}
