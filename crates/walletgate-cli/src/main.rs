//! walletgate - terminal front end for the walletgate session core.
//!
//! Drives login, PIN unlock and profile refresh from a line-oriented
//! prompt. Every entered line counts as user activity for the idle timer.

mod app;
mod terminal;

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "walletgate.log";

fn log_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("walletgate")
        .join("logs")
}

/// Initialize tracing to a daily rolling file; the terminal belongs to the prompt.
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG to control log level (e.g., RUST_LOG=walletgate_core=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let appender = tracing_appender::rolling::daily(log_dir(), LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    info!("walletgate starting");

    let app = App::new()?;
    let result = app.run().await;

    if let Err(ref e) = result {
        eprintln!("Error: {:#}", e);
    }

    info!("walletgate shutting down");
    result
}
