//! CGW CLI - ChunkedGraph Gateway
//!
//! Serves the chunked-graph HTTP API and its notification channel.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

mod commands;

use commands::{Cli, LogFormat};

const DEFAULT_FILTER: &str = "cgw=info,cgw_web=debug,cgw_redis=info,cgw_core=info,tower_http=info";

/// Initialize tracing with optional file logging.
///
/// The returned guard flushes the file writer on drop and must live as long
/// as the process logs.
fn init_tracing(format: LogFormat, log_file: Option<&Path>, verbose: bool) -> Result<Option<WorkerGuard>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            "cgw=debug,cgw_web=debug,cgw_redis=debug,cgw_core=debug,tower_http=debug".into()
        } else {
            DEFAULT_FILTER.into()
        }
    });

    let stdout = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(env_filter).with(stdout).init();
        return Ok(None);
    };

    // Create parent directory if needed
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let file_layer = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout)
        .with(file_layer)
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_format, cli.log_file.as_deref(), cli.verbose)?;
    cli.execute().await
}
