//! CLI command definitions and handlers.

use anyhow::Result;
use cgw_core::config::GatewayConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod publish;
pub mod serve;

/// ChunkedGraph Gateway - HTTP front end for chunked segmentation graphs
#[derive(Parser)]
#[command(name = "cgw")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "CGW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway
    Serve(serve::ServeArgs),

    /// Publish a diagnostic notification through the configured bus
    Publish(publish::PublishArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = GatewayConfig::load(self.config.as_deref())?;

        match self.command {
            Commands::Serve(args) => serve::execute(args, config).await,
            Commands::Publish(args) => publish::execute(args, config).await,
        }
    }
}
