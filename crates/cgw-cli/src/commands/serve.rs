//! Gateway server command.

use anyhow::Result;
use cgw_core::config::{BackendConfig, Environment, GatewayConfig};
use cgw_web::GatewayState;
use clap::{Args, ValueEnum};
use colored::Colorize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Memory,
    Remote,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Graph engine backend
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Graph engine URL (remote backend)
    #[arg(long)]
    pub engine_url: Option<String>,

    /// Redis URL for the audit log and cross-process notifications
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Hide failure traces from error responses
    #[arg(long)]
    pub production: bool,
}

impl ServeArgs {
    /// Flags override file and environment settings.
    fn apply(self, config: &mut GatewayConfig) -> Result<()> {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(url) = self.redis_url {
            config.redis_url = Some(url);
        }
        if self.production {
            config.environment = Environment::Production;
        }

        match (self.backend, self.engine_url) {
            (Some(BackendKind::Memory), _) => config.backend = BackendConfig::Memory { seed_demo: true },
            (Some(BackendKind::Remote) | None, Some(url)) => config.backend = BackendConfig::Remote { url },
            (Some(BackendKind::Remote), None) => {
                if !matches!(config.backend, BackendConfig::Remote { .. }) {
                    anyhow::bail!("--backend remote requires --engine-url");
                }
            }
            (None, None) => {}
        }
        Ok(())
    }
}

pub async fn execute(args: ServeArgs, mut config: GatewayConfig) -> Result<()> {
    args.apply(&mut config)?;

    let backend = match &config.backend {
        BackendConfig::Memory { .. } => "memory".to_string(),
        BackendConfig::Remote { url } => url.clone(),
    };
    let bus = if config.redis_url.is_some() { "redis" } else { "local" };
    let addr = format!("{}:{}", config.host, config.port);

    let state = GatewayState::from_config(config).await?;

    println!();
    println!("  {} {}", "CGW".cyan().bold(), "ChunkedGraph Gateway".bold());
    println!();
    println!("  {}        http://{}/1.0/{{table}}", "API".green(), addr);
    println!("  {}  ws://{}/ws", "WebSocket".green(), addr);
    println!("  {}    {}", "Backend".green(), backend);
    println!("  {}        {}", "Bus".green(), bus);
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();

    cgw_web::run_server(state).await?;

    Ok(())
}
