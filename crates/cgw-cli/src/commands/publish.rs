//! Diagnostic notification publish.

use anyhow::{Context, Result};
use cgw_core::config::GatewayConfig;
use cgw_core::notify::NotificationEvent;
use cgw_core::TableId;
use cgw_redis::NotificationBus;
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct PublishArgs {
    /// Table the event refers to
    #[arg(long)]
    pub table: Option<String>,

    /// Event kind
    #[arg(long, default_value = "ping")]
    pub kind: String,

    /// Root ids to include in the event
    #[arg(long = "root", value_delimiter = ',')]
    pub roots: Vec<u64>,
}

impl PublishArgs {
    fn event(&self, config: &GatewayConfig) -> Result<NotificationEvent> {
        let Some(raw) = &self.table else {
            return Ok(NotificationEvent {
                new_root_ids: self.roots.clone(),
                ..NotificationEvent::new(self.kind.as_str())
            });
        };
        let table = TableId::parse(raw, &config.table_prefix)?;
        Ok(NotificationEvent::mutation(&self.kind, &table, "cli", self.roots.clone()))
    }
}

pub async fn execute(args: PublishArgs, config: GatewayConfig) -> Result<()> {
    let redis_url = config
        .redis_url
        .as_deref()
        .context("publish needs a Redis URL (set redis_url or CGW_REDIS_URL)")?;

    let event = args.event(&config)?;
    let bus = NotificationBus::publisher(redis_url, &config.notification_channel, config.publish_timeout()).await?;
    bus.publish(&event).await;

    println!(
        "{} {} {} {}",
        "Published".green().bold(),
        event.kind.cyan(),
        "on".dimmed(),
        config.notification_channel
    );
    println!("  {}", event.id.to_string().dimmed());
    Ok(())
}
