//! Notification bus for real-time WebSocket updates.
//!
//! Each process fans events out to its own connections through a tokio
//! broadcast channel. With Redis configured, `publish` goes to a Redis
//! pub/sub channel instead, and a relay task in every process forwards
//! what arrives on that channel into the local broadcast. An event
//! published by any process therefore reaches the connections of all of
//! them, including its own. A publish-only bus (the CLI) skips the relay.
//!
//! Delivery is at-most-once: no persistence, no replay, and a subscriber
//! that falls behind the channel capacity loses the oldest events.

use cgw_core::notify::NotificationEvent;
use futures::StreamExt;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::client::{RedisPool, RedisResult};

/// Capacity of the process-local broadcast channel.
pub const LOCAL_CAPACITY: usize = 100;

const RELAY_BACKOFF_MIN: Duration = Duration::from_millis(500);
const RELAY_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Type alias for the broadcast sender.
pub type BroadcastSender = broadcast::Sender<NotificationEvent>;

/// Type alias for the broadcast receiver.
pub type BroadcastReceiver = broadcast::Receiver<NotificationEvent>;

#[derive(Clone)]
struct RedisTransport {
    pool: RedisPool,
    channel: String,
}

impl RedisTransport {
    async fn publish(&self, event: &NotificationEvent) -> RedisResult<()> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.pool.clone();
        conn.publish::<_, _, ()>(&self.channel, payload).await?;
        Ok(())
    }
}

/// Broadcast channel shared by every connected client of every process.
#[derive(Clone)]
pub struct NotificationBus {
    local: BroadcastSender,
    transport: Option<RedisTransport>,
    publish_timeout: Duration,
}

impl NotificationBus {
    /// Single-process bus: events only reach this process's connections.
    pub fn local(publish_timeout: Duration) -> Self {
        let (local, _rx) = broadcast::channel(LOCAL_CAPACITY);
        Self {
            local,
            transport: None,
            publish_timeout,
        }
    }

    /// Publish-only bus over Redis pub/sub. Nothing is subscribed to the
    /// channel, so local subscribers never see any event.
    pub async fn publisher(redis_url: &str, channel: &str, publish_timeout: Duration) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Self::with_transport(client, channel, publish_timeout).await
    }

    /// Cross-process bus over Redis pub/sub. Spawns this process's relay.
    pub async fn redis(redis_url: &str, channel: &str, publish_timeout: Duration) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let bus = Self::with_transport(client.clone(), channel, publish_timeout).await?;

        tokio::spawn(run_relay(client, channel.to_string(), bus.local.clone()));
        info!(channel, "Notification relay started");
        Ok(bus)
    }

    async fn with_transport(client: redis::Client, channel: &str, publish_timeout: Duration) -> RedisResult<Self> {
        let pool = RedisPool::new(client).await?;
        Ok(Self {
            transport: Some(RedisTransport {
                pool,
                channel: channel.to_string(),
            }),
            ..Self::local(publish_timeout)
        })
    }

    /// Register a new subscriber. It sees events published after this call.
    pub fn subscribe(&self) -> BroadcastReceiver {
        self.local.subscribe()
    }

    /// Number of subscribers in this process.
    pub fn receiver_count(&self) -> usize {
        self.local.receiver_count()
    }

    /// Publish an event. Fire-and-forget: failures and timeouts are logged
    /// and swallowed.
    pub async fn publish(&self, event: &NotificationEvent) {
        let Some(transport) = &self.transport else {
            let delivered = self.local.send(event.clone()).unwrap_or(0);
            debug!(kind = %event.kind, delivered, "Notification broadcast locally");
            return;
        };

        match tokio::time::timeout(self.publish_timeout, transport.publish(event)).await {
            Ok(Ok(())) => debug!(kind = %event.kind, channel = %transport.channel, "Notification published"),
            Ok(Err(e)) => debug!(kind = %event.kind, error = %e, "Notification publish failed"),
            Err(_) => debug!(kind = %event.kind, "Notification publish timed out"),
        }
    }
}

/// Keep one subscription to `channel` alive for the life of the process.
async fn run_relay(client: redis::Client, channel: String, local: BroadcastSender) {
    let mut backoff = RELAY_BACKOFF_MIN;
    loop {
        match relay_once(&client, &channel, &local).await {
            Ok(()) => {
                warn!(channel = %channel, "Notification subscription closed, resubscribing");
                backoff = RELAY_BACKOFF_MIN;
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, retry_in_ms = backoff.as_millis() as u64, "Notification relay failed");
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RELAY_BACKOFF_MAX);
    }
}

async fn relay_once(client: &redis::Client, channel: &str, local: &BroadcastSender) -> RedisResult<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    debug!(channel, "Subscribed to notification channel");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        if let Some(event) = decode_event(msg.get_payload_bytes()) {
            let _ = local.send(event);
        }
    }
    Ok(())
}

/// Parse one pub/sub payload. Payloads that are not UTF-8 JSON events are
/// dropped with a debug line.
fn decode_event(payload: &[u8]) -> Option<NotificationEvent> {
    let text = match std::str::from_utf8(payload) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "Dropping non-text notification payload");
            return None;
        }
    };
    match serde_json::from_str::<NotificationEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "Dropping malformed notification payload");
            None
        }
    }
}
