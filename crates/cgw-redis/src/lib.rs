//! CGW Redis Layer
//!
//! Redis-backed collaborators shared by every gateway process: the audit
//! log store (one stream per table) and the pub/sub transport behind the
//! notification bus.

pub mod audit;
pub mod broadcast;
pub mod client;

pub use audit::RedisAuditSink;
pub use broadcast::{BroadcastReceiver, BroadcastSender, NotificationBus};
pub use client::{init_pool, RedisError, RedisPool, RedisResult};
