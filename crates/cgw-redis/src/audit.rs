//! Audit log store. One Redis stream per table.

use async_trait::async_trait;
use cgw_core::audit::{AuditLogEntry, AuditSink};
use redis::streams::StreamMaxlen;
use redis::AsyncCommands;

use crate::client::RedisPool;

/// Stream suffix for requests that never resolved a table.
pub const UNSCOPED: &str = "_unscoped";

/// Stream key holding the audit entries of `table`.
pub fn stream_key(table: Option<&str>) -> String {
    format!("cgw:audit:{}", table.unwrap_or(UNSCOPED))
}

/// Flatten an entry into stream fields.
pub fn entry_fields(entry: &AuditLogEntry) -> Vec<(&'static str, String)> {
    vec![
        ("user_id", entry.user_id.clone()),
        ("user_ip", entry.user_ip.clone()),
        ("request_time", entry.request_time.to_rfc3339()),
        ("response_time_ms", format!("{:.3}", entry.response_time_ms)),
        ("url", entry.url.clone()),
        ("request_data", entry.request_body.clone()),
        ("request_type", entry.request_type.clone()),
        ("status_code", entry.status_code.to_string()),
    ]
}

/// Appends audit entries to capped Redis streams.
#[derive(Clone)]
pub struct RedisAuditSink {
    pool: RedisPool,
    maxlen: usize,
}

impl RedisAuditSink {
    pub fn new(pool: RedisPool, maxlen: usize) -> Self {
        Self { pool, maxlen }
    }
}

#[async_trait]
impl AuditSink for RedisAuditSink {
    async fn record(&self, entry: &AuditLogEntry) -> anyhow::Result<()> {
        let key = stream_key(entry.table_id.as_deref());
        let fields = entry_fields(entry);

        let mut conn = self.pool.clone();
        conn.xadd_maxlen::<_, _, _, _, ()>(&key, StreamMaxlen::Approx(self.maxlen), "*", &fields)
            .await?;
        Ok(())
    }
}
