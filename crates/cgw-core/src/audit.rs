//! Per-request audit records.
//!
//! [`AuditLogger`] is best-effort: a sink failure or a slow sink is logged
//! at debug level and never reaches the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// One completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub table_id: Option<String>,
    pub user_id: String,
    pub user_ip: String,
    pub request_time: DateTime<Utc>,
    pub response_time_ms: f64,
    pub url: String,
    pub request_body: String,
    pub request_type: String,
    pub status_code: u16,
}

/// Durable destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditLogEntry) -> anyhow::Result<()>;
}

/// Sink that emits records as `info` events on the `cgw::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: &AuditLogEntry) -> anyhow::Result<()> {
        info!(
            target: "cgw::audit",
            table_id = entry.table_id.as_deref().unwrap_or(""),
            user_id = %entry.user_id,
            user_ip = %entry.user_ip,
            request_time = %entry.request_time.to_rfc3339(),
            response_time_ms = entry.response_time_ms,
            url = %entry.url,
            request_type = %entry.request_type,
            status_code = entry.status_code,
            "request"
        );
        Ok(())
    }
}

/// Bounded, failure-absorbing wrapper around an [`AuditSink`].
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Write `entry`. Never fails; at most waits for the configured timeout.
    pub async fn record(&self, entry: &AuditLogEntry) {
        match tokio::time::timeout(self.timeout, self.sink.record(entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, url = %entry.url, "Audit log entry not written"),
            Err(_) => debug!(
                timeout_ms = self.timeout.as_millis() as u64,
                url = %entry.url,
                "Audit log write timed out"
            ),
        }
    }
}
