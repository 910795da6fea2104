//! Per-request context.

use cgw_core::TableId;
use chrono::{DateTime, Utc};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

#[derive(Debug)]
struct ContextInner {
    start_time: Instant,
    start_date: DateTime<Utc>,
    request_type: OnceLock<&'static str>,
    table_id: OnceLock<String>,
    user_id: OnceLock<String>,
}

/// State threaded through one request, from the entry hook to the exit
/// hook. Created fresh for every request; clones share the same request.
///
/// Tags are write-once: the first value set wins.
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

impl RequestContext {
    /// Capture the monotonic start time and the wall-clock start date.
    pub fn start() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                start_time: Instant::now(),
                start_date: Utc::now(),
                request_type: OnceLock::new(),
                table_id: OnceLock::new(),
                user_id: OnceLock::new(),
            }),
        }
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.inner.start_date
    }

    /// Milliseconds since [`RequestContext::start`].
    pub fn elapsed_ms(&self) -> f64 {
        self.inner.start_time.elapsed().as_secs_f64() * 1000.0
    }

    /// Tag the logical operation ("root", "merge", ...). Recorded, never
    /// interpreted.
    pub fn set_request_type(&self, tag: &'static str) {
        let _ = self.inner.request_type.set(tag);
    }

    pub fn request_type(&self) -> &str {
        self.inner.request_type.get().copied().unwrap_or("")
    }

    pub fn set_table(&self, table: &TableId) {
        let _ = self.inner.table_id.set(table.to_string());
    }

    pub fn table_id(&self) -> Option<&str> {
        self.inner.table_id.get().map(String::as_str)
    }

    pub fn set_user(&self, user_id: &str) {
        let _ = self.inner.user_id.set(user_id.to_string());
    }

    pub fn user_id(&self) -> &str {
        self.inner.user_id.get().map(String::as_str).unwrap_or("")
    }
}
