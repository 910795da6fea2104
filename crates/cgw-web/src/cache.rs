//! Process-local registry of graph handles.
//!
//! Each worker process keeps its own cache; the same table may be open once
//! per process. Within a process a table maps to a single handle. First
//! accesses that race on an uncached table may each construct a handle;
//! the first one stored wins and the others are dropped.

use cgw_core::graph::{GraphBackend, GraphHandle};
use cgw_core::{GatewayResult, TableId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone)]
pub struct GraphClientCache {
    backend: Arc<dyn GraphBackend>,
    table_prefix: String,
    handles: Arc<RwLock<HashMap<TableId, GraphHandle>>>,
}

impl GraphClientCache {
    pub fn new(backend: Arc<dyn GraphBackend>, table_prefix: &str) -> Self {
        Self {
            backend,
            table_prefix: table_prefix.to_string(),
            handles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Handle for `raw_table`, constructing it on first use.
    ///
    /// Ids failing the naming convention are rejected before anything is
    /// constructed or cached.
    pub async fn resolve(&self, raw_table: &str) -> GatewayResult<GraphHandle> {
        let table = TableId::parse(raw_table, &self.table_prefix)?;

        if let Some(handle) = self.handles.read().await.get(&table) {
            return Ok(handle.clone());
        }

        // Constructed outside the lock: a slow handshake must not block
        // lookups of other tables.
        let handle = self.backend.connect(&table).await?;
        debug!(table = %table, "Graph handle constructed");

        let mut handles = self.handles.write().await;
        Ok(handles.entry(table).or_insert(handle).clone())
    }

    /// Number of cached tables.
    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
