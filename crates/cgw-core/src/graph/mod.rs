//! Graph engine contract.
//!
//! The segmentation engine is an external collaborator. The gateway only
//! talks to it through [`ChunkedGraph`] handles produced by a
//! [`GraphBackend`].

pub mod memory;
pub mod remote;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult};
use crate::ids::{NodeId, TableId};
use crate::params::Bounds;

pub use memory::{InMemoryGraph, MemoryBackend};
pub use remote::RemoteBackend;

/// Live handle to one table's graph. Cheap to clone, expensive to create.
pub type GraphHandle = Arc<dyn ChunkedGraph>;

/// Kind of a committed graph edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Merge,
    Split,
}

/// One committed edit as reported in change and merge logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_id: u64,
    pub kind: OperationKind,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub added_edges: Vec<[NodeId; 2]>,
    #[serde(default)]
    pub removed_edges: Vec<[NodeId; 2]>,
    pub old_root_ids: Vec<NodeId>,
    pub new_root_ids: Vec<NodeId>,
}

/// Edit history of a root: the operations that shaped it and the root ids
/// it replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub operations: Vec<OperationRecord>,
    pub past_ids: Vec<NodeId>,
}

/// Contact-site map: partner root id (decimal string) or `"all"` to the
/// coordinates of the contacts.
pub type ContactSites = BTreeMap<String, Vec<[i64; 3]>>;

/// Key used in [`ContactSites`] when partners are not resolved.
pub const ALL_PARTNERS: &str = "all";

/// A split seed: a supervoxel id, optionally with the coordinate the user
/// clicked. Accepts `123` or `[123, x, y, z]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SplitPoint {
    Bare(NodeId),
    Located(NodeId, f64, f64, f64),
}

impl SplitPoint {
    pub fn id(&self) -> NodeId {
        match self {
            Self::Bare(id) | Self::Located(id, ..) => *id,
        }
    }
}

/// Body of a split request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitRequest {
    pub sources: Vec<SplitPoint>,
    pub sinks: Vec<SplitPoint>,
}

impl SplitRequest {
    /// Reject requests without seeds on both sides or with a seed on both.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.sources.is_empty() || self.sinks.is_empty() {
            return Err(GatewayError::client_input(
                "Split requires at least one source and one sink",
            ));
        }
        if let Some(shared) = self
            .sources
            .iter()
            .find(|s| self.sinks.iter().any(|t| t.id() == s.id()))
        {
            return Err(GatewayError::client_input(format!(
                "Supervoxel {} is both a source and a sink",
                shared.id()
            )));
        }
        Ok(())
    }

    pub fn source_ids(&self) -> Vec<NodeId> {
        self.sources.iter().map(SplitPoint::id).collect()
    }

    pub fn sink_ids(&self) -> Vec<NodeId> {
        self.sinks.iter().map(SplitPoint::id).collect()
    }
}

/// Operations the gateway delegates to the graph engine for one table.
#[async_trait]
pub trait ChunkedGraph: Send + Sync {
    fn table(&self) -> &TableId;

    /// Dataset metadata as reported by the engine.
    async fn dataset_info(&self) -> GatewayResult<serde_json::Value>;

    /// Root of `node` as of `at`.
    async fn get_root(&self, node: NodeId, at: DateTime<Utc>) -> GatewayResult<NodeId>;

    async fn get_children(&self, node: NodeId) -> GatewayResult<Vec<NodeId>>;

    /// Atomic ids under `node`, optionally restricted to `bounds`.
    async fn get_leaves(&self, node: NodeId, bounds: Option<Bounds>) -> GatewayResult<Vec<NodeId>>;

    /// Atomic edges inside the segment, optionally restricted to `bounds`.
    async fn get_atomic_edges(
        &self,
        node: NodeId,
        bounds: Option<Bounds>,
    ) -> GatewayResult<Vec<[NodeId; 2]>>;

    /// Operations that shaped `root` since `since`.
    async fn get_change_log(&self, root: NodeId, since: DateTime<Utc>) -> GatewayResult<ChangeLog>;

    /// Merge-only subset of [`ChunkedGraph::get_change_log`].
    async fn get_merge_log(&self, root: NodeId, since: DateTime<Utc>) -> GatewayResult<ChangeLog>;

    async fn get_contact_sites(
        &self,
        root: NodeId,
        bounds: Option<Bounds>,
        partners: bool,
    ) -> GatewayResult<ContactSites>;

    /// Join the segments containing the two supervoxels; returns the new root.
    async fn merge(&self, user_id: &str, atomic_ids: [NodeId; 2]) -> GatewayResult<NodeId>;

    /// Separate sources from sinks; returns the new roots.
    async fn split(&self, user_id: &str, request: &SplitRequest) -> GatewayResult<Vec<NodeId>>;
}

/// Constructs graph handles. Called once per table per process on a cache miss.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    async fn connect(&self, table: &TableId) -> GatewayResult<GraphHandle>;
}

/// Flatten an edge list into `[a0, b0, a1, b1, ...]` for binary encoding.
pub fn flatten_edges(edges: &[[NodeId; 2]]) -> Vec<NodeId> {
    edges.iter().flat_map(|edge| edge.iter().copied()).collect()
}
