//! In-process graph engine.
//!
//! A two-level graph: supervoxels with 3-D positions grouped into root
//! segments by their active atomic edges. Roots are immutable: an edit
//! retires the roots it touches and creates new ones. Every root keeps the
//! leaves and edges it was created with, and every supervoxel keeps a timestamped
//! history of the roots it belonged to, so point-in-time root lookups and
//! edit logs behave like a versioned engine. Used for development serving
//! and tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    ChangeLog, ChunkedGraph, ContactSites, GraphBackend, GraphHandle, OperationKind,
    OperationRecord, SplitRequest, ALL_PARTNERS,
};
use crate::error::{GatewayError, GatewayResult};
use crate::ids::{NodeId, TableId};
use crate::params::Bounds;

/// First id handed out to root segments. Keeps roots clear of supervoxel ids.
pub const ROOT_ID_BASE: NodeId = 1 << 56;

#[derive(Debug, Clone)]
struct RootRecord {
    leaves: Vec<NodeId>,
    edges: Vec<[NodeId; 2]>,
}

#[derive(Debug, Default)]
struct GraphState {
    positions: HashMap<NodeId, [i64; 3]>,
    /// Every known atomic edge, keyed by ordered pair; value is "active".
    edges: HashMap<[NodeId; 2], bool>,
    history: HashMap<NodeId, Vec<(DateTime<Utc>, NodeId)>>,
    roots: HashMap<NodeId, RootRecord>,
    operations: Vec<OperationRecord>,
    next_root: NodeId,
}

fn edge_key(a: NodeId, b: NodeId) -> [NodeId; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}

impl GraphState {
    fn current_root(&self, supervoxel: NodeId) -> GatewayResult<NodeId> {
        self.history
            .get(&supervoxel)
            .and_then(|h| h.last())
            .map(|(_, root)| *root)
            .ok_or_else(|| GatewayError::not_found(format!("Supervoxel {supervoxel} not found")))
    }

    fn root_record(&self, root: NodeId) -> GatewayResult<&RootRecord> {
        self.roots
            .get(&root)
            .ok_or_else(|| GatewayError::not_found(format!("Segment {root} not found")))
    }

    fn require_supervoxel(&self, id: NodeId) -> GatewayResult<()> {
        if self.positions.contains_key(&id) {
            Ok(())
        } else if self.roots.contains_key(&id) {
            Err(GatewayError::client_input(format!(
                "{id} is a segment id, expected a supervoxel id"
            )))
        } else {
            Err(GatewayError::not_found(format!("Supervoxel {id} not found")))
        }
    }

    fn active_edges_within(&self, leaves: &HashSet<NodeId>) -> Vec<[NodeId; 2]> {
        let mut edges: Vec<[NodeId; 2]> = self
            .edges
            .iter()
            .filter(|(key, active)| **active && leaves.contains(&key[0]) && leaves.contains(&key[1]))
            .map(|(key, _)| *key)
            .collect();
        edges.sort_unstable();
        edges
    }

    fn in_bounds(&self, id: NodeId, bounds: Option<Bounds>) -> bool {
        match (bounds, self.positions.get(&id)) {
            (None, _) => true,
            (Some(b), Some(pos)) => b.contains(*pos),
            (Some(_), None) => false,
        }
    }

    /// Create a root for `leaves` at `at` and point their history at it.
    fn create_root(&mut self, mut leaves: Vec<NodeId>, at: DateTime<Utc>) -> NodeId {
        leaves.sort_unstable();
        let root = self.next_root;
        self.next_root += 1;

        let set: HashSet<NodeId> = leaves.iter().copied().collect();
        let edges = self.active_edges_within(&set);
        for leaf in &leaves {
            self.history.entry(*leaf).or_default().push((at, root));
        }
        self.roots.insert(
            root,
            RootRecord {
                leaves,
                edges,
            },
        );
        root
    }

    /// Roots this root descends from, plus the operations that produced them.
    fn lineage(&self, root: NodeId) -> (Vec<NodeId>, Vec<&OperationRecord>) {
        let mut seen: HashSet<NodeId> = HashSet::from([root]);
        let mut queue: VecDeque<NodeId> = VecDeque::from([root]);
        let mut ops: BTreeSet<u64> = BTreeSet::new();

        while let Some(current) = queue.pop_front() {
            for op in &self.operations {
                if op.new_root_ids.contains(&current) && ops.insert(op.operation_id) {
                    for old in &op.old_root_ids {
                        if seen.insert(*old) {
                            queue.push_back(*old);
                        }
                    }
                }
            }
        }

        seen.remove(&root);
        let mut past: Vec<NodeId> = seen.into_iter().collect();
        past.sort_unstable();
        let records = self
            .operations
            .iter()
            .filter(|op| ops.contains(&op.operation_id))
            .collect();
        (past, records)
    }
}

/// Group `nodes` into connected components over `edges`.
fn components(nodes: &[NodeId], edges: &[[NodeId; 2]]) -> Vec<Vec<NodeId>> {
    let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for [a, b] in edges {
        adjacency.entry(*a).or_default().push(*b);
        adjacency.entry(*b).or_default().push(*a);
    }

    let mut sorted = nodes.to_vec();
    sorted.sort_unstable();

    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut groups = Vec::new();
    for start in sorted {
        if !visited.insert(start) {
            continue;
        }
        let mut group = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for next in adjacency.get(&node).into_iter().flatten() {
                if visited.insert(*next) {
                    group.push(*next);
                    queue.push_back(*next);
                }
            }
        }
        group.sort_unstable();
        groups.push(group);
    }
    groups
}

/// Builder for [`InMemoryGraph`] fixtures.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    supervoxels: Vec<(NodeId, [i64; 3])>,
    edges: Vec<(NodeId, NodeId, bool)>,
    info: Option<serde_json::Value>,
}

impl GraphBuilder {
    pub fn supervoxel(mut self, id: NodeId, position: [i64; 3]) -> Self {
        self.supervoxels.push((id, position));
        self
    }

    /// Active edge: both ends belong to the same segment.
    pub fn edge(mut self, a: NodeId, b: NodeId) -> Self {
        self.edges.push((a, b, true));
        self
    }

    /// Inactive edge: the supervoxels touch but are not joined.
    pub fn contact(mut self, a: NodeId, b: NodeId) -> Self {
        self.edges.push((a, b, false));
        self
    }

    pub fn info(mut self, info: serde_json::Value) -> Self {
        self.info = Some(info);
        self
    }

    /// Seal the fixture; every initial segment is created at `at`.
    pub fn build(self, table: TableId, at: DateTime<Utc>) -> GatewayResult<InMemoryGraph> {
        let mut state = GraphState {
            next_root: ROOT_ID_BASE,
            ..GraphState::default()
        };

        for (id, position) in &self.supervoxels {
            if *id >= ROOT_ID_BASE {
                return Err(GatewayError::client_input(format!(
                    "Supervoxel id {id} collides with the root id range"
                )));
            }
            state.positions.insert(*id, *position);
        }
        for (a, b, active) in &self.edges {
            for id in [a, b] {
                if !state.positions.contains_key(id) {
                    return Err(GatewayError::not_found(format!("Supervoxel {id} not found")));
                }
            }
            state.edges.insert(edge_key(*a, *b), *active);
        }

        let nodes: Vec<NodeId> = state.positions.keys().copied().collect();
        let active: Vec<[NodeId; 2]> = state
            .edges
            .iter()
            .filter(|(_, active)| **active)
            .map(|(key, _)| *key)
            .collect();
        for group in components(&nodes, &active) {
            state.create_root(group, at);
        }

        let info = self.info.unwrap_or_else(|| {
            json!({
                "table_id": table.as_str(),
                "n_layers": 2,
                "n_supervoxels": state.positions.len(),
                "root_id_base": ROOT_ID_BASE,
            })
        });

        Ok(InMemoryGraph {
            table,
            info,
            state: RwLock::new(state),
        })
    }
}

/// Versioned in-process graph for one table.
#[derive(Debug)]
pub struct InMemoryGraph {
    table: TableId,
    info: serde_json::Value,
    state: RwLock<GraphState>,
}

impl InMemoryGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Demo dataset: a 10 x 10 grid of supervoxels (ids 1..=100) on one
    /// z-plane. Each row of ten is one segment; vertically adjacent
    /// supervoxels touch.
    pub fn demo(table: TableId) -> GatewayResult<Self> {
        let mut builder = Self::builder();
        let id = |x: i64, y: i64| (y * 10 + x + 1) as NodeId;
        for y in 0..10 {
            for x in 0..10 {
                builder = builder.supervoxel(id(x, y), [x * 8, y * 8, 0]);
                if x > 0 {
                    builder = builder.edge(id(x - 1, y), id(x, y));
                }
                if y > 0 {
                    builder = builder.contact(id(x, y - 1), id(x, y));
                }
            }
        }
        builder.build(table, Utc::now() - Duration::days(1))
    }

    /// Number of committed edits.
    pub async fn operation_count(&self) -> usize {
        self.state.read().await.operations.len()
    }

    /// Current root of a supervoxel.
    pub async fn current_root(&self, supervoxel: NodeId) -> GatewayResult<NodeId> {
        self.state.read().await.current_root(supervoxel)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_operation(
        state: &mut GraphState,
        kind: OperationKind,
        user_id: &str,
        at: DateTime<Utc>,
        added_edges: Vec<[NodeId; 2]>,
        removed_edges: Vec<[NodeId; 2]>,
        old_root_ids: Vec<NodeId>,
        new_root_ids: Vec<NodeId>,
    ) {
        let operation_id = state.operations.len() as u64 + 1;
        state.operations.push(OperationRecord {
            operation_id,
            kind,
            user_id: user_id.to_string(),
            timestamp: at,
            added_edges,
            removed_edges,
            old_root_ids,
            new_root_ids,
        });
    }
}

#[async_trait]
impl ChunkedGraph for InMemoryGraph {
    fn table(&self) -> &TableId {
        &self.table
    }

    async fn dataset_info(&self) -> GatewayResult<serde_json::Value> {
        Ok(self.info.clone())
    }

    async fn get_root(&self, node: NodeId, at: DateTime<Utc>) -> GatewayResult<NodeId> {
        let state = self.state.read().await;

        let supervoxel = if state.positions.contains_key(&node) {
            node
        } else {
            *state.root_record(node)?.leaves.first().ok_or_else(|| {
                GatewayError::not_found(format!("Segment {node} has no supervoxels"))
            })?
        };

        state
            .history
            .get(&supervoxel)
            .and_then(|h| h.iter().rev().find(|(t, _)| *t <= at))
            .map(|(_, root)| *root)
            .ok_or_else(|| GatewayError::not_found(format!("Node {node} did not exist at {at}")))
    }

    async fn get_children(&self, node: NodeId) -> GatewayResult<Vec<NodeId>> {
        let state = self.state.read().await;
        if state.positions.contains_key(&node) {
            return Ok(Vec::new());
        }
        Ok(state.root_record(node)?.leaves.clone())
    }

    async fn get_leaves(&self, node: NodeId, bounds: Option<Bounds>) -> GatewayResult<Vec<NodeId>> {
        let state = self.state.read().await;
        let leaves = if state.positions.contains_key(&node) {
            vec![node]
        } else {
            state.root_record(node)?.leaves.clone()
        };
        Ok(leaves
            .into_iter()
            .filter(|id| state.in_bounds(*id, bounds))
            .collect())
    }

    async fn get_atomic_edges(
        &self,
        node: NodeId,
        bounds: Option<Bounds>,
    ) -> GatewayResult<Vec<[NodeId; 2]>> {
        let state = self.state.read().await;
        let record = state.root_record(node)?;
        Ok(record
            .edges
            .iter()
            .filter(|[a, b]| state.in_bounds(*a, bounds) && state.in_bounds(*b, bounds))
            .copied()
            .collect())
    }

    async fn get_change_log(&self, root: NodeId, since: DateTime<Utc>) -> GatewayResult<ChangeLog> {
        let state = self.state.read().await;
        state.root_record(root)?;
        let (past_ids, ops) = state.lineage(root);
        Ok(ChangeLog {
            operations: ops
                .into_iter()
                .filter(|op| op.timestamp >= since)
                .cloned()
                .collect(),
            past_ids,
        })
    }

    async fn get_merge_log(&self, root: NodeId, since: DateTime<Utc>) -> GatewayResult<ChangeLog> {
        let mut log = self.get_change_log(root, since).await?;
        log.operations.retain(|op| op.kind == OperationKind::Merge);
        Ok(log)
    }

    async fn get_contact_sites(
        &self,
        root: NodeId,
        bounds: Option<Bounds>,
        partners: bool,
    ) -> GatewayResult<ContactSites> {
        let state = self.state.read().await;
        let leaves: HashSet<NodeId> = state.root_record(root)?.leaves.iter().copied().collect();

        let mut sites: HashMap<String, BTreeSet<[i64; 3]>> = HashMap::new();
        for ([a, b], _) in &state.edges {
            let (inside, outside) = match (leaves.contains(a), leaves.contains(b)) {
                (true, false) => (*a, *b),
                (false, true) => (*b, *a),
                _ => continue,
            };
            let Some(position) = state.positions.get(&inside) else {
                continue;
            };
            if bounds.is_some_and(|bb| !bb.contains(*position)) {
                continue;
            }
            let key = if partners {
                state.current_root(outside)?.to_string()
            } else {
                ALL_PARTNERS.to_string()
            };
            sites.entry(key).or_default().insert(*position);
        }

        Ok(sites
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().collect()))
            .collect())
    }

    async fn merge(&self, user_id: &str, atomic_ids: [NodeId; 2]) -> GatewayResult<NodeId> {
        let [a, b] = atomic_ids;
        if a == b {
            return Err(GatewayError::client_input("Cannot merge a supervoxel with itself"));
        }

        let mut state = self.state.write().await;
        state.require_supervoxel(a)?;
        state.require_supervoxel(b)?;

        let root_a = state.current_root(a)?;
        let root_b = state.current_root(b)?;
        if root_a == root_b {
            return Err(GatewayError::client_input(format!(
                "Supervoxels {a} and {b} already belong to segment {root_a}"
            )));
        }

        let now = Utc::now();
        state.edges.insert(edge_key(a, b), true);

        let mut leaves = state.root_record(root_a)?.leaves.clone();
        leaves.extend(state.root_record(root_b)?.leaves.iter().copied());
        let new_root = state.create_root(leaves, now);

        Self::record_operation(
            &mut state,
            OperationKind::Merge,
            user_id,
            now,
            vec![edge_key(a, b)],
            Vec::new(),
            vec![root_a, root_b],
            vec![new_root],
        );
        info!(table = %self.table, user_id, new_root, "Merge committed");
        Ok(new_root)
    }

    async fn split(&self, user_id: &str, request: &SplitRequest) -> GatewayResult<Vec<NodeId>> {
        request.validate()?;
        let sources = request.source_ids();
        let sinks = request.sink_ids();

        let mut state = self.state.write().await;
        for id in sources.iter().chain(&sinks) {
            state.require_supervoxel(*id)?;
        }

        let root = state.current_root(sources[0])?;
        for id in sources.iter().chain(&sinks) {
            if state.current_root(*id)? != root {
                return Err(GatewayError::client_input(
                    "Split sources and sinks must belong to the same segment",
                ));
            }
        }

        let leaves = state.root_record(root)?.leaves.clone();
        let leaf_set: HashSet<NodeId> = leaves.iter().copied().collect();
        let edges = state.active_edges_within(&leaf_set);

        // Label every leaf by whichever seed side reaches it first.
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for [a, b] in &edges {
            adjacency.entry(*a).or_default().push(*b);
            adjacency.entry(*b).or_default().push(*a);
        }
        let mut side: HashMap<NodeId, bool> = HashMap::new();
        let mut queue = VecDeque::new();
        for id in &sources {
            side.insert(*id, true);
            queue.push_back(*id);
        }
        for id in &sinks {
            side.insert(*id, false);
            queue.push_back(*id);
        }
        while let Some(node) = queue.pop_front() {
            let label = side[&node];
            for next in adjacency.get(&node).into_iter().flatten() {
                if !side.contains_key(next) {
                    side.insert(*next, label);
                    queue.push_back(*next);
                }
            }
        }

        let removed: Vec<[NodeId; 2]> = edges
            .iter()
            .filter(|[a, b]| side.get(a).copied().unwrap_or(true) != side.get(b).copied().unwrap_or(true))
            .copied()
            .collect();
        for key in &removed {
            state.edges.insert(*key, false);
        }

        let remaining = state.active_edges_within(&leaf_set);
        let now = Utc::now();
        let new_roots: Vec<NodeId> = components(&leaves, &remaining)
            .into_iter()
            .map(|group| state.create_root(group, now))
            .collect();

        debug!(removed = removed.len(), "Split removed atomic edges");
        Self::record_operation(
            &mut state,
            OperationKind::Split,
            user_id,
            now,
            Vec::new(),
            removed,
            vec![root],
            new_roots.clone(),
        );
        info!(table = %self.table, user_id, ?new_roots, "Split committed");
        Ok(new_roots)
    }
}

/// Backend serving [`InMemoryGraph`]s.
///
/// Registered graphs are returned as-is; unregistered tables get a fresh
/// demo dataset when `seed_demo` is set and are unknown otherwise.
#[derive(Default)]
pub struct MemoryBackend {
    graphs: HashMap<TableId, Arc<InMemoryGraph>>,
    seed_demo: bool,
    connects: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(seed_demo: bool) -> Self {
        Self {
            seed_demo,
            ..Self::default()
        }
    }

    pub fn with_graph(mut self, graph: Arc<InMemoryGraph>) -> Self {
        self.graphs.insert(graph.table().clone(), graph);
        self
    }

    /// How many handles this backend has constructed.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphBackend for MemoryBackend {
    async fn connect(&self, table: &TableId) -> GatewayResult<GraphHandle> {
        let handle: GraphHandle = match self.graphs.get(table) {
            Some(graph) => graph.clone(),
            None if self.seed_demo => Arc::new(InMemoryGraph::demo(table.clone())?),
            None => return Err(GatewayError::not_found(format!("Table '{table}' not found"))),
        };
        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!(table = %table, "In-memory graph handle created");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SplitPoint;

    fn table() -> TableId {
        TableId::parse("flyTest", "fly").unwrap()
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_500_000_000, 0).unwrap()
    }

    /// 1-2-3 form one segment, 4-5 another; 3 touches 4.
    fn fixture() -> InMemoryGraph {
        InMemoryGraph::builder()
            .supervoxel(1, [0, 0, 0])
            .supervoxel(2, [1, 0, 0])
            .supervoxel(3, [2, 0, 0])
            .supervoxel(4, [3, 0, 0])
            .supervoxel(5, [4, 0, 0])
            .edge(1, 2)
            .edge(2, 3)
            .edge(4, 5)
            .contact(3, 4)
            .build(table(), t0())
            .unwrap()
    }

    #[tokio::test]
    async fn test_initial_segments() {
        let g = fixture();
        let r1 = g.current_root(1).await.unwrap();
        let r4 = g.current_root(4).await.unwrap();
        assert_ne!(r1, r4);
        assert_eq!(g.get_children(r1).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(g.get_atomic_edges(r1, None).await.unwrap(), vec![[1, 2], [2, 3]]);
        assert!(g.get_children(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_root_is_point_in_time() {
        let g = fixture();
        let before = g.current_root(3).await.unwrap();
        let merged = g.merge("u1", [3, 4]).await.unwrap();

        assert_eq!(g.get_root(3, Utc::now()).await.unwrap(), merged);
        assert_eq!(g.get_root(3, t0()).await.unwrap(), before);
        assert!(g.get_root(3, t0() - Duration::seconds(1)).await.is_err());
        // Old root ids resolve to whatever their leaves belong to now.
        assert_eq!(g.get_root(before, Utc::now()).await.unwrap(), merged);
    }

    #[tokio::test]
    async fn test_merge_then_split_round() {
        let g = fixture();
        let merged = g.merge("u1", [3, 4]).await.unwrap();
        assert_eq!(g.get_leaves(merged, None).await.unwrap(), vec![1, 2, 3, 4, 5]);

        let req = SplitRequest {
            sources: vec![SplitPoint::Bare(1)],
            sinks: vec![SplitPoint::Bare(5)],
        };
        let new_roots = g.split("u2", &req).await.unwrap();
        assert_eq!(new_roots.len(), 2);
        assert_ne!(g.current_root(1).await.unwrap(), g.current_root(5).await.unwrap());
        assert_eq!(g.operation_count().await, 2);

        let log = g.get_change_log(new_roots[0], t0()).await.unwrap();
        assert_eq!(log.operations.len(), 2);
        assert!(log.past_ids.contains(&merged));

        let merges = g.get_merge_log(new_roots[0], t0()).await.unwrap();
        assert_eq!(merges.operations.len(), 1);
        assert_eq!(merges.operations[0].kind, OperationKind::Merge);

        let recent = g.get_change_log(new_roots[0], Utc::now() + Duration::seconds(5)).await.unwrap();
        assert!(recent.operations.is_empty());
    }

    #[tokio::test]
    async fn test_merge_rejects_same_segment() {
        let g = fixture();
        let err = g.merge("u1", [1, 3]).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(g.operation_count().await, 0);
    }

    #[tokio::test]
    async fn test_split_across_segments_rejected() {
        let g = fixture();
        let req = SplitRequest {
            sources: vec![SplitPoint::Bare(1)],
            sinks: vec![SplitPoint::Bare(5)],
        };
        assert_eq!(g.split("u1", &req).await.unwrap_err().status_code(), 400);
    }

    #[tokio::test]
    async fn test_leaves_and_edges_respect_bounds() {
        let g = fixture();
        let root = g.current_root(1).await.unwrap();
        let bounds = Bounds::parse("0-2_0-1_0-1").unwrap();
        assert_eq!(g.get_leaves(root, Some(bounds)).await.unwrap(), vec![1, 2]);
        assert_eq!(g.get_atomic_edges(root, Some(bounds)).await.unwrap(), vec![[1, 2]]);
    }

    #[tokio::test]
    async fn test_contact_sites() {
        let g = fixture();
        let r1 = g.current_root(1).await.unwrap();
        let r4 = g.current_root(4).await.unwrap();

        let all = g.get_contact_sites(r1, None, false).await.unwrap();
        assert_eq!(all.get(ALL_PARTNERS), Some(&vec![[2, 0, 0]]));

        let by_partner = g.get_contact_sites(r1, None, true).await.unwrap();
        assert_eq!(by_partner.get(&r4.to_string()), Some(&vec![[2, 0, 0]]));
    }

    #[tokio::test]
    async fn test_unknown_nodes() {
        let g = fixture();
        assert_eq!(g.get_children(999).await.unwrap_err().status_code(), 404);
        assert_eq!(g.merge("u", [1, 999]).await.unwrap_err().status_code(), 404);
    }

    #[tokio::test]
    async fn test_backend_registered_and_unknown_tables() {
        let graph = Arc::new(fixture());
        let backend = MemoryBackend::new(false).with_graph(graph);
        assert!(backend.connect(&table()).await.is_ok());

        let other = TableId::parse("flyOther", "fly").unwrap();
        assert_eq!(backend.connect(&other).await.err().unwrap().status_code(), 404);
        assert_eq!(backend.connect_count(), 1);

        let demo = MemoryBackend::new(true);
        let handle = demo.connect(&other).await.unwrap();
        let info = handle.dataset_info().await.unwrap();
        assert_eq!(info["n_supervoxels"], 100);
    }
}
