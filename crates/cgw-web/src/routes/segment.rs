//! Segment-level read routes.

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use cgw_core::graph::{flatten_edges, ChangeLog, ContactSites};
use cgw_core::ids::parse_node_id;
use cgw_core::params::{parse_flag, parse_timestamp, Bounds};
use chrono::{DateTime, Utc};

use super::{GraphQuery, NodeIds};
use crate::context::RequestContext;
use crate::error::ApiError;
use crate::state::GatewayState;

type SegmentPath = Path<(String, String)>;

pub async fn children(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path((table, node)): SegmentPath,
) -> Result<NodeIds, ApiError> {
    ctx.set_request_type("children");
    let node = parse_node_id(&node)?;
    let cg = state.graph(&ctx, &table).await?;
    Ok(NodeIds(cg.get_children(node).await?))
}

pub async fn leaves(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path((table, node)): SegmentPath,
    Query(query): Query<GraphQuery>,
) -> Result<NodeIds, ApiError> {
    ctx.set_request_type("leaves");
    let node = parse_node_id(&node)?;
    let bounds = Bounds::parse_opt(query.bounds.as_deref())?;
    let cg = state.graph(&ctx, &table).await?;
    Ok(NodeIds(cg.get_leaves(node, bounds).await?))
}

/// Atomic edges of a segment, flattened to `[a0, b0, a1, b1, ...]`.
pub async fn subgraph(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path((table, node)): SegmentPath,
    Query(query): Query<GraphQuery>,
) -> Result<NodeIds, ApiError> {
    ctx.set_request_type("subgraph");
    let node = parse_node_id(&node)?;
    let bounds = Bounds::parse_opt(query.bounds.as_deref())?;
    let cg = state.graph(&ctx, &table).await?;
    let edges = cg.get_atomic_edges(node, bounds).await?;
    Ok(NodeIds(flatten_edges(&edges)))
}

pub async fn change_log(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path((table, node)): SegmentPath,
    Query(query): Query<GraphQuery>,
) -> Result<Json<ChangeLog>, ApiError> {
    ctx.set_request_type("change_log");
    let root = parse_node_id(&node)?;
    let since = parse_timestamp(query.timestamp.as_deref(), DateTime::<Utc>::UNIX_EPOCH)?;
    let cg = state.graph(&ctx, &table).await?;
    Ok(Json(cg.get_change_log(root, since).await?))
}

pub async fn merge_log(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path((table, node)): SegmentPath,
    Query(query): Query<GraphQuery>,
) -> Result<Json<ChangeLog>, ApiError> {
    ctx.set_request_type("merge_log");
    let root = parse_node_id(&node)?;
    let since = parse_timestamp(query.timestamp.as_deref(), DateTime::<Utc>::UNIX_EPOCH)?;
    let cg = state.graph(&ctx, &table).await?;
    Ok(Json(cg.get_merge_log(root, since).await?))
}

pub async fn contact_sites(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path((table, node)): SegmentPath,
    Query(query): Query<GraphQuery>,
) -> Result<Json<ContactSites>, ApiError> {
    ctx.set_request_type("contact_sites");
    let root = parse_node_id(&node)?;
    let bounds = Bounds::parse_opt(query.bounds.as_deref())?;
    let partners = parse_flag(query.partners.as_deref(), "partners")?;
    let cg = state.graph(&ctx, &table).await?;
    Ok(Json(cg.get_contact_sites(root, bounds, partners).await?))
}
