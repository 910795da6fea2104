//! Table-level graph routes: info, root lookup and edits.

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use cgw_core::graph::SplitRequest;
use cgw_core::ids::{parse_node_id, parse_node_ids};
use cgw_core::notify::NotificationEvent;
use cgw_core::params::parse_timestamp;
use cgw_core::{GatewayError, NodeId};
use chrono::Utc;
use tracing::debug;

use super::{GraphQuery, NodeIds};
use crate::auth::{require_editor, Credentials};
use crate::context::RequestContext;
use crate::error::ApiError;
use crate::state::GatewayState;

pub async fn info(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(table): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ctx.set_request_type("info");
    let cg = state.graph(&ctx, &table).await?;
    Ok(Json(cg.dataset_info().await?))
}

/// Root lookup with the node id as the first element of a JSON array body.
pub async fn root_from_body(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(table): Path<String>,
    Query(query): Query<GraphQuery>,
    body: Bytes,
) -> Result<NodeIds, ApiError> {
    ctx.set_request_type("root");
    let node = parse_node_ids(&body)?
        .first()
        .copied()
        .ok_or_else(|| GatewayError::client_input("Request body must contain a node id"))?;
    lookup_root(&state, &ctx, &table, node, query.timestamp.as_deref()).await
}

pub async fn root(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path((table, node)): Path<(String, String)>,
    Query(query): Query<GraphQuery>,
) -> Result<NodeIds, ApiError> {
    ctx.set_request_type("root");
    let node = parse_node_id(&node)?;
    lookup_root(&state, &ctx, &table, node, query.timestamp.as_deref()).await
}

async fn lookup_root(
    state: &GatewayState,
    ctx: &RequestContext,
    table: &str,
    node: NodeId,
    timestamp: Option<&str>,
) -> Result<NodeIds, ApiError> {
    let at = parse_timestamp(timestamp, Utc::now())?;
    let cg = state.graph(ctx, table).await?;
    let root = cg.get_root(node, at).await?;
    Ok(NodeIds(vec![root]))
}

/// Merge the segments of two supervoxels. Body: JSON array of two ids.
pub async fn merge(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(table): Path<String>,
    credentials: Credentials,
    body: Bytes,
) -> Result<NodeIds, ApiError> {
    ctx.set_request_type("merge");
    let user = require_editor(&state, &ctx, &credentials).await?;

    let ids = parse_node_ids(&body)?;
    let atomic_ids: [NodeId; 2] = ids.as_slice().try_into().map_err(|_| {
        GatewayError::client_input(format!("Merge requires exactly two node ids, got {}", ids.len()))
    })?;
    debug!(?atomic_ids, user_id = %user.id, "Merge requested");

    let cg = state.graph(&ctx, &table).await?;
    let new_root = cg.merge(&user.id, atomic_ids).await?;

    state
        .bus
        .publish(&NotificationEvent::mutation("merge", cg.table(), &user.id, vec![new_root]))
        .await;
    Ok(NodeIds(vec![new_root]))
}

/// Split a segment. Body: `{"sources": [...], "sinks": [...]}`.
pub async fn split(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(table): Path<String>,
    credentials: Credentials,
    body: Bytes,
) -> Result<NodeIds, ApiError> {
    ctx.set_request_type("split");
    let user = require_editor(&state, &ctx, &credentials).await?;

    let request: SplitRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::client_input(format!("Malformed split request: {e}")))?;
    request.validate()?;
    debug!(sources = ?request.source_ids(), sinks = ?request.sink_ids(), user_id = %user.id, "Split requested");

    let cg = state.graph(&ctx, &table).await?;
    let new_roots = cg.split(&user.id, &request).await?;

    state
        .bus
        .publish(&NotificationEvent::mutation("split", cg.table(), &user.id, new_roots.clone()))
        .await;
    Ok(NodeIds(new_roots))
}
