//! HTTP client for a remote graph engine service.
//!
//! Every operation is a JSON `POST {base_url}/tables/{table}/{operation}`.
//! Connecting performs a handshake on `GET {base_url}/tables/{table}/info`;
//! the returned metadata is kept on the handle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{ChangeLog, ChunkedGraph, ContactSites, GraphBackend, GraphHandle, SplitRequest};
use crate::error::{GatewayError, GatewayResult};
use crate::ids::{NodeId, TableId};
use crate::params::Bounds;

/// Timeout applied to every engine call.
const ENGINE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Deserialize)]
struct RootResponse {
    root_id: NodeId,
}

#[derive(Deserialize)]
struct RootsResponse {
    root_ids: Vec<NodeId>,
}

#[derive(Deserialize)]
struct NodeIdsResponse {
    node_ids: Vec<NodeId>,
}

#[derive(Deserialize)]
struct EdgesResponse {
    edges: Vec<[NodeId; 2]>,
}

#[derive(Deserialize)]
struct EngineErrorBody {
    message: String,
}

/// Map a non-success engine response onto the gateway taxonomy.
async fn engine_error(response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<EngineErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or(body);

    match status {
        400 => GatewayError::ClientInput(message),
        404 => GatewayError::NotFound(message),
        _ => GatewayError::upstream(status, format!("Graph engine error ({status}): {message}")),
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    GatewayError::upstream(502, format!("Graph engine unreachable: {err}"))
}

fn bounds_json(bounds: Option<Bounds>) -> Value {
    bounds.map_or(Value::Null, |b| json!({ "min": b.min, "max": b.max }))
}

fn epoch_secs(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1e6
}

/// Handle to one table on the remote engine.
pub struct RemoteGraph {
    table: TableId,
    info: Value,
    base_url: String,
    client: reqwest::Client,
}

impl RemoteGraph {
    async fn call<T: DeserializeOwned>(&self, operation: &str, body: Value) -> GatewayResult<T> {
        let url = format!("{}/tables/{}/{}", self.base_url, self.table, operation);
        debug!(url = %url, "Calling graph engine");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(engine_error(response).await);
        }

        response.json().await.map_err(|e| {
            GatewayError::upstream(502, format!("Malformed graph engine response: {e}"))
        })
    }
}

#[async_trait]
impl ChunkedGraph for RemoteGraph {
    fn table(&self) -> &TableId {
        &self.table
    }

    async fn dataset_info(&self) -> GatewayResult<Value> {
        Ok(self.info.clone())
    }

    async fn get_root(&self, node: NodeId, at: DateTime<Utc>) -> GatewayResult<NodeId> {
        let r: RootResponse = self
            .call("root", json!({ "node_id": node, "timestamp": epoch_secs(at) }))
            .await?;
        Ok(r.root_id)
    }

    async fn get_children(&self, node: NodeId) -> GatewayResult<Vec<NodeId>> {
        let r: NodeIdsResponse = self.call("children", json!({ "node_id": node })).await?;
        Ok(r.node_ids)
    }

    async fn get_leaves(&self, node: NodeId, bounds: Option<Bounds>) -> GatewayResult<Vec<NodeId>> {
        let r: NodeIdsResponse = self
            .call("leaves", json!({ "node_id": node, "bounds": bounds_json(bounds) }))
            .await?;
        Ok(r.node_ids)
    }

    async fn get_atomic_edges(
        &self,
        node: NodeId,
        bounds: Option<Bounds>,
    ) -> GatewayResult<Vec<[NodeId; 2]>> {
        let r: EdgesResponse = self
            .call("atomic_edges", json!({ "node_id": node, "bounds": bounds_json(bounds) }))
            .await?;
        Ok(r.edges)
    }

    async fn get_change_log(&self, root: NodeId, since: DateTime<Utc>) -> GatewayResult<ChangeLog> {
        self.call("change_log", json!({ "root_id": root, "since": epoch_secs(since) }))
            .await
    }

    async fn get_merge_log(&self, root: NodeId, since: DateTime<Utc>) -> GatewayResult<ChangeLog> {
        self.call("merge_log", json!({ "root_id": root, "since": epoch_secs(since) }))
            .await
    }

    async fn get_contact_sites(
        &self,
        root: NodeId,
        bounds: Option<Bounds>,
        partners: bool,
    ) -> GatewayResult<ContactSites> {
        self.call(
            "contact_sites",
            json!({ "root_id": root, "bounds": bounds_json(bounds), "partners": partners }),
        )
        .await
    }

    async fn merge(&self, user_id: &str, atomic_ids: [NodeId; 2]) -> GatewayResult<NodeId> {
        let r: RootResponse = self
            .call("merge", json!({ "user_id": user_id, "atomic_ids": atomic_ids }))
            .await?;
        Ok(r.root_id)
    }

    async fn split(&self, user_id: &str, request: &SplitRequest) -> GatewayResult<Vec<NodeId>> {
        let r: RootsResponse = self
            .call(
                "split",
                json!({ "user_id": user_id, "sources": request.sources, "sinks": request.sinks }),
            )
            .await?;
        Ok(r.root_ids)
    }
}

/// Backend that opens [`RemoteGraph`] handles against one engine service.
#[derive(Clone)]
pub struct RemoteBackend {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteBackend {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(ENGINE_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl GraphBackend for RemoteBackend {
    async fn connect(&self, table: &TableId) -> GatewayResult<GraphHandle> {
        let url = format!("{}/tables/{}/info", self.base_url, table);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(engine_error(response).await);
        }
        let info: Value = response.json().await.map_err(|e| {
            GatewayError::upstream(502, format!("Malformed graph engine response: {e}"))
        })?;

        info!(table = %table, base_url = %self.base_url, "Connected to graph engine");
        Ok(Arc::new(RemoteGraph {
            table: table.clone(),
            info,
            base_url: self.base_url.clone(),
            client: self.client.clone(),
        }))
    }
}
