//! Route handlers.

pub mod graph;
pub mod index;
pub mod segment;

use axum::http::header;
use axum::response::{IntoResponse, Response};
use cgw_core::{codec, NodeId};
use serde::Deserialize;

/// Node ids encoded as packed little-endian u64s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIds(pub Vec<NodeId>);

impl IntoResponse for NodeIds {
    fn into_response(self) -> Response {
        (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            codec::encode(&self.0),
        )
            .into_response()
    }
}

/// Query parameters shared by graph and segment routes. Unknown keys are
/// ignored.
#[derive(Debug, Default, Deserialize)]
pub struct GraphQuery {
    pub timestamp: Option<String>,
    pub bounds: Option<String>,
    pub partners: Option<String>,
}
