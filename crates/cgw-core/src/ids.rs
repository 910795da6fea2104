//! Table and node identifiers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{GatewayError, GatewayResult};

/// 64-bit graph node identifier (supervoxel, intermediate node or root).
pub type NodeId = u64;

/// Identifier of one dataset/graph instance served by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(String);

impl TableId {
    /// Validate a raw table id against the naming convention.
    ///
    /// The id must start with `prefix` and contain only ASCII alphanumerics,
    /// `_` or `-`.
    pub fn parse(raw: &str, prefix: &str) -> GatewayResult<Self> {
        let well_formed = !raw.is_empty()
            && raw.starts_with(prefix)
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if well_formed {
            Ok(Self(raw.to_string()))
        } else {
            Err(GatewayError::InvalidTable(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a decimal node id from a path segment.
pub fn parse_node_id(raw: &str) -> GatewayResult<NodeId> {
    raw.trim()
        .parse::<NodeId>()
        .map_err(|_| GatewayError::client_input(format!("'{raw}' is not a valid node id")))
}

/// Parse a JSON array of node ids from a request body.
///
/// Elements may be JSON integers or decimal strings; clients that cannot
/// represent 64-bit integers exactly send the latter.
pub fn parse_node_ids(body: &[u8]) -> GatewayResult<Vec<NodeId>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::client_input(format!("Request body is not valid JSON: {e}")))?;

    let Value::Array(items) = value else {
        return Err(GatewayError::client_input(
            "Request body must be a JSON array of node ids",
        ));
    };

    items
        .iter()
        .map(|item| match item {
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| GatewayError::client_input(format!("'{n}' is not a valid node id"))),
            Value::String(s) => parse_node_id(s),
            other => Err(GatewayError::client_input(format!(
                "'{other}' is not a valid node id"
            ))),
        })
        .collect()
}
