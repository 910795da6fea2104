//! Real-time notification events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{NodeId, TableId};

/// Event kind sent to a client right after it connects.
pub const CONNECTED: &str = "connected";

/// Opaque broadcast payload announcing a committed change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub new_root_ids: Vec<NodeId>,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            table_id: None,
            user_id: None,
            new_root_ids: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// A committed merge or split.
    pub fn mutation(kind: &str, table: &TableId, user_id: &str, new_root_ids: Vec<NodeId>) -> Self {
        Self {
            table_id: Some(table.to_string()),
            user_id: Some(user_id.to_string()),
            new_root_ids,
            ..Self::new(kind)
        }
    }

    /// Greeting sent on a fresh connection.
    pub fn connected() -> Self {
        Self::new(CONNECTED)
    }
}
