//! CGW Core Library
//!
//! Domain types and collaborator contracts for the chunked-graph gateway:
//! node and table identifiers, the error taxonomy, the binary id codec,
//! the graph-engine and authorization interfaces, audit records and
//! notification events.

pub mod audit;
pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod graph;
pub mod ids;
pub mod notify;
pub mod params;

pub use error::{GatewayError, GatewayResult};
pub use ids::{NodeId, TableId};
