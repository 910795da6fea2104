//! Binary encoding of node-id results.
//!
//! Ids are written as consecutive little-endian `u64` values with no
//! delimiter or length prefix, so a payload of `n` bytes holds `n / 8` ids.
//! This matches the native layout of a `uint64` array on the platforms the
//! engine clients run on.

use crate::error::{GatewayError, GatewayResult};
use crate::ids::NodeId;

/// Width of one encoded id in bytes.
pub const ID_WIDTH: usize = 8;

/// Encode a sequence of ids.
pub fn encode(ids: &[NodeId]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ids.len() * ID_WIDTH);
    for id in ids {
        out.extend_from_slice(&id.to_le_bytes());
    }
    out
}

/// Decode a payload produced by [`encode`].
pub fn decode(bytes: &[u8]) -> GatewayResult<Vec<NodeId>> {
    if bytes.len() % ID_WIDTH != 0 {
        return Err(GatewayError::client_input(format!(
            "Binary id payload length {} is not a multiple of {ID_WIDTH}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(ID_WIDTH)
        .map(|chunk| {
            let mut word = [0u8; ID_WIDTH];
            word.copy_from_slice(chunk);
            NodeId::from_le_bytes(word)
        })
        .collect())
}
