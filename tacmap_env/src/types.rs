//! Common types for the TacMap environment abstraction.

use serde::{Deserialize, Serialize};

/// Identifier of an upstream feed delivering record batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedId(pub u16);

impl std::fmt::Display for FeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "feed-{}", self.0)
    }
}

/// Envelope for one raw record batch handed over by the transport.
///
/// The payload is opaque bytes (a JSON array of opcode records) that the
/// fusion engine decodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEnvelope {
    /// Feed the batch arrived on
    pub feed: FeedId,

    /// Per-feed sequence number assigned by the sender
    pub sequence: u64,

    /// The raw batch bytes
    pub payload: Vec<u8>,

    /// Receive time on the local clock (ms since context start)
    pub received_ms: u64,
}

impl BatchEnvelope {
    /// Creates a new envelope from payload bytes.
    pub fn new(feed: FeedId, sequence: u64, payload: Vec<u8>, received_ms: u64) -> Self {
        Self {
            feed,
            sequence,
            payload,
            received_ms,
        }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
