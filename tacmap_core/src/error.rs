//! Errors for the fusion engine.
//!
//! None of these are fatal to the engine: ingest turns them into skip
//! entries of the `IngestReport` and keeps going.

use crate::entity::GlobalId;

/// Errors that can occur while decoding, validating or serving records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FusionError {
    #[error("Malformed record (opcode {opcode:?}): {reason}")]
    MalformedRecord { opcode: Option<u16>, reason: String },

    #[error("Unknown opcode: {0}")]
    UnknownOpcode(u16),

    #[error("Entity {0} was executed, record ignored")]
    EntityExecuted(GlobalId),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Fusion service is no longer running")]
    ServiceClosed,
}

impl FusionError {
    pub(crate) fn malformed(opcode: u16, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            opcode: Some(opcode),
            reason: reason.into(),
        }
    }

    /// Opcode the error refers to, when known.
    pub fn opcode(&self) -> Option<u16> {
        match self {
            Self::MalformedRecord { opcode, .. } => *opcode,
            Self::UnknownOpcode(code) => Some(*code),
            _ => None,
        }
    }
}
