//! Protocol-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("buffer too short: need {needed} more bytes, have {remaining}")]
    BufferTooShort { needed: usize, remaining: usize },

    #[error("unknown packet opcode {0}")]
    UnknownOpcode(u8),

    /// A known packet that has no place in the current phase.
    #[error("unexpected packet opcode {got} (expected {expected})")]
    UnexpectedOpcode { expected: &'static str, got: u8 },

    #[error("protocol version mismatch: expected {expected}, got {got}")]
    ProtocolVersionMismatch { expected: u8, got: u8 },
}
