//! Session errors and the reason recorded when a session ends.

use std::io;

use cubecast_proto::error::ProtoError;
use thiserror::Error;

/// Why a session ended. Stored atomically on the session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LeaveReason {
    Unknown = 0,
    ClientQuit = 1,
    Kick = 2,
    ProtocolViolation = 3,
    InvalidOpcodeKick = 4,
    UnverifiedName = 5,
    LoginFailed = 6,
    ServerFull = 7,
    WorldFull = 8,
    ServerError = 9,
    ServerShutdown = 10,
    Timeout = 11,
}

impl LeaveReason {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::ClientQuit,
            2 => Self::Kick,
            3 => Self::ProtocolViolation,
            4 => Self::InvalidOpcodeKick,
            5 => Self::UnverifiedName,
            6 => Self::LoginFailed,
            7 => Self::ServerFull,
            8 => Self::WorldFull,
            9 => Self::ServerError,
            10 => Self::ServerShutdown,
            11 => Self::Timeout,
            _ => Self::Unknown,
        }
    }

    /// Whether this ending is worth flagging to operators.
    pub fn is_suspicious(self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation | Self::InvalidOpcodeKick | Self::UnverifiedName
        )
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed or out-of-place packet, wrong protocol version.
    #[error("{message}")]
    ProtocolViolation {
        message: String,
        reason: LeaveReason,
    },

    #[error("Unknown packet opcode {0}")]
    UnknownOpcode(u8),

    /// Ban, failed name verification, paid-account gate, cancelled login.
    #[error("{message}")]
    LoginFailed {
        message: String,
        reason: LeaveReason,
    },

    #[error("{0}")]
    ServerFull(String),

    #[error("{0}")]
    WorldFull(String),

    #[error("connection lost: {0}")]
    ClientQuit(#[from] io::Error),

    #[error("connection closed by client")]
    Closed,

    #[error("connection timed out")]
    TimedOut,

    /// A kick packet was delivered; nothing more to tell the client.
    #[error("kicked ({0:?})")]
    Kicked(LeaveReason),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
            reason: LeaveReason::ProtocolViolation,
        }
    }

    pub fn login(message: impl Into<String>, reason: LeaveReason) -> Self {
        Self::LoginFailed {
            message: message.into(),
            reason,
        }
    }

    pub fn leave_reason(&self) -> LeaveReason {
        match self {
            Self::ProtocolViolation { reason, .. } | Self::LoginFailed { reason, .. } => *reason,
            Self::UnknownOpcode(_) => LeaveReason::InvalidOpcodeKick,
            Self::ServerFull(_) => LeaveReason::ServerFull,
            Self::WorldFull(_) => LeaveReason::WorldFull,
            Self::ClientQuit(_) | Self::Closed => LeaveReason::ClientQuit,
            Self::TimedOut => LeaveReason::Timeout,
            Self::Kicked(reason) => *reason,
            Self::Internal(_) => LeaveReason::ServerError,
        }
    }

    /// Text for the terminal kick packet, if the client can still get one.
    pub fn client_message(&self) -> Option<String> {
        match self {
            Self::ProtocolViolation { message, .. } | Self::LoginFailed { message, .. } => {
                Some(message.clone())
            }
            Self::UnknownOpcode(_) | Self::ServerFull(_) | Self::WorldFull(_) => {
                Some(self.to_string())
            }
            Self::TimedOut => Some("Connection timed out".to_string()),
            Self::Internal(_) => Some("Server error, sorry!".to_string()),
            Self::ClientQuit(_) | Self::Closed | Self::Kicked(_) => None,
        }
    }
}

impl From<ProtoError> for SessionError {
    fn from(err: ProtoError) -> Self {
        match err {
            ProtoError::UnknownOpcode(op) => Self::UnknownOpcode(op),
            ProtoError::UnexpectedOpcode { expected, got } => {
                Self::protocol(format!("Expected {expected}, got opcode {got}"))
            }
            ProtoError::ProtocolVersionMismatch { .. } => {
                Self::protocol("Incompatible protocol version!")
            }
            other => Self::protocol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_opcode_kick_text() {
        let err = SessionError::from(ProtoError::UnknownOpcode(255));
        assert_eq!(err.client_message().as_deref(), Some("Unknown packet opcode 255"));
        assert_eq!(err.leave_reason(), LeaveReason::InvalidOpcodeKick);
    }

    #[test]
    fn phase_errors_become_protocol_kicks() {
        let err = SessionError::from(ProtoError::UnexpectedOpcode {
            expected: "ExtEntry",
            got: 13,
        });
        assert_eq!(
            err.client_message().as_deref(),
            Some("Expected ExtEntry, got opcode 13")
        );
        assert_eq!(err.leave_reason(), LeaveReason::ProtocolViolation);

        let err = SessionError::from(ProtoError::ProtocolVersionMismatch { expected: 7, got: 6 });
        assert_eq!(
            err.client_message().as_deref(),
            Some("Incompatible protocol version!")
        );
        assert_eq!(err.leave_reason(), LeaveReason::ProtocolViolation);
    }

    #[test]
    fn transport_errors_are_quiet_quits() {
        let err = SessionError::from(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(err.leave_reason(), LeaveReason::ClientQuit);
        assert!(err.client_message().is_none());
    }

    #[test]
    fn leave_reason_survives_u8() {
        for reason in [LeaveReason::Kick, LeaveReason::WorldFull, LeaveReason::Timeout] {
            assert_eq!(LeaveReason::from_u8(reason as u8), reason);
        }
        assert_eq!(LeaveReason::from_u8(200), LeaveReason::Unknown);
    }
}
