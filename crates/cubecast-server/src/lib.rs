//! Session engine for a classic protocol game server: login, CPE
//! negotiation, world transfer, entity view sync and movement checks.

pub mod bans;
pub mod config;
pub mod error;
pub mod hooks;
pub mod player_db;
pub mod rank;
pub mod registry;
pub mod server;
pub mod session;
pub mod verify;

pub use error::{LeaveReason, SessionError};
pub use server::Server;
pub use session::{SessionHandle, SessionState};

/// Log target for activity worth an operator's attention (bans, failed
/// verification, protocol abuse, speedhacking).
pub const LOG_SUSPICIOUS: &str = "cubecast::suspicious";

/// Log target for faults caught while handling a client message.
pub const LOG_CRASH: &str = "cubecast::crash";
