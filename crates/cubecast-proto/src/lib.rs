//! Classic protocol (version 7) types, packet layouts and the CPE capability set.

pub mod block;
pub mod capability;
pub mod codec;
pub mod error;
pub mod packets;
pub mod types;

/// Protocol version spoken by every supported client.
pub const PROTOCOL_VERSION: u8 = 7;
