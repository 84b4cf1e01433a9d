//! Keepalive, kick and operator flag.

use bytes::BufMut;

use super::{id, ServerMessage};
use crate::codec::{self, ProtoEncode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping;

impl ServerMessage for Ping {
    const ID: u8 = id::PING;
}

impl ProtoEncode for Ping {
    fn proto_encode(&self, _buf: &mut impl BufMut) {}
}

/// Disconnect screen with a reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kick {
    pub reason: String,
}

impl Kick {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ServerMessage for Kick {
    const ID: u8 = id::KICK;
}

impl ProtoEncode for Kick {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        codec::write_string(buf, &self.reason);
    }
}

/// Lets the client delete admincrete when `op` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetPermission {
    pub op: bool,
}

impl ServerMessage for SetPermission {
    const ID: u8 = id::SET_PERMISSION;
}

impl ProtoEncode for SetPermission {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(if self.op { 0x64 } else { 0 });
    }
}
