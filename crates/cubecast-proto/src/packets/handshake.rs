//! Identification (0x00): client → server on connect, server → client as the
//! MOTD screen.

use bytes::{Buf, BufMut};

use super::{id, ServerMessage};
use crate::codec::{self, ensure_remaining, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::PROTOCOL_VERSION;

/// Trailing byte a CPE-capable client puts in its identification packet.
pub const CPE_MAGIC: u8 = 0x42;

/// User type byte shown to operators.
const USER_TYPE_OP: u8 = 0x64;

/// Sent by the client as the first packet of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentification {
    pub protocol_version: u8,
    pub username: String,
    /// Name-verification token (MD5 of salt and name), or a placeholder.
    pub verification_key: String,
    /// [`CPE_MAGIC`] when the client supports protocol extensions.
    pub magic: u8,
}

impl PlayerIdentification {
    pub fn supports_extensions(&self) -> bool {
        self.magic == CPE_MAGIC
    }

    pub fn check_version(&self) -> Result<(), ProtoError> {
        if self.protocol_version == PROTOCOL_VERSION {
            Ok(())
        } else {
            Err(ProtoError::ProtocolVersionMismatch {
                expected: PROTOCOL_VERSION,
                got: self.protocol_version,
            })
        }
    }
}

impl ProtoEncode for PlayerIdentification {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.protocol_version);
        codec::write_string(buf, &self.username);
        codec::write_string(buf, &self.verification_key);
        buf.put_u8(self.magic);
    }
}

impl ProtoDecode for PlayerIdentification {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ensure_remaining(buf, 1)?;
        let protocol_version = buf.get_u8();
        let username = codec::read_string(buf)?;
        let verification_key = codec::read_string(buf)?;
        ensure_remaining(buf, 1)?;
        let magic = buf.get_u8();
        Ok(Self {
            protocol_version,
            username,
            verification_key,
            magic,
        })
    }
}

/// Server name and MOTD. Sent once on login and again as a loading screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentification {
    pub name: String,
    pub motd: String,
    pub op: bool,
}

impl ServerIdentification {
    pub fn new(name: impl Into<String>, motd: impl Into<String>, op: bool) -> Self {
        Self {
            name: name.into(),
            motd: motd.into(),
            op,
        }
    }
}

impl ServerMessage for ServerIdentification {
    const ID: u8 = id::HANDSHAKE;
}

impl ProtoEncode for ServerIdentification {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(PROTOCOL_VERSION);
        codec::write_string(buf, &self.name);
        codec::write_string(buf, &self.motd);
        buf.put_u8(if self.op { USER_TYPE_OP } else { 0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn identification_roundtrip() {
        let original = PlayerIdentification {
            protocol_version: 7,
            username: "Steve".into(),
            verification_key: "0123456789abcdef".into(),
            magic: CPE_MAGIC,
        };
        let mut buf = BytesMut::new();
        original.proto_encode(&mut buf);
        assert_eq!(buf.len(), 130);
        let decoded = PlayerIdentification::proto_decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, original);
        assert!(decoded.supports_extensions());
    }

    #[test]
    fn older_protocol_is_rejected() {
        let mut ident = PlayerIdentification {
            protocol_version: PROTOCOL_VERSION,
            username: "Steve".into(),
            verification_key: "-".into(),
            magic: 0,
        };
        assert!(ident.check_version().is_ok());
        ident.protocol_version = 6;
        assert!(matches!(
            ident.check_version(),
            Err(ProtoError::ProtocolVersionMismatch { expected: 7, got: 6 })
        ));
    }

    #[test]
    fn server_identification_marks_ops() {
        let mut buf = BytesMut::new();
        ServerIdentification::new("srv", "motd", true).proto_encode(&mut buf);
        assert_eq!(buf[0], PROTOCOL_VERSION);
        assert_eq!(buf[129], USER_TYPE_OP);
    }
}
