//! Chat message (0x0D), both directions.

use bytes::{Buf, BufMut};

use super::{id, ServerMessage};
use crate::codec::{self, ensure_remaining, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

/// Where a message shows up on a MessageTypes client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    Chat,
    Status1,
    Status2,
    Status3,
    BottomRight1,
    BottomRight2,
    BottomRight3,
    Announcement,
}

impl MessageClass {
    pub fn type_byte(self) -> u8 {
        match self {
            Self::Chat => 0,
            Self::Status1 => 1,
            Self::Status2 => 2,
            Self::Status3 => 3,
            Self::BottomRight1 => 11,
            Self::BottomRight2 => 12,
            Self::BottomRight3 => 13,
            Self::Announcement => 100,
        }
    }
}

/// Chat line. Outbound, `kind` is the message type; inbound it is the
/// continuation flag (LongerMessages) or an unused player id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: u8,
    pub text: String,
}

impl Message {
    pub fn new(kind: u8, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

impl ServerMessage for Message {
    const ID: u8 = id::MESSAGE;
}

impl ProtoEncode for Message {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.kind);
        codec::write_string(buf, &self.text);
    }
}

impl ProtoDecode for Message {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ensure_remaining(buf, 1)?;
        let kind = buf.get_u8();
        let text = codec::read_string(buf)?;
        Ok(Self { kind, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn message_roundtrip() {
        let original = Message::new(1, "part one of a long line");
        let mut buf = BytesMut::new();
        original.proto_encode(&mut buf);
        assert_eq!(buf.len(), 65);
        assert_eq!(Message::proto_decode(&mut buf.freeze()).unwrap(), original);
    }
}
