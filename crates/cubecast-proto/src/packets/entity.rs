//! Entity spawn, movement and removal.

use bytes::{Buf, BufMut};

use super::{id, ServerMessage};
use crate::codec::{self, ensure_remaining, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::types::Position;

/// Spawn a named player entity (0x07).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddEntity {
    pub id: u8,
    pub name: String,
    pub position: Position,
}

impl AddEntity {
    pub fn new(id: u8, name: impl Into<String>, position: Position) -> Self {
        Self {
            id,
            name: name.into(),
            position,
        }
    }
}

impl ServerMessage for AddEntity {
    const ID: u8 = id::ADD_ENTITY;
}

impl ProtoEncode for AddEntity {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.id);
        codec::write_string(buf, &self.name);
        self.position.proto_encode(buf);
    }
}

/// ExtPlayerList v2 spawn with a separate skin name (0x21).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtAddEntity2 {
    pub id: u8,
    pub display_name: String,
    pub skin_name: String,
    pub position: Position,
}

impl ExtAddEntity2 {
    pub fn new(
        id: u8,
        display_name: impl Into<String>,
        skin_name: impl Into<String>,
        position: Position,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            skin_name: skin_name.into(),
            position,
        }
    }
}

impl ServerMessage for ExtAddEntity2 {
    const ID: u8 = id::EXT_ADD_ENTITY2;
}

impl ProtoEncode for ExtAddEntity2 {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.id);
        codec::write_string(buf, &self.display_name);
        codec::write_string(buf, &self.skin_name);
        self.position.proto_encode(buf);
    }
}

/// Absolute position (0x08). Inbound, `id` is the held block (or 255).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Teleport {
    pub id: u8,
    pub position: Position,
}

impl Teleport {
    pub fn new(id: u8, position: Position) -> Self {
        Self { id, position }
    }
}

impl ServerMessage for Teleport {
    const ID: u8 = id::TELEPORT;
}

impl ProtoEncode for Teleport {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.id);
        self.position.proto_encode(buf);
    }
}

impl ProtoDecode for Teleport {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ensure_remaining(buf, 1)?;
        let id = buf.get_u8();
        let position = Position::proto_decode(buf)?;
        Ok(Self { id, position })
    }
}

/// Relative move plus absolute orientation (0x09).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRotate {
    pub id: u8,
    pub dx: i8,
    pub dy: i8,
    pub dz: i8,
    pub yaw: u8,
    pub pitch: u8,
}

impl ServerMessage for MoveRotate {
    const ID: u8 = id::MOVE_ROTATE;
}

impl ProtoEncode for MoveRotate {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.id);
        buf.put_i8(self.dx);
        buf.put_i8(self.dy);
        buf.put_i8(self.dz);
        buf.put_u8(self.yaw);
        buf.put_u8(self.pitch);
    }
}

/// Relative move (0x0A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub id: u8,
    pub dx: i8,
    pub dy: i8,
    pub dz: i8,
}

impl ServerMessage for Move {
    const ID: u8 = id::MOVE;
}

impl ProtoEncode for Move {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.id);
        buf.put_i8(self.dx);
        buf.put_i8(self.dy);
        buf.put_i8(self.dz);
    }
}

/// Orientation only (0x0B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotate {
    pub id: u8,
    pub yaw: u8,
    pub pitch: u8,
}

impl ServerMessage for Rotate {
    const ID: u8 = id::ROTATE;
}

impl ProtoEncode for Rotate {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.id);
        buf.put_u8(self.yaw);
        buf.put_u8(self.pitch);
    }
}

/// Despawn (0x0C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveEntity {
    pub id: u8,
}

impl ServerMessage for RemoveEntity {
    const ID: u8 = id::REMOVE_ENTITY;
}

impl ProtoEncode for RemoveEntity {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.id);
    }
}

/// Swap the model an entity is drawn with (0x1D).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeModel {
    pub id: u8,
    pub model: String,
}

impl ServerMessage for ChangeModel {
    const ID: u8 = id::CHANGE_MODEL;
}

impl ProtoEncode for ChangeModel {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.id);
        codec::write_string(buf, &self.model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn teleport_roundtrip() {
        let original = Teleport::new(255, Position::new(-5, 300, 7, 128, 64));
        let mut buf = BytesMut::new();
        original.proto_encode(&mut buf);
        assert_eq!(Teleport::proto_decode(&mut buf.freeze()).unwrap(), original);
    }

    #[test]
    fn move_encodes_signed_deltas() {
        let mut buf = BytesMut::new();
        Move { id: 2, dx: -1, dy: 127, dz: -128 }.proto_encode(&mut buf);
        assert_eq!(&buf[..], &[2, 0xFF, 0x7F, 0x80]);
    }
}
