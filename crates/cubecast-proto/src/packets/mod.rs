//! Packet definitions for classic protocol 7 plus the CPE extensions we speak.

pub mod block;
pub mod chat;
pub mod click;
pub mod control;
pub mod entity;
pub mod env;
pub mod ext;
pub mod handshake;
pub mod level;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::capability::CapabilitySet;
use crate::codec::{ensure_remaining, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

pub use block::{BulkBlockUpdate, SetBlock, SetBlockClient, SetBlockPermission, BULK_CAPACITY};
pub use chat::{Message, MessageClass};
pub use click::PlayerClicked;
pub use control::{Kick, Ping, SetPermission};
pub use entity::{AddEntity, ChangeModel, ExtAddEntity2, Move, MoveRotate, RemoveEntity, Rotate, Teleport};
pub use env::{
    EnvColor, EnvSetColor, EnvSetMapAppearance, EnvSetWeatherType, EnvironmentSettings,
    MapEnvProperty, SetMapEnvProperty, SetMapEnvUrl,
};
pub use ext::{CustomBlockSupportLevel, ExtEntry, ExtInfo, HackControl, HoldThis, SetClickDistance};
pub use handshake::{PlayerIdentification, ServerIdentification, CPE_MAGIC};
pub use level::{LevelDataChunk, LevelFinalize, LevelInitialize};

/// Packet opcodes.
pub mod id {
    pub const HANDSHAKE: u8 = 0x00;
    pub const PING: u8 = 0x01;
    pub const LEVEL_INITIALIZE: u8 = 0x02;
    pub const LEVEL_DATA_CHUNK: u8 = 0x03;
    pub const LEVEL_FINALIZE: u8 = 0x04;
    pub const SET_BLOCK_CLIENT: u8 = 0x05;
    pub const SET_BLOCK: u8 = 0x06;
    pub const ADD_ENTITY: u8 = 0x07;
    pub const TELEPORT: u8 = 0x08;
    pub const MOVE_ROTATE: u8 = 0x09;
    pub const MOVE: u8 = 0x0A;
    pub const ROTATE: u8 = 0x0B;
    pub const REMOVE_ENTITY: u8 = 0x0C;
    pub const MESSAGE: u8 = 0x0D;
    pub const KICK: u8 = 0x0E;
    pub const SET_PERMISSION: u8 = 0x0F;
    pub const EXT_INFO: u8 = 0x10;
    pub const EXT_ENTRY: u8 = 0x11;
    pub const SET_CLICK_DISTANCE: u8 = 0x12;
    pub const CUSTOM_BLOCK_SUPPORT_LEVEL: u8 = 0x13;
    pub const HOLD_THIS: u8 = 0x14;
    pub const ENV_SET_COLOR: u8 = 0x19;
    pub const SET_BLOCK_PERMISSION: u8 = 0x1C;
    pub const CHANGE_MODEL: u8 = 0x1D;
    pub const ENV_SET_MAP_APPEARANCE: u8 = 0x1E;
    pub const ENV_SET_WEATHER_TYPE: u8 = 0x1F;
    pub const HACK_CONTROL: u8 = 0x20;
    pub const EXT_ADD_ENTITY2: u8 = 0x21;
    pub const PLAYER_CLICKED: u8 = 0x22;
    pub const BULK_BLOCK_UPDATE: u8 = 0x26;
    pub const SET_MAP_ENV_URL: u8 = 0x28;
    pub const SET_MAP_ENV_PROPERTY: u8 = 0x29;
}

/// A message the server sends, tagged with its opcode.
pub trait ServerMessage: ProtoEncode {
    const ID: u8;
}

/// A pre-serialized outbound packet: opcode byte followed by the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    opcode: u8,
    bytes: Bytes,
}

impl Packet {
    /// Serialize a message into a ready-to-send frame.
    pub fn encode<M: ServerMessage>(message: &M) -> Self {
        let mut buf = BytesMut::with_capacity(server_frame_len(M::ID).unwrap_or(64));
        buf.put_u8(M::ID);
        message.proto_encode(&mut buf);
        Self {
            opcode: M::ID,
            bytes: buf.freeze(),
        }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Full frame including the opcode byte.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Frame length (opcode included) of packets the server sends. Used by
/// clients and test harnesses to split the outbound stream.
pub fn server_frame_len(opcode: u8) -> Option<usize> {
    let len = match opcode {
        id::HANDSHAKE => 131,
        id::PING | id::LEVEL_INITIALIZE => 1,
        id::LEVEL_DATA_CHUNK => 1028,
        id::LEVEL_FINALIZE => 7,
        id::SET_BLOCK => 8,
        id::ADD_ENTITY => 74,
        id::TELEPORT => 10,
        id::MOVE_ROTATE => 7,
        id::MOVE => 5,
        id::ROTATE => 4,
        id::REMOVE_ENTITY => 2,
        id::MESSAGE => 66,
        id::KICK => 65,
        id::SET_PERMISSION => 2,
        id::EXT_INFO => 67,
        id::EXT_ENTRY => 69,
        id::SET_CLICK_DISTANCE => 3,
        id::CUSTOM_BLOCK_SUPPORT_LEVEL => 2,
        id::HOLD_THIS => 3,
        id::ENV_SET_COLOR => 8,
        id::SET_BLOCK_PERMISSION => 4,
        id::CHANGE_MODEL => 66,
        // v1 is 69 bytes; readers that negotiated v2 see 73.
        id::ENV_SET_MAP_APPEARANCE => 73,
        id::ENV_SET_WEATHER_TYPE => 2,
        id::HACK_CONTROL => 8,
        id::EXT_ADD_ENTITY2 => 138,
        id::BULK_BLOCK_UPDATE => 1282,
        id::SET_MAP_ENV_URL => 65,
        id::SET_MAP_ENV_PROPERTY => 6,
        _ => return None,
    };
    Some(len)
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Which inbound opcodes are legal depends on where the session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the identification packet.
    Login,
    /// Exchanging CPE extension lists.
    Negotiation,
    /// Steady state.
    Play,
}

/// Frame length (opcode included) of an inbound packet, or `None` when the
/// opcode is not valid for `phase` and `caps`.
pub fn frame_len(opcode: u8, phase: Phase, caps: CapabilitySet) -> Option<usize> {
    match (phase, opcode) {
        (Phase::Login, id::HANDSHAKE) => Some(131),
        (Phase::Negotiation, id::EXT_INFO) => Some(67),
        (Phase::Negotiation, id::EXT_ENTRY) => Some(69),
        (Phase::Negotiation, id::CUSTOM_BLOCK_SUPPORT_LEVEL) => Some(2),
        (Phase::Negotiation | Phase::Play, id::PING) => Some(1),
        (Phase::Play, id::SET_BLOCK_CLIENT) => Some(9),
        (Phase::Play, id::TELEPORT) => Some(10),
        (Phase::Play, id::MESSAGE) => Some(66),
        (Phase::Play, id::PLAYER_CLICKED) if caps.contains(CapabilitySet::PLAYER_CLICK) => {
            Some(15)
        }
        _ => None,
    }
}

/// A decoded client → server packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    Handshake(PlayerIdentification),
    Ping,
    SetBlock(SetBlockClient),
    /// Movement. The id byte carries the held block for HeldBlock clients.
    Teleport(Teleport),
    Message(Message),
    ExtInfo(ExtInfo),
    ExtEntry(ExtEntry),
    CustomBlockSupportLevel(CustomBlockSupportLevel),
    PlayerClicked(PlayerClicked),
}

impl ClientPacket {
    /// Decode one complete frame, opcode byte included.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ensure_remaining(buf, 1)?;
        let opcode = buf.get_u8();
        let packet = match opcode {
            id::HANDSHAKE => Self::Handshake(PlayerIdentification::proto_decode(buf)?),
            id::PING => Self::Ping,
            id::SET_BLOCK_CLIENT => Self::SetBlock(SetBlockClient::proto_decode(buf)?),
            id::TELEPORT => Self::Teleport(Teleport::proto_decode(buf)?),
            id::MESSAGE => Self::Message(Message::proto_decode(buf)?),
            id::EXT_INFO => Self::ExtInfo(ExtInfo::proto_decode(buf)?),
            id::EXT_ENTRY => Self::ExtEntry(ExtEntry::proto_decode(buf)?),
            id::CUSTOM_BLOCK_SUPPORT_LEVEL => {
                Self::CustomBlockSupportLevel(CustomBlockSupportLevel::proto_decode(buf)?)
            }
            id::PLAYER_CLICKED => Self::PlayerClicked(PlayerClicked::proto_decode(buf)?),
            other => return Err(ProtoError::UnknownOpcode(other)),
        };
        Ok(packet)
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Self::Handshake(_) => id::HANDSHAKE,
            Self::Ping => id::PING,
            Self::SetBlock(_) => id::SET_BLOCK_CLIENT,
            Self::Teleport(_) => id::TELEPORT,
            Self::Message(_) => id::MESSAGE,
            Self::ExtInfo(_) => id::EXT_INFO,
            Self::ExtEntry(_) => id::EXT_ENTRY,
            Self::CustomBlockSupportLevel(_) => id::CUSTOM_BLOCK_SUPPORT_LEVEL,
            Self::PlayerClicked(_) => id::PLAYER_CLICKED,
        }
    }

    /// Error for this packet arriving where `expected` was due.
    pub fn unexpected(&self, expected: &'static str) -> ProtoError {
        ProtoError::UnexpectedOpcode {
            expected,
            got: self.opcode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;

    #[test]
    fn encoded_lengths_match_frame_table() {
        let samples = [
            Packet::encode(&Ping),
            Packet::encode(&Kick::new("bye")),
            Packet::encode(&Teleport::new(3, Position::ZERO)),
            Packet::encode(&Move { id: 1, dx: 1, dy: 2, dz: 3 }),
            Packet::encode(&Rotate { id: 1, yaw: 0, pitch: 0 }),
            Packet::encode(&MoveRotate { id: 1, dx: 0, dy: 0, dz: 0, yaw: 0, pitch: 0 }),
            Packet::encode(&RemoveEntity { id: 9 }),
            Packet::encode(&AddEntity::new(1, "Alice", Position::ZERO)),
            Packet::encode(&ExtAddEntity2::new(1, "Alice", "Alice", Position::ZERO)),
            Packet::encode(&Message::new(0, "hi")),
            Packet::encode(&LevelFinalize { x: 16, y: 16, z: 16 }),
            Packet::encode(&SetPermission { op: true }),
            Packet::encode(&ExtInfo::new("cubecast", 3)),
            Packet::encode(&ExtEntry::new("HeldBlock", 1)),
            Packet::encode(&HackControl::default()),
            Packet::encode(&SetBlockPermission { block: 7, allow_place: false, allow_delete: false }),
        ];
        for packet in samples {
            assert_eq!(
                Some(packet.len()),
                server_frame_len(packet.opcode()),
                "opcode {:#04x}",
                packet.opcode()
            );
        }
    }

    #[test]
    fn play_phase_rejects_login_opcodes() {
        let caps = CapabilitySet::empty();
        assert_eq!(frame_len(id::HANDSHAKE, Phase::Play, caps), None);
        assert_eq!(frame_len(id::EXT_INFO, Phase::Play, caps), None);
        assert_eq!(frame_len(id::TELEPORT, Phase::Play, caps), Some(10));
        assert_eq!(frame_len(0xFF, Phase::Play, caps), None);
    }

    #[test]
    fn click_requires_extension() {
        assert_eq!(frame_len(id::PLAYER_CLICKED, Phase::Play, CapabilitySet::empty()), None);
        assert_eq!(
            frame_len(id::PLAYER_CLICKED, Phase::Play, CapabilitySet::PLAYER_CLICK),
            Some(15)
        );
    }

    #[test]
    fn decode_movement_frame() {
        let frame: &[u8] = &[0x08, 0x05, 0x00, 0x40, 0x00, 0x80, 0xFF, 0xF0, 0x10, 0x20];
        let packet = ClientPacket::decode(&mut &frame[..]).unwrap();
        assert_eq!(
            packet,
            ClientPacket::Teleport(Teleport::new(5, Position::new(64, 128, -16, 16, 32)))
        );
    }

    #[test]
    fn decode_unknown_opcode() {
        let frame: &[u8] = &[0xFF];
        assert!(matches!(
            ClientPacket::decode(&mut &frame[..]),
            Err(ProtoError::UnknownOpcode(0xFF))
        ));
    }

    #[test]
    fn out_of_phase_packet_names_what_was_due() {
        let err = ClientPacket::Ping.unexpected("ExtInfo");
        assert!(matches!(
            err,
            ProtoError::UnexpectedOpcode { expected: "ExtInfo", got: id::PING }
        ));
    }

    #[test]
    fn decode_truncated_frame() {
        let frame: &[u8] = &[0x05, 0x00, 0x01];
        assert!(matches!(
            ClientPacket::decode(&mut &frame[..]),
            Err(ProtoError::BufferTooShort { .. })
        ));
    }
}
