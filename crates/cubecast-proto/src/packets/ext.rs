//! CPE negotiation packets and small extension packets.

use bytes::{Buf, BufMut};

use super::{id, ServerMessage};
use crate::codec::{self, ensure_remaining, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

/// Extension list header (0x10), both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtInfo {
    pub app_name: String,
    pub extension_count: i16,
}

impl ExtInfo {
    pub fn new(app_name: impl Into<String>, extension_count: i16) -> Self {
        Self {
            app_name: app_name.into(),
            extension_count,
        }
    }
}

impl ServerMessage for ExtInfo {
    const ID: u8 = id::EXT_INFO;
}

impl ProtoEncode for ExtInfo {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        codec::write_string(buf, &self.app_name);
        buf.put_i16(self.extension_count);
    }
}

impl ProtoDecode for ExtInfo {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        let app_name = codec::read_string(buf)?;
        ensure_remaining(buf, 2)?;
        Ok(Self {
            app_name,
            extension_count: buf.get_i16(),
        })
    }
}

/// One supported extension (0x11), both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtEntry {
    pub name: String,
    pub version: i32,
}

impl ExtEntry {
    pub fn new(name: impl Into<String>, version: i32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl ServerMessage for ExtEntry {
    const ID: u8 = id::EXT_ENTRY;
}

impl ProtoEncode for ExtEntry {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        codec::write_string(buf, &self.name);
        buf.put_i32(self.version);
    }
}

impl ProtoDecode for ExtEntry {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        let name = codec::read_string(buf)?;
        ensure_remaining(buf, 4)?;
        Ok(Self {
            name,
            version: buf.get_i32(),
        })
    }
}

/// CustomBlocks level (0x13), both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomBlockSupportLevel {
    pub level: u8,
}

impl ServerMessage for CustomBlockSupportLevel {
    const ID: u8 = id::CUSTOM_BLOCK_SUPPORT_LEVEL;
}

impl ProtoEncode for CustomBlockSupportLevel {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.level);
    }
}

impl ProtoDecode for CustomBlockSupportLevel {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ensure_remaining(buf, 1)?;
        Ok(Self {
            level: buf.get_u8(),
        })
    }
}

/// Reach distance in fixed-point units (0x12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetClickDistance {
    pub distance: i16,
}

impl ServerMessage for SetClickDistance {
    const ID: u8 = id::SET_CLICK_DISTANCE;
}

impl ProtoEncode for SetClickDistance {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_i16(self.distance);
    }
}

/// Force the block in the client's hand (0x14).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldThis {
    pub block: u8,
    pub prevent_change: bool,
}

impl ServerMessage for HoldThis {
    const ID: u8 = id::HOLD_THIS;
}

impl ProtoEncode for HoldThis {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.block);
        buf.put_u8(u8::from(self.prevent_change));
    }
}

/// Client-side movement abilities (0x20). `jump_height` of -1 keeps the
/// client default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HackControl {
    pub flying: bool,
    pub no_clip: bool,
    pub speeding: bool,
    pub spawn_control: bool,
    pub third_person: bool,
    pub jump_height: i16,
}

impl Default for HackControl {
    fn default() -> Self {
        Self {
            flying: true,
            no_clip: true,
            speeding: true,
            spawn_control: true,
            third_person: true,
            jump_height: -1,
        }
    }
}

impl HackControl {
    /// Apply `+fly`, `-hax`, `+ophax`-style tokens found in a world MOTD.
    /// Later tokens override earlier ones; `hax` toggles every flag.
    pub fn from_motd(motd: &str, is_op: bool) -> Self {
        let mut hacks = Self::default();
        for token in motd.split_whitespace() {
            let (allow, flag) = match token.as_bytes().first() {
                Some(b'+') => (true, &token[1..]),
                Some(b'-') => (false, &token[1..]),
                _ => continue,
            };
            match flag.to_ascii_lowercase().as_str() {
                "fly" => hacks.flying = allow,
                "noclip" => hacks.no_clip = allow,
                "speed" => hacks.speeding = allow,
                "respawn" => hacks.spawn_control = allow,
                "thirdperson" => hacks.third_person = allow,
                "hax" => hacks.set_all(allow),
                "ophax" if is_op => hacks.set_all(allow),
                _ => {}
            }
        }
        hacks
    }

    fn set_all(&mut self, allow: bool) {
        self.flying = allow;
        self.no_clip = allow;
        self.speeding = allow;
        self.spawn_control = allow;
        self.third_person = allow;
    }
}

impl ServerMessage for HackControl {
    const ID: u8 = id::HACK_CONTROL;
}

impl ProtoEncode for HackControl {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(u8::from(self.flying));
        buf.put_u8(u8::from(self.no_clip));
        buf.put_u8(u8::from(self.speeding));
        buf.put_u8(u8::from(self.spawn_control));
        buf.put_u8(u8::from(self.third_person));
        buf.put_i16(self.jump_height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn ext_entry_roundtrip() {
        let original = ExtEntry::new("EnvMapAppearance", 2);
        let mut buf = BytesMut::new();
        original.proto_encode(&mut buf);
        assert_eq!(buf.len(), 68);
        assert_eq!(ExtEntry::proto_decode(&mut buf.freeze()).unwrap(), original);
    }

    #[test]
    fn motd_tokens_toggle_hacks() {
        let hacks = HackControl::from_motd("Welcome -hax +fly", false);
        assert!(hacks.flying);
        assert!(!hacks.no_clip);
        assert!(!hacks.speeding);
    }

    #[test]
    fn ophax_only_applies_to_ops() {
        let motd = "-hax +ophax";
        assert!(!HackControl::from_motd(motd, false).flying);
        assert!(HackControl::from_motd(motd, true).flying);
    }
}
