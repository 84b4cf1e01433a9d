//! Block edits and block-related updates.

use bytes::{Buf, BufMut};

use super::{id, ServerMessage};
use crate::codec::{ensure_remaining, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::types::BlockPos;

/// Maximum number of blocks one bulk update carries.
pub const BULK_CAPACITY: usize = 256;

/// Client edit request (0x05).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetBlockClient {
    pub pos: BlockPos,
    /// `true` for place, `false` for delete.
    pub place: bool,
    pub block: u8,
}

impl ProtoDecode for SetBlockClient {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        let pos = BlockPos::proto_decode(buf)?;
        ensure_remaining(buf, 2)?;
        let place = buf.get_u8() != 0;
        let block = buf.get_u8();
        Ok(Self { pos, place, block })
    }
}

impl ProtoEncode for SetBlockClient {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        self.pos.proto_encode(buf);
        buf.put_u8(u8::from(self.place));
        buf.put_u8(self.block);
    }
}

/// Single block change (0x06).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetBlock {
    pub pos: BlockPos,
    pub block: u8,
}

impl ServerMessage for SetBlock {
    const ID: u8 = id::SET_BLOCK;
}

impl ProtoEncode for SetBlock {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        self.pos.proto_encode(buf);
        buf.put_u8(self.block);
    }
}

/// Up to [`BULK_CAPACITY`] changes addressed by flat map index (0x26).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkBlockUpdate {
    pub entries: Vec<(i32, u8)>,
}

impl ServerMessage for BulkBlockUpdate {
    const ID: u8 = id::BULK_BLOCK_UPDATE;
}

impl ProtoEncode for BulkBlockUpdate {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        let entries = &self.entries[..self.entries.len().min(BULK_CAPACITY)];
        buf.put_u8(entries.len().saturating_sub(1) as u8);
        for &(index, _) in entries {
            buf.put_i32(index);
        }
        buf.put_bytes(0, (BULK_CAPACITY - entries.len()) * 4);
        for &(_, block) in entries {
            buf.put_u8(block);
        }
        buf.put_bytes(0, BULK_CAPACITY - entries.len());
    }
}

/// Whether the client may place or delete a block type (0x1C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetBlockPermission {
    pub block: u8,
    pub allow_place: bool,
    pub allow_delete: bool,
}

impl ServerMessage for SetBlockPermission {
    const ID: u8 = id::SET_BLOCK_PERMISSION;
}

impl ProtoEncode for SetBlockPermission {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.block);
        buf.put_u8(u8::from(self.allow_place));
        buf.put_u8(u8::from(self.allow_delete));
    }
}
