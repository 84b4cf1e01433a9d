//! Map transfer: initialize (0x02), data chunk (0x03), finalize (0x04).

use bytes::BufMut;

use super::{id, ServerMessage};
use crate::codec::{ProtoEncode, CHUNK_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelInitialize;

impl ServerMessage for LevelInitialize {
    const ID: u8 = id::LEVEL_INITIALIZE;
}

impl ProtoEncode for LevelInitialize {
    fn proto_encode(&self, _buf: &mut impl BufMut) {}
}

/// Up to [`CHUNK_LEN`] bytes of the compressed map, zero padded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelDataChunk<'a> {
    pub data: &'a [u8],
    pub percent: u8,
}

impl ServerMessage for LevelDataChunk<'_> {
    const ID: u8 = id::LEVEL_DATA_CHUNK;
}

impl ProtoEncode for LevelDataChunk<'_> {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        let len = self.data.len().min(CHUNK_LEN);
        buf.put_i16(len as i16);
        buf.put_slice(&self.data[..len]);
        buf.put_bytes(0, CHUNK_LEN - len);
        buf.put_u8(self.percent);
    }
}

/// Map dimensions, `y` vertical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelFinalize {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl ServerMessage for LevelFinalize {
    const ID: u8 = id::LEVEL_FINALIZE;
}

impl ProtoEncode for LevelFinalize {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_i16(self.x);
        buf.put_i16(self.y);
        buf.put_i16(self.z);
    }
}
