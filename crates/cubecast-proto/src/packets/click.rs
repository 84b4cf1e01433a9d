//! PlayerClicked (0x22), client → server, PlayerClick extension only.

use bytes::{Buf, BufMut};

use crate::codec::{ensure_remaining, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::types::BlockPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerClicked {
    /// 0 left, 1 right, 2 middle.
    pub button: u8,
    /// 0 pressed, 1 released.
    pub action: u8,
    pub yaw: i16,
    pub pitch: i16,
    /// Entity under the cursor, 255 for none.
    pub target_entity: u8,
    /// Block under the cursor, -1 on every axis for none.
    pub target_block: BlockPos,
    pub target_face: u8,
}

impl ProtoDecode for PlayerClicked {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ensure_remaining(buf, 14)?;
        let button = buf.get_u8();
        let action = buf.get_u8();
        let yaw = buf.get_i16();
        let pitch = buf.get_i16();
        let target_entity = buf.get_u8();
        let target_block = BlockPos::proto_decode(buf)?;
        let target_face = buf.get_u8();
        Ok(Self {
            button,
            action,
            yaw,
            pitch,
            target_entity,
            target_block,
            target_face,
        })
    }
}

impl ProtoEncode for PlayerClicked {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.button);
        buf.put_u8(self.action);
        buf.put_i16(self.yaw);
        buf.put_i16(self.pitch);
        buf.put_u8(self.target_entity);
        self.target_block.proto_encode(buf);
        buf.put_u8(self.target_face);
    }
}
