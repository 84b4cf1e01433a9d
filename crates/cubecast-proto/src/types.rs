//! Base data types used throughout the protocol.

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::codec::{ensure_remaining, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

/// Entity id a client uses for itself.
pub const SELF_ID: u8 = 255;

/// Fixed-point units per block.
pub const UNITS_PER_BLOCK: i32 = 32;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Player position in fixed-point units (1/32 block) plus yaw/pitch bytes.
/// `y` is the vertical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub yaw: u8,
    pub pitch: u8,
}

impl Position {
    pub const ZERO: Position = Position::new(0, 0, 0, 0, 0);

    pub const fn new(x: i16, y: i16, z: i16, yaw: u8, pitch: u8) -> Self {
        Self {
            x,
            y,
            z,
            yaw,
            pitch,
        }
    }

    /// Position at the centre of a block column, `y` at the block's bottom.
    pub fn from_block(block: BlockPos) -> Self {
        let to_units = |v: i32, offset: i32| (v * UNITS_PER_BLOCK + offset) as i16;
        Self::new(
            to_units(block.x, 16),
            to_units(block.y, 0),
            to_units(block.z, 16),
            0,
            0,
        )
    }

    /// Difference from `self` to `newer`.
    pub fn delta_to(self, newer: Position) -> PositionDelta {
        PositionDelta {
            dx: i32::from(newer.x) - i32::from(self.x),
            dy: i32::from(newer.y) - i32::from(self.y),
            dz: i32::from(newer.z) - i32::from(self.z),
            dyaw: i32::from(newer.yaw.wrapping_sub(self.yaw) as i8),
            dpitch: i32::from(newer.pitch.wrapping_sub(self.pitch) as i8),
        }
    }

    /// Squared euclidean distance in fixed-point units.
    pub fn distance_squared(self, other: Position) -> i64 {
        let dx = i64::from(other.x) - i64::from(self.x);
        let dy = i64::from(other.y) - i64::from(self.y);
        let dz = i64::from(other.z) - i64::from(self.z);
        dx * dx + dy * dy + dz * dz
    }

    /// Block containing this position.
    pub fn block(self) -> BlockPos {
        BlockPos::new(
            i32::from(self.x).div_euclid(UNITS_PER_BLOCK),
            i32::from(self.y).div_euclid(UNITS_PER_BLOCK),
            i32::from(self.z).div_euclid(UNITS_PER_BLOCK),
        )
    }

    /// Same coordinates with another orientation.
    pub fn with_rotation(self, yaw: u8, pitch: u8) -> Self {
        Self { yaw, pitch, ..self }
    }

    /// Pack into 64 bits (x, y, z, yaw, pitch from high to low).
    pub fn pack(self) -> u64 {
        (u64::from(self.x as u16) << 48)
            | (u64::from(self.y as u16) << 32)
            | (u64::from(self.z as u16) << 16)
            | (u64::from(self.yaw) << 8)
            | u64::from(self.pitch)
    }

    pub fn unpack(bits: u64) -> Self {
        Self::new(
            (bits >> 48) as u16 as i16,
            (bits >> 32) as u16 as i16,
            (bits >> 16) as u16 as i16,
            (bits >> 8) as u8,
            bits as u8,
        )
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}) yaw={} pitch={}",
            self.x, self.y, self.z, self.yaw, self.pitch
        )
    }
}

impl ProtoEncode for Position {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_i16(self.x);
        buf.put_i16(self.y);
        buf.put_i16(self.z);
        buf.put_u8(self.yaw);
        buf.put_u8(self.pitch);
    }
}

impl ProtoDecode for Position {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ensure_remaining(buf, 8)?;
        Ok(Self::new(
            buf.get_i16(),
            buf.get_i16(),
            buf.get_i16(),
            buf.get_u8(),
            buf.get_u8(),
        ))
    }
}

// ---------------------------------------------------------------------------
// PositionDelta
// ---------------------------------------------------------------------------

/// Pairwise difference of two positions. Rotation deltas take the short way
/// around the circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionDelta {
    pub dx: i32,
    pub dy: i32,
    pub dz: i32,
    pub dyaw: i32,
    pub dpitch: i32,
}

impl PositionDelta {
    pub fn is_zero(&self) -> bool {
        !self.position_changed() && !self.rotation_changed()
    }

    pub fn position_changed(&self) -> bool {
        self.dx != 0 || self.dy != 0 || self.dz != 0
    }

    pub fn rotation_changed(&self) -> bool {
        self.dyaw != 0 || self.dpitch != 0
    }

    /// Whether the positional part fits the signed-byte relative move packets.
    pub fn fits_compact(&self) -> bool {
        let fits = |v: i32| (i32::from(i8::MIN)..=i32::from(i8::MAX)).contains(&v);
        fits(self.dx) && fits(self.dy) && fits(self.dz)
    }

    pub fn distance_squared(&self) -> i64 {
        self.horizontal_distance_squared() + i64::from(self.dy) * i64::from(self.dy)
    }

    pub fn horizontal_distance_squared(&self) -> i64 {
        i64::from(self.dx) * i64::from(self.dx) + i64::from(self.dz) * i64::from(self.dz)
    }

    pub fn rotation_squared(&self) -> i64 {
        i64::from(self.dyaw) * i64::from(self.dyaw)
            + i64::from(self.dpitch) * i64::from(self.dpitch)
    }
}

// ---------------------------------------------------------------------------
// BlockPos
// ---------------------------------------------------------------------------

/// Block coordinates. `y` is the vertical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Block coordinates travel as three `i16`.
impl ProtoEncode for BlockPos {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_i16(self.x as i16);
        buf.put_i16(self.y as i16);
        buf.put_i16(self.z as i16);
    }
}

impl ProtoDecode for BlockPos {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ensure_remaining(buf, 6)?;
        Ok(Self::new(
            i32::from(buf.get_i16()),
            i32::from(buf.get_i16()),
            i32::from(buf.get_i16()),
        ))
    }
}
