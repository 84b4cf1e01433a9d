//! Block volume and the gzip stream sent during map transfer.

use std::io::Write;

use cubecast_proto::block;
use cubecast_proto::types::{BlockPos, Position};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::MapError;

/// Map size in blocks. `height` is the vertical (Y) extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: i32,
    pub height: i32,
    pub length: i32,
}

impl Dimensions {
    /// Each side must fit the protocol's i16 and the volume the i32 length
    /// prefix of the transfer stream.
    pub fn new(width: i32, height: i32, length: i32) -> Result<Self, MapError> {
        let valid = |v: i32| (1..=i32::from(i16::MAX)).contains(&v);
        if !(valid(width) && valid(height) && valid(length)) {
            return Err(MapError::InvalidDimensions(width, height, length));
        }
        let dims = Self {
            width,
            height,
            length,
        };
        if dims.volume() > i32::MAX as usize {
            return Err(MapError::InvalidDimensions(width, height, length));
        }
        Ok(dims)
    }

    pub fn volume(&self) -> usize {
        self.width as usize * self.height as usize * self.length as usize
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        (0..self.width).contains(&pos.x)
            && (0..self.height).contains(&pos.y)
            && (0..self.length).contains(&pos.z)
    }

    /// Flat index in transfer order: X fastest, then Z, then Y.
    pub fn index(&self, pos: BlockPos) -> Option<usize> {
        self.contains(pos).then(|| {
            let (x, y, z) = (pos.x as usize, pos.y as usize, pos.z as usize);
            (y * self.length as usize + z) * self.width as usize + x
        })
    }
}

pub struct Map {
    dimensions: Dimensions,
    blocks: Vec<u8>,
    spawn: Position,
}

impl Map {
    /// Grass at half height over dirt, over stone, admincrete at the bottom.
    pub fn flat(dimensions: Dimensions) -> Self {
        let surface = dimensions.height / 2 - 1;
        let layer = dimensions.width as usize * dimensions.length as usize;
        let mut blocks = Vec::with_capacity(dimensions.volume());
        for y in 0..dimensions.height {
            let id = match y {
                0 => block::ADMINCRETE,
                y if y < surface - 3 => block::STONE,
                y if y < surface => block::DIRT,
                y if y == surface => block::GRASS,
                _ => block::AIR,
            };
            blocks.extend(std::iter::repeat(id).take(layer));
        }
        let spawn_block = BlockPos::new(dimensions.width / 2, surface + 1, dimensions.length / 2);
        let mut spawn = Position::from_block(spawn_block);
        // Eye height above the feet.
        spawn.y = spawn.y.saturating_add(51);
        Self {
            dimensions,
            blocks,
            spawn,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn spawn(&self) -> Position {
        self.spawn
    }

    pub fn set_spawn(&mut self, spawn: Position) {
        self.spawn = spawn;
    }

    pub fn in_bounds(&self, pos: BlockPos) -> bool {
        self.dimensions.contains(pos)
    }

    pub fn get(&self, pos: BlockPos) -> Option<u8> {
        self.dimensions.index(pos).map(|i| self.blocks[i])
    }

    /// Store a block, returning the previous one.
    pub fn set(&mut self, pos: BlockPos, id: u8) -> Result<u8, MapError> {
        let index = self.dimensions.index(pos).ok_or(MapError::OutOfBounds(pos))?;
        Ok(std::mem::replace(&mut self.blocks[index], id))
    }

    /// Gzip of the big-endian volume followed by every block, with ids above
    /// `max_block` replaced by their classic fallback.
    pub fn compress_for_transfer(&self, max_block: u8) -> Result<Vec<u8>, MapError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&(self.blocks.len() as i32).to_be_bytes())?;
        if max_block >= block::MAX_CUSTOM {
            encoder.write_all(&self.blocks)?;
        } else {
            let converted: Vec<u8> = self
                .blocks
                .iter()
                .map(|&id| block::downgrade(id, max_block))
                .collect();
            encoder.write_all(&converted)?;
        }
        Ok(encoder.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn small() -> Map {
        Map::flat(Dimensions::new(16, 16, 16).unwrap())
    }

    #[test]
    fn flat_layers() {
        let map = small();
        assert_eq!(map.get(BlockPos::new(0, 0, 0)), Some(block::ADMINCRETE));
        assert_eq!(map.get(BlockPos::new(3, 7, 3)), Some(block::GRASS));
        assert_eq!(map.get(BlockPos::new(3, 8, 3)), Some(block::AIR));
        assert_eq!(map.get(BlockPos::new(16, 0, 0)), None);
    }

    #[test]
    fn set_returns_previous() {
        let mut map = small();
        let pos = BlockPos::new(1, 9, 1);
        assert_eq!(map.set(pos, block::GLASS).unwrap(), block::AIR);
        assert_eq!(map.get(pos), Some(block::GLASS));
        assert!(map.set(BlockPos::new(-1, 0, 0), 1).is_err());
    }

    #[test]
    fn index_order_is_x_then_z_then_y() {
        let dims = Dimensions::new(4, 3, 2).unwrap();
        assert_eq!(dims.index(BlockPos::new(1, 0, 0)), Some(1));
        assert_eq!(dims.index(BlockPos::new(0, 0, 1)), Some(4));
        assert_eq!(dims.index(BlockPos::new(0, 1, 0)), Some(8));
    }

    #[test]
    fn transfer_stream_downgrades_custom_blocks() {
        let mut map = small();
        map.set(BlockPos::new(0, 15, 0), 65).unwrap();
        let compressed = map.compress_for_transfer(block::MAX_CLASSIC).unwrap();

        let mut raw = Vec::new();
        GzDecoder::new(&compressed[..]).read_to_end(&mut raw).unwrap();
        assert_eq!(&raw[..4], &4096i32.to_be_bytes());
        assert_eq!(raw.len(), 4 + 4096);
        let index = Dimensions::new(16, 16, 16).unwrap().index(BlockPos::new(0, 15, 0)).unwrap();
        assert_eq!(raw[4 + index], block::STONE);
    }

    #[test]
    fn rejects_bad_dimensions() {
        assert!(Dimensions::new(0, 64, 64).is_err());
        assert!(Dimensions::new(64, 40_000, 64).is_err());
    }

    #[test]
    fn volume_must_fit_the_transfer_prefix() {
        assert!(Dimensions::new(2048, 2048, 1024).is_err());

        let dims = Dimensions::new(32_767, 2, 32_767).unwrap();
        let far = BlockPos::new(32_766, 1, 32_766);
        assert_eq!(dims.index(far), Some(dims.volume() - 1));
    }
}
