use cubecast_proto::types::BlockPos;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("block {0} is outside the map")]
    OutOfBounds(BlockPos),

    #[error("world {world} is full ({capacity} players)")]
    WorldFull { world: String, capacity: usize },

    #[error("invalid map dimensions {0}x{1}x{2}")]
    InvalidDimensions(i32, i32, i32),

    #[error("no world named {0}")]
    UnknownWorld(String),

    #[error("map compression failed: {0}")]
    Compress(#[from] std::io::Error),
}
