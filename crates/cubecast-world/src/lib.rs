//! Worlds: block storage, map transfer encoding, membership and zones.

pub mod error;
pub mod manager;
pub mod map;
pub mod world;
pub mod zone;

pub use error::MapError;
pub use manager::WorldManager;
pub use map::{Dimensions, Map};
pub use world::{MemberId, World, WorldSettings};
pub use zone::Zone;
