use cubecast_proto::types::BlockPos;
use serde::{Deserialize, Serialize};

/// Axis-aligned region with movement/building restrictions. Bounds are
/// inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub min: BlockPos,
    pub max: BlockPos,
    #[serde(default)]
    pub deny_movement: bool,
    #[serde(default)]
    pub deny_building: bool,
}

impl Zone {
    pub fn contains(&self, pos: BlockPos) -> bool {
        (self.min.x..=self.max.x).contains(&pos.x)
            && (self.min.y..=self.max.y).contains(&pos.y)
            && (self.min.z..=self.max.z).contains(&pos.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive() {
        let zone = Zone {
            name: "jail".into(),
            min: BlockPos::new(0, 0, 0),
            max: BlockPos::new(4, 4, 4),
            deny_movement: true,
            deny_building: false,
        };
        assert!(zone.contains(BlockPos::new(4, 0, 4)));
        assert!(!zone.contains(BlockPos::new(5, 0, 0)));
    }
}
