//! Ranks and permission tokens.

use std::collections::HashSet;
use std::sync::Arc;

use cubecast_proto::block;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Chat,
    Build,
    Delete,
    PlaceGrass,
    PlaceWater,
    PlaceLava,
    PlaceAdmincrete,
    DeleteAdmincrete,
    UseColorCodes,
    UseSpeedHack,
    Spectate,
    Hide,
}

impl Permission {
    pub const ALL: [Permission; 12] = [
        Self::Chat,
        Self::Build,
        Self::Delete,
        Self::PlaceGrass,
        Self::PlaceWater,
        Self::PlaceLava,
        Self::PlaceAdmincrete,
        Self::DeleteAdmincrete,
        Self::UseColorCodes,
        Self::UseSpeedHack,
        Self::Spectate,
        Self::Hide,
    ];

    /// Extra permission needed to place (or delete) a specific block.
    pub fn for_block(id: u8, place: bool) -> Option<Permission> {
        match (id, place) {
            (block::ADMINCRETE, true) => Some(Self::PlaceAdmincrete),
            (block::ADMINCRETE, false) => Some(Self::DeleteAdmincrete),
            (block::WATER | block::STILL_WATER, true) => Some(Self::PlaceWater),
            (block::LAVA | block::STILL_LAVA, true) => Some(Self::PlaceLava),
            (block::GRASS, true) => Some(Self::PlaceGrass),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    pub name: String,
    /// Color code prefix, e.g. `&c`.
    #[serde(default = "default_color")]
    pub color: String,
    pub level: u8,
    #[serde(default)]
    pub permissions: HashSet<Permission>,
}

fn default_color() -> String {
    "&f".into()
}

impl Rank {
    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Hidden players are visible to strictly higher ranks.
    pub fn can_see(&self, other: &Rank) -> bool {
        self.level > other.level
    }

    /// Whether this rank may place (`place`) or delete the given block.
    pub fn can_edit(&self, id: u8, place: bool) -> bool {
        let base = if place {
            Permission::Build
        } else {
            Permission::Delete
        };
        self.can(base) && Permission::for_block(id, place).map_or(true, |p| self.can(p))
    }

    pub fn display(&self) -> String {
        format!("{}{}", self.color, self.name)
    }
}

/// All configured ranks, lowest level first.
#[derive(Debug, Clone)]
pub struct RankSet {
    ranks: Vec<Arc<Rank>>,
}

impl RankSet {
    /// Build from configured ranks. An empty list yields the built-ins.
    pub fn new(mut ranks: Vec<Rank>) -> Self {
        if ranks.is_empty() {
            return Self::default();
        }
        ranks.sort_by_key(|r| r.level);
        Self {
            ranks: ranks.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn find(&self, name: &str) -> Option<Arc<Rank>> {
        self.ranks
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Rank given to new players.
    pub fn lowest(&self) -> Arc<Rank> {
        Arc::clone(&self.ranks[0])
    }

    pub fn highest(&self) -> Arc<Rank> {
        Arc::clone(&self.ranks[self.ranks.len() - 1])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rank>> {
        self.ranks.iter()
    }
}

impl Default for RankSet {
    fn default() -> Self {
        use Permission::*;
        let rank = |name: &str, color: &str, level: u8, permissions: &[Permission]| Rank {
            name: name.into(),
            color: color.into(),
            level,
            permissions: permissions.iter().copied().collect(),
        };
        Self::new(vec![
            rank("guest", "&7", 0, &[Chat, Build, Delete]),
            rank(
                "builder",
                "&a",
                10,
                &[Chat, Build, Delete, PlaceGrass, PlaceWater, UseColorCodes],
            ),
            rank("op", "&c", 100, &Permission::ALL),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ranks_are_ordered() {
        let ranks = RankSet::default();
        assert_eq!(ranks.lowest().name, "guest");
        assert_eq!(ranks.highest().name, "op");
        assert!(ranks.find("BUILDER").is_some());
    }

    #[test]
    fn block_permissions() {
        let ranks = RankSet::default();
        let guest = ranks.find("guest").unwrap();
        let op = ranks.find("op").unwrap();
        assert!(guest.can_edit(block::STONE, true));
        assert!(!guest.can_edit(block::WATER, true));
        assert!(!guest.can_edit(block::ADMINCRETE, false));
        assert!(op.can_edit(block::ADMINCRETE, false));
        assert!(op.can_edit(block::LAVA, true));
    }

    #[test]
    fn visibility_needs_a_higher_rank() {
        let ranks = RankSet::default();
        let guest = ranks.find("guest").unwrap();
        let op = ranks.find("op").unwrap();
        assert!(op.can_see(&guest));
        assert!(!guest.can_see(&op));
        assert!(!op.can_see(&op));
    }
}
