//! A world shared by many sessions. Membership, zones and blocks each sit
//! behind their own lock.

use cubecast_proto::packets::EnvironmentSettings;
use cubecast_proto::types::{BlockPos, Position};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MapError;
use crate::map::{Dimensions, Map};
use crate::zone::Zone;

/// Identifies a session inside a world's member list.
pub type MemberId = u32;

/// Operator-editable world properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSettings {
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    #[serde(default = "default_true")]
    pub buildable: bool,
    #[serde(default = "default_true")]
    pub deletable: bool,
    /// Shown on the loading screen; `+fly`/`-hax` tokens drive hack control.
    #[serde(default)]
    pub motd: Option<String>,
    #[serde(default)]
    pub greeting: Option<String>,
    /// Minimum rank level allowed in.
    #[serde(default)]
    pub access_level: u8,
    /// Minimum rank level allowed to edit blocks.
    #[serde(default)]
    pub build_level: u8,
    /// Reach distance in blocks sent to ClickDistance clients.
    #[serde(default = "default_reach")]
    pub click_distance: i16,
    #[serde(default)]
    pub environment: EnvironmentSettings,
    #[serde(default)]
    pub zones: Vec<Zone>,
}

fn default_max_players() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_reach() -> i16 {
    5
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            max_players: default_max_players(),
            buildable: true,
            deletable: true,
            motd: None,
            greeting: None,
            access_level: 0,
            build_level: 0,
            click_distance: default_reach(),
            environment: EnvironmentSettings::default(),
            zones: Vec::new(),
        }
    }
}

pub struct World {
    name: String,
    settings: RwLock<WorldSettings>,
    map: RwLock<Map>,
    members: Mutex<Vec<MemberId>>,
}

impl World {
    pub fn new(name: impl Into<String>, map: Map, settings: WorldSettings) -> Self {
        Self {
            name: name.into(),
            settings: RwLock::new(settings),
            map: RwLock::new(map),
            members: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> WorldSettings {
        self.settings.read().clone()
    }

    pub fn update_settings(&self, f: impl FnOnce(&mut WorldSettings)) {
        f(&mut self.settings.write());
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Add a member. Rejoining is a no-op; a full world refuses.
    pub fn accept(&self, member: MemberId) -> Result<(), MapError> {
        let capacity = self.settings.read().max_players;
        let mut members = self.members.lock();
        if members.contains(&member) {
            return Ok(());
        }
        if members.len() >= capacity {
            return Err(MapError::WorldFull {
                world: self.name.clone(),
                capacity,
            });
        }
        members.push(member);
        debug!("{} joined world {} ({} online)", member, self.name, members.len());
        Ok(())
    }

    /// Remove a member. Returns `false` if it was not present.
    pub fn release(&self, member: MemberId) -> bool {
        let mut members = self.members.lock();
        match members.iter().position(|&m| m == member) {
            Some(index) => {
                members.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn is_member(&self, member: MemberId) -> bool {
        self.members.lock().contains(&member)
    }

    pub fn members(&self) -> Vec<MemberId> {
        self.members.lock().clone()
    }

    pub fn player_count(&self) -> usize {
        self.members.lock().len()
    }

    pub fn can_join(&self, rank_level: u8) -> bool {
        rank_level >= self.settings.read().access_level
    }

    pub fn can_build(&self, rank_level: u8) -> bool {
        rank_level >= self.settings.read().build_level
    }

    // -----------------------------------------------------------------------
    // Zones
    // -----------------------------------------------------------------------

    pub fn denies_movement(&self, pos: BlockPos) -> bool {
        self.settings
            .read()
            .zones
            .iter()
            .any(|z| z.deny_movement && z.contains(pos))
    }

    pub fn denies_building(&self, pos: BlockPos) -> bool {
        self.settings
            .read()
            .zones
            .iter()
            .any(|z| z.deny_building && z.contains(pos))
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    pub fn dimensions(&self) -> Dimensions {
        self.map.read().dimensions()
    }

    pub fn spawn(&self) -> Position {
        self.map.read().spawn()
    }

    pub fn block(&self, pos: BlockPos) -> Option<u8> {
        self.map.read().get(pos)
    }

    pub fn set_block(&self, pos: BlockPos, id: u8) -> Result<u8, MapError> {
        self.map.write().set(pos, id)
    }

    pub fn compress_for_transfer(&self, max_block: u8) -> Result<Vec<u8>, MapError> {
        self.map.read().compress_for_transfer(max_block)
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World").field("name", &self.name).finish()
    }
}
