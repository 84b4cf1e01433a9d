//! Registry of loaded worlds.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::MapError;
use crate::world::World;

pub struct WorldManager {
    worlds: RwLock<Vec<Arc<World>>>,
    main: RwLock<Arc<World>>,
}

impl WorldManager {
    pub fn new(main: World) -> Self {
        let main = Arc::new(main);
        info!("Main world is {}", main.name());
        Self {
            worlds: RwLock::new(vec![Arc::clone(&main)]),
            main: RwLock::new(main),
        }
    }

    pub fn add(&self, world: World) -> Arc<World> {
        let world = Arc::new(world);
        self.worlds.write().push(Arc::clone(&world));
        world
    }

    pub fn main(&self) -> Arc<World> {
        Arc::clone(&*self.main.read())
    }

    pub fn set_main(&self, name: &str) -> Result<(), MapError> {
        let world = self
            .find(name)
            .ok_or_else(|| MapError::UnknownWorld(name.to_string()))?;
        *self.main.write() = world;
        Ok(())
    }

    /// Exact, case-insensitive lookup.
    pub fn find(&self, name: &str) -> Option<Arc<World>> {
        self.worlds
            .read()
            .iter()
            .find(|w| w.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Every world whose name starts with `pattern`; an exact match wins.
    pub fn find_matching(&self, pattern: &str) -> Vec<Arc<World>> {
        if let Some(exact) = self.find(pattern) {
            return vec![exact];
        }
        let pattern = pattern.to_ascii_lowercase();
        self.worlds
            .read()
            .iter()
            .filter(|w| w.name().to_ascii_lowercase().starts_with(&pattern))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<World>> {
        self.worlds.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Dimensions, Map};
    use crate::world::WorldSettings;

    fn world(name: &str) -> World {
        let map = Map::flat(Dimensions::new(8, 8, 8).unwrap());
        World::new(name, map, WorldSettings::default())
    }

    #[test]
    fn lookup_by_name_and_prefix() {
        let manager = WorldManager::new(world("main"));
        manager.add(world("mall"));
        manager.add(world("arena"));
        assert_eq!(manager.find("MAIN").unwrap().name(), "main");
        assert_eq!(manager.find_matching("ma").len(), 2);
        assert_eq!(manager.find_matching("main").len(), 1);
        assert!(manager.find_matching("zzz").is_empty());
    }

    #[test]
    fn switch_main_world() {
        let manager = WorldManager::new(world("main"));
        manager.add(world("hub"));
        manager.set_main("hub").unwrap();
        assert_eq!(manager.main().name(), "hub");
        assert!(manager.set_main("missing").is_err());
    }
}
