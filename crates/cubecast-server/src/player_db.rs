//! Player records: rank, bans, flags and visit history.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bans::{unix_now, BanEntry};
use crate::rank::{Rank, RankSet};
use crate::session::bandwidth::BandwidthMode;

/// What gets persisted for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub name: String,
    pub rank: String,
    #[serde(default)]
    pub ban: Option<BanEntry>,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default)]
    pub hidden: bool,
    /// Per-player speedhack allowance; the rank must also permit it.
    #[serde(default = "default_true")]
    pub allow_speedhack: bool,
    #[serde(default)]
    pub bandwidth: Option<BandwidthMode>,
    #[serde(default)]
    pub last_ip: Option<IpAddr>,
    #[serde(default)]
    pub known_ips: Vec<IpAddr>,
    #[serde(default)]
    pub times_visited: u32,
    #[serde(default)]
    pub failed_logins: u32,
    #[serde(default)]
    pub first_login: u64,
    #[serde(default)]
    pub last_login: u64,
}

fn default_true() -> bool {
    true
}

impl PlayerRecord {
    fn new(name: &str, rank: &Rank) -> Self {
        Self {
            name: name.to_string(),
            rank: rank.name.clone(),
            ban: None,
            frozen: false,
            hidden: false,
            allow_speedhack: true,
            bandwidth: None,
            last_ip: None,
            known_ips: Vec::new(),
            times_visited: 0,
            failed_logins: 0,
            first_login: unix_now(),
            last_login: 0,
        }
    }
}

/// Live view of a player record, shared by the session and collaborators.
#[derive(Debug)]
pub struct PlayerInfo {
    record: RwLock<PlayerRecord>,
    rank: RwLock<Arc<Rank>>,
}

impl PlayerInfo {
    fn new(record: PlayerRecord, rank: Arc<Rank>) -> Self {
        Self {
            record: RwLock::new(record),
            rank: RwLock::new(rank),
        }
    }

    pub fn name(&self) -> String {
        self.record.read().name.clone()
    }

    pub fn rank(&self) -> Arc<Rank> {
        Arc::clone(&*self.rank.read())
    }

    pub fn set_rank(&self, rank: Arc<Rank>) {
        self.record.write().rank = rank.name.clone();
        *self.rank.write() = rank;
    }

    /// Rank-colored name.
    pub fn display_name(&self) -> String {
        format!("{}{}", self.rank.read().color, self.record.read().name)
    }

    pub fn ban(&self) -> Option<BanEntry> {
        self.record.read().ban.clone()
    }

    pub fn set_ban(&self, ban: Option<BanEntry>) {
        self.record.write().ban = ban;
    }

    pub fn is_frozen(&self) -> bool {
        self.record.read().frozen
    }

    pub fn set_frozen(&self, frozen: bool) {
        self.record.write().frozen = frozen;
    }

    pub fn is_hidden(&self) -> bool {
        self.record.read().hidden
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.record.write().hidden = hidden;
    }

    pub fn allows_speedhack(&self) -> bool {
        self.record.read().allow_speedhack
    }

    pub fn bandwidth(&self) -> Option<BandwidthMode> {
        self.record.read().bandwidth
    }

    pub fn set_bandwidth(&self, mode: Option<BandwidthMode>) {
        self.record.write().bandwidth = mode;
    }

    pub fn times_visited(&self) -> u32 {
        self.record.read().times_visited
    }

    pub fn has_used_ip(&self, ip: IpAddr) -> bool {
        self.record.read().known_ips.contains(&ip)
    }

    pub fn snapshot(&self) -> PlayerRecord {
        self.record.read().clone()
    }
}

/// Lookup/update service for player records.
pub trait PlayerDb: Send + Sync {
    fn find_or_create(&self, name: &str) -> Arc<PlayerInfo>;
    fn find(&self, name: &str) -> Option<Arc<PlayerInfo>>;
    fn record_login(&self, player: &PlayerInfo, ip: IpAddr);
    fn record_failed_login(&self, player: &PlayerInfo, ip: IpAddr);
    fn save(&self) -> io::Result<()>;
}

/// Keeps every record in memory; optionally backed by a JSON file.
pub struct JsonPlayerDb {
    path: Option<PathBuf>,
    ranks: Arc<RankSet>,
    players: RwLock<HashMap<String, Arc<PlayerInfo>>>,
}

impl JsonPlayerDb {
    pub fn in_memory(ranks: Arc<RankSet>) -> Self {
        Self {
            path: None,
            ranks,
            players: RwLock::new(HashMap::new()),
        }
    }

    /// Load records from `path`; a missing file is an empty database.
    pub fn load(path: impl AsRef<Path>, ranks: Arc<RankSet>) -> Self {
        let path = path.as_ref().to_path_buf();
        let records: Vec<PlayerRecord> = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Failed to parse {}: {e}", path.display());
                Vec::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Failed to read {}: {e}", path.display());
                Vec::new()
            }
        };
        info!("Loaded {} player records from {}", records.len(), path.display());

        let mut players = HashMap::with_capacity(records.len());
        for record in records {
            let rank = ranks.find(&record.rank).unwrap_or_else(|| {
                warn!(
                    "Player {} has unknown rank {}, using {}",
                    record.name,
                    record.rank,
                    ranks.lowest().name
                );
                ranks.lowest()
            });
            players.insert(
                record.name.to_ascii_lowercase(),
                Arc::new(PlayerInfo::new(record, rank)),
            );
        }
        Self {
            path: Some(path),
            ranks,
            players: RwLock::new(players),
        }
    }
}

impl PlayerDb for JsonPlayerDb {
    fn find_or_create(&self, name: &str) -> Arc<PlayerInfo> {
        let key = name.to_ascii_lowercase();
        if let Some(existing) = self.players.read().get(&key) {
            return Arc::clone(existing);
        }
        let mut players = self.players.write();
        let entry = players.entry(key).or_insert_with(|| {
            let rank = self.ranks.lowest();
            info!("New player {name} with rank {}", rank.name);
            Arc::new(PlayerInfo::new(PlayerRecord::new(name, &rank), rank))
        });
        Arc::clone(entry)
    }

    fn find(&self, name: &str) -> Option<Arc<PlayerInfo>> {
        self.players.read().get(&name.to_ascii_lowercase()).cloned()
    }

    fn record_login(&self, player: &PlayerInfo, ip: IpAddr) {
        let mut record = player.record.write();
        record.times_visited += 1;
        record.last_login = unix_now();
        record.last_ip = Some(ip);
        if !record.known_ips.contains(&ip) {
            record.known_ips.push(ip);
        }
    }

    fn record_failed_login(&self, player: &PlayerInfo, ip: IpAddr) {
        let mut record = player.record.write();
        record.failed_logins += 1;
        record.last_ip = Some(ip);
    }

    fn save(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut records: Vec<PlayerRecord> =
            self.players.read().values().map(|p| p.snapshot()).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        fs::write(path, serde_json::to_string_pretty(&records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn db() -> JsonPlayerDb {
        JsonPlayerDb::in_memory(Arc::new(RankSet::default()))
    }

    #[test]
    fn find_or_create_is_case_insensitive() {
        let db = db();
        let a = db.find_or_create("Alice");
        let b = db.find_or_create("alice");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "Alice");
        assert_eq!(a.rank().name, "guest");
    }

    #[test]
    fn login_history() {
        let db = db();
        let ip = IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9));
        let player = db.find_or_create("Bob");
        assert!(!player.has_used_ip(ip));
        db.record_login(&player, ip);
        db.record_login(&player, ip);
        assert!(player.has_used_ip(ip));
        assert_eq!(player.times_visited(), 2);
        assert_eq!(player.snapshot().known_ips.len(), 1);
        db.record_failed_login(&player, ip);
        assert_eq!(player.snapshot().failed_logins, 1);
    }

    #[test]
    fn display_name_follows_rank() {
        let ranks = Arc::new(RankSet::default());
        let db = JsonPlayerDb::in_memory(Arc::clone(&ranks));
        let player = db.find_or_create("Carol");
        assert_eq!(player.display_name(), "&7Carol");
        player.set_rank(ranks.find("op").unwrap());
        assert_eq!(player.display_name(), "&cCarol");
        assert_eq!(player.snapshot().rank, "op");
    }

    #[test]
    fn reload_keeps_records() {
        let path =
            std::env::temp_dir().join(format!("cubecast-players-{}.json", std::process::id()));
        let ranks = Arc::new(RankSet::default());
        let db = JsonPlayerDb::load(&path, Arc::clone(&ranks));
        db.find_or_create("Dave").set_frozen(true);
        db.save().unwrap();
        let reloaded = JsonPlayerDb::load(&path, ranks);
        assert!(reloaded.find("dave").unwrap().is_frozen());
        fs::remove_file(&path).ok();
    }
}
