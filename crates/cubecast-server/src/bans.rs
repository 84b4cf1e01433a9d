//! IP ban list, persisted as JSON like the other player data.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A ban with its reason, author and time (unix seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    pub reason: String,
    #[serde(default)]
    pub banned_by: String,
    #[serde(default)]
    pub banned_at: u64,
}

impl BanEntry {
    pub fn new(reason: impl Into<String>, banned_by: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            banned_by: banned_by.into(),
            banned_at: unix_now(),
        }
    }

    /// Kick text, e.g. "Banned 3d ago by admin: griefing".
    pub fn describe(&self, what: &str) -> String {
        let ago = unix_now().saturating_sub(self.banned_at);
        let by = if self.banned_by.is_empty() {
            "an operator"
        } else {
            &self.banned_by
        };
        if self.reason.is_empty() {
            format!("{what} was banned {} ago by {by}", format_mini(ago))
        } else {
            format!("{what} was banned {} ago by {by}: {}", format_mini(ago), self.reason)
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Compact duration: `45s`, `12m`, `5h`, `3d`.
pub fn format_mini(secs: u64) -> String {
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

pub trait IpBanList: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Option<BanEntry>;
    fn ban(&self, ip: IpAddr, entry: BanEntry);
    fn unban(&self, ip: IpAddr) -> bool;
    fn save(&self) -> io::Result<()>;
}

pub struct JsonIpBanList {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<IpAddr, BanEntry>>,
}

impl JsonIpBanList {
    /// Load bans from `path`; a missing file is an empty list.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<HashMap<IpAddr, BanEntry>>(&contents) {
                Ok(map) => {
                    info!("Loaded {} IP bans from {}", map.len(), path.display());
                    map
                }
                Err(e) => {
                    warn!("Failed to parse {}: {e}", path.display());
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("Failed to read {}: {e}", path.display());
                HashMap::new()
            }
        };
        Self {
            path: Some(path),
            entries: RwLock::new(entries),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl IpBanList for JsonIpBanList {
    fn lookup(&self, ip: IpAddr) -> Option<BanEntry> {
        self.entries.read().get(&ip).cloned()
    }

    fn ban(&self, ip: IpAddr, entry: BanEntry) {
        self.entries.write().insert(ip, entry);
    }

    fn unban(&self, ip: IpAddr) -> bool {
        self.entries.write().remove(&ip).is_some()
    }

    fn save(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&*self.entries.read())?;
        fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn ban_lookup_unban() {
        let bans = JsonIpBanList::in_memory();
        let ip = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
        assert!(bans.lookup(ip).is_none());
        bans.ban(ip, BanEntry::new("griefing", "admin"));
        assert_eq!(bans.lookup(ip).unwrap().reason, "griefing");
        assert!(bans.unban(ip));
        assert!(!bans.unban(ip));
    }

    #[test]
    fn persists_to_json() {
        let path = std::env::temp_dir().join(format!("cubecast-bans-{}.json", std::process::id()));
        let ip = IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8));
        let bans = JsonIpBanList::load(&path);
        bans.ban(ip, BanEntry::new("spam", "console"));
        bans.save().unwrap();
        let reloaded = JsonIpBanList::load(&path);
        assert_eq!(reloaded.lookup(ip).unwrap().banned_by, "console");
        fs::remove_file(&path).ok();
    }

    #[test]
    fn mini_durations() {
        assert_eq!(format_mini(5), "5s");
        assert_eq!(format_mini(125), "2m");
        assert_eq!(format_mini(7200), "2h");
        assert_eq!(format_mini(3 * 86_400 + 5), "3d");
    }

    #[test]
    fn describe_includes_reason() {
        let entry = BanEntry {
            reason: "griefing".into(),
            banned_by: "admin".into(),
            banned_at: unix_now(),
        };
        let text = entry.describe("Your IP");
        assert!(text.starts_with("Your IP was banned "));
        assert!(text.ends_with("ago by admin: griefing"));
    }
}
