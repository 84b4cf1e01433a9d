use std::io;
use std::path::Path;

use cubecast_world::WorldSettings;
use serde::Deserialize;
use thiserror::Error;

use crate::rank::Rank;
use crate::session::bandwidth::BandwidthMode;
use crate::verify::VerifyNames;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub anti_cheat: AntiCheatSection,
    #[serde(default)]
    pub bandwidth: BandwidthSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub ranks: Vec<Rank>,
    #[serde(default)]
    pub worlds: Vec<WorldConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    pub address: String,
    pub port: u16,
    pub name: String,
    pub motd: String,
    pub max_players: usize,
    /// Announce joins and leaves to everyone.
    #[serde(default = "default_true")]
    pub show_connection_messages: bool,
    /// Main world; defaults to the first `[[worlds]]` entry.
    #[serde(default)]
    pub main_world: Option<String>,
    #[serde(default = "default_players_file")]
    pub players_file: String,
    #[serde(default = "default_ip_bans_file")]
    pub ip_bans_file: String,
}

fn default_true() -> bool {
    true
}

fn default_players_file() -> String {
    "players.json".into()
}

fn default_ip_bans_file() -> String {
    "banned-ips.json".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    /// Bound on any single blocking socket read or write.
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,
    /// Disconnect clients that send nothing for this long.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Sleep between I/O loop iterations.
    #[serde(default = "default_sleep_delay_ms")]
    pub sleep_delay_ms: u64,
    /// Loop iterations between liveness polls.
    #[serde(default = "default_poll_interval_ticks")]
    pub poll_interval_ticks: u32,
    /// Liveness polls between keepalive pings.
    #[serde(default = "default_ping_interval_polls")]
    pub ping_interval_polls: u32,
    #[serde(default = "default_max_packets_per_tick")]
    pub max_packets_per_tick: usize,
    #[serde(default = "default_max_block_updates_per_tick")]
    pub max_block_updates_per_tick: usize,
    /// Block backlog above which BulkBlockUpdate clients get one bulk packet.
    #[serde(default = "default_bulk_threshold")]
    pub bulk_threshold: usize,
    /// Disable Nagle's algorithm.
    #[serde(default = "default_true")]
    pub low_latency: bool,
}

fn default_socket_timeout_ms() -> u64 {
    10_000
}

fn default_idle_timeout_ms() -> u64 {
    60_000
}

fn default_sleep_delay_ms() -> u64 {
    5
}

fn default_poll_interval_ticks() -> u32 {
    100
}

fn default_ping_interval_polls() -> u32 {
    1
}

fn default_max_packets_per_tick() -> usize {
    128
}

fn default_max_block_updates_per_tick() -> usize {
    100
}

fn default_bulk_threshold() -> usize {
    160
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            socket_timeout_ms: default_socket_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            sleep_delay_ms: default_sleep_delay_ms(),
            poll_interval_ticks: default_poll_interval_ticks(),
            ping_interval_polls: default_ping_interval_polls(),
            max_packets_per_tick: default_max_packets_per_tick(),
            max_block_updates_per_tick: default_max_block_updates_per_tick(),
            bulk_threshold: default_bulk_threshold(),
            low_latency: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecuritySection {
    #[serde(default)]
    pub verify_names: VerifyNames,
    #[serde(default)]
    pub allow_unverified_lan: bool,
    #[serde(default)]
    pub paid_players_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AntiCheatSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Squared horizontal distance (fixed-point units) allowed per packet.
    #[serde(default = "default_max_distance_squared")]
    pub max_distance_squared: i64,
    /// Upward distance (fixed-point units) allowed per packet.
    #[serde(default = "default_max_jump_delta")]
    pub max_jump_delta: i32,
    #[serde(default = "default_max_packet_count")]
    pub max_packet_count: usize,
    #[serde(default = "default_max_packet_interval_ms")]
    pub max_packet_interval_ms: u64,
}

fn default_max_distance_squared() -> i64 {
    1024
}

fn default_max_jump_delta() -> i32 {
    25
}

fn default_max_packet_count() -> usize {
    200
}

fn default_max_packet_interval_ms() -> u64 {
    5_000
}

impl Default for AntiCheatSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_distance_squared: default_max_distance_squared(),
            max_jump_delta: default_max_jump_delta(),
            max_packet_count: default_max_packet_count(),
            max_packet_interval_ms: default_max_packet_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BandwidthSection {
    /// Mode for players without a personal setting.
    #[serde(default)]
    pub mode: BandwidthMode,
    /// View ticks between forced absolute position updates.
    #[serde(default = "default_full_update_interval")]
    pub full_update_interval: u32,
}

fn default_full_update_interval() -> u32 {
    20
}

impl Default for BandwidthSection {
    fn default() -> Self {
        Self {
            mode: BandwidthMode::default(),
            full_update_interval: default_full_update_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// A flat generated world.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    pub name: String,
    #[serde(default = "default_horizontal")]
    pub width: i32,
    #[serde(default = "default_height")]
    pub height: i32,
    #[serde(default = "default_horizontal")]
    pub length: i32,
    #[serde(default)]
    pub settings: WorldSettings,
}

fn default_horizontal() -> i32 {
    128
}

fn default_height() -> i32 {
    64
}

impl WorldConfig {
    pub fn flat(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width: default_horizontal(),
            height: default_height(),
            length: default_horizontal(),
            settings: WorldSettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_players == 0 {
            return Err(ConfigError::Invalid("server.max_players must be positive".into()));
        }
        if let Some(main) = &self.server.main_world {
            if !self.worlds.iter().any(|w| w.name.eq_ignore_ascii_case(main)) {
                return Err(ConfigError::Invalid(format!("main world {main} is not configured")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [server]
        address = "0.0.0.0"
        port = 25565
        name = "Test Server"
        motd = "Welcome"
        max_players = 20
    "#;

    #[test]
    fn parse_minimal_config() {
        let config = ServerConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.server.port, 25565);
        assert!(config.server.show_connection_messages);
        assert_eq!(config.server.players_file, "players.json");
        assert_eq!(config.network.sleep_delay_ms, 5);
        assert_eq!(config.network.max_packets_per_tick, 128);
        assert_eq!(config.network.bulk_threshold, 160);
        assert_eq!(config.security.verify_names, VerifyNames::Balanced);
        assert_eq!(config.anti_cheat.max_distance_squared, 1024);
        assert_eq!(config.anti_cheat.max_packet_count, 200);
        assert_eq!(config.bandwidth.mode, BandwidthMode::Normal);
        assert_eq!(config.bandwidth.full_update_interval, 20);
        assert_eq!(config.logging.level, "info");
        assert!(config.ranks.is_empty());
        assert!(config.worlds.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = format!(
            "{MINIMAL}{}",
            r#"
            main_world = "hub"

            [security]
            verify_names = "always"
            paid_players_only = true

            [bandwidth]
            mode = "very_low"

            [[ranks]]
            name = "guest"
            level = 0
            permissions = ["chat", "build"]

            [[worlds]]
            name = "hub"
            width = 64
            [worlds.settings]
            max_players = 10
            buildable = false
            [[worlds.settings.zones]]
            name = "jail"
            min = { x = 0, y = 0, z = 0 }
            max = { x = 4, y = 4, z = 4 }
            deny_movement = true
            "#
        );
        let config = ServerConfig::parse(&toml_str).unwrap();
        assert_eq!(config.server.main_world.as_deref(), Some("hub"));
        assert_eq!(config.security.verify_names, VerifyNames::Always);
        assert!(config.security.paid_players_only);
        assert_eq!(config.bandwidth.mode, BandwidthMode::VeryLow);
        assert_eq!(config.ranks[0].color, "&f");
        let hub = &config.worlds[0];
        assert_eq!(hub.width, 64);
        assert_eq!(hub.height, 64);
        assert_eq!(hub.settings.max_players, 10);
        assert!(!hub.settings.buildable);
        assert!(hub.settings.zones[0].deny_movement);
    }

    #[test]
    fn unknown_main_world_is_rejected() {
        let toml_str = MINIMAL.replace("max_players = 20", "max_players = 20\nmain_world = \"x\"");
        assert!(matches!(
            ServerConfig::parse(&toml_str),
            Err(ConfigError::Invalid(_))
        ));
    }
}
