//! World appearance: colors, map edge/side, weather, texture pack.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use super::{id, ServerMessage};
use crate::block;
use crate::codec::{self, ProtoEncode};

/// Per-world environment as configured by operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    #[serde(default)]
    pub texture_url: String,
    #[serde(default = "default_side_block")]
    pub side_block: u8,
    #[serde(default = "default_edge_block")]
    pub edge_block: u8,
    /// Water level at the map edge, `-1` for half the map height.
    #[serde(default = "default_level")]
    pub side_level: i16,
    /// Cloud height, `-1` for the client default.
    #[serde(default = "default_level")]
    pub cloud_height: i16,
    /// Fog distance, `0` for the client default.
    #[serde(default)]
    pub max_fog: i16,
    /// 0 sunny, 1 raining, 2 snowing.
    #[serde(default)]
    pub weather: u8,
    #[serde(default)]
    pub sky_color: Option<[u8; 3]>,
    #[serde(default)]
    pub cloud_color: Option<[u8; 3]>,
    #[serde(default)]
    pub fog_color: Option<[u8; 3]>,
    #[serde(default)]
    pub shadow_color: Option<[u8; 3]>,
    #[serde(default)]
    pub sunlight_color: Option<[u8; 3]>,
}

fn default_side_block() -> u8 {
    block::ADMINCRETE
}

fn default_edge_block() -> u8 {
    block::WATER
}

fn default_level() -> i16 {
    -1
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            texture_url: String::new(),
            side_block: default_side_block(),
            edge_block: default_edge_block(),
            side_level: default_level(),
            cloud_height: default_level(),
            max_fog: 0,
            weather: 0,
            sky_color: None,
            cloud_color: None,
            fog_color: None,
            shadow_color: None,
            sunlight_color: None,
        }
    }
}

impl EnvironmentSettings {
    /// Every color slot with its configured value (`None` resets it).
    pub fn colors(&self) -> [(EnvColor, Option<[u8; 3]>); 5] {
        [
            (EnvColor::Sky, self.sky_color),
            (EnvColor::Cloud, self.cloud_color),
            (EnvColor::Fog, self.fog_color),
            (EnvColor::Shadow, self.shadow_color),
            (EnvColor::Sunlight, self.sunlight_color),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvColor {
    Sky = 0,
    Cloud = 1,
    Fog = 2,
    Shadow = 3,
    Sunlight = 4,
}

/// 0x19. A channel of -1 restores the client default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvSetColor {
    pub variable: EnvColor,
    pub rgb: Option<[u8; 3]>,
}

impl ServerMessage for EnvSetColor {
    const ID: u8 = id::ENV_SET_COLOR;
}

impl ProtoEncode for EnvSetColor {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.variable as u8);
        match self.rgb {
            Some([r, g, b]) => {
                buf.put_i16(i16::from(r));
                buf.put_i16(i16::from(g));
                buf.put_i16(i16::from(b));
            }
            None => {
                for _ in 0..3 {
                    buf.put_i16(-1);
                }
            }
        }
    }
}

/// 0x1E. `v2` appends cloud height and fog distance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSetMapAppearance {
    pub texture_url: String,
    pub side_block: u8,
    pub edge_block: u8,
    pub side_level: i16,
    pub v2: Option<(i16, i16)>,
}

impl ServerMessage for EnvSetMapAppearance {
    const ID: u8 = id::ENV_SET_MAP_APPEARANCE;
}

impl ProtoEncode for EnvSetMapAppearance {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        codec::write_string(buf, &self.texture_url);
        buf.put_u8(self.side_block);
        buf.put_u8(self.edge_block);
        buf.put_i16(self.side_level);
        if let Some((cloud_height, max_fog)) = self.v2 {
            buf.put_i16(cloud_height);
            buf.put_i16(max_fog);
        }
    }
}

/// 0x1F.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvSetWeatherType {
    pub weather: u8,
}

impl ServerMessage for EnvSetWeatherType {
    const ID: u8 = id::ENV_SET_WEATHER_TYPE;
}

impl ProtoEncode for EnvSetWeatherType {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.weather);
    }
}

/// 0x28 (EnvMapAspect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetMapEnvUrl {
    pub url: String,
}

impl ServerMessage for SetMapEnvUrl {
    const ID: u8 = id::SET_MAP_ENV_URL;
}

impl ProtoEncode for SetMapEnvUrl {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        codec::write_string(buf, &self.url);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MapEnvProperty {
    SideBlock = 0,
    EdgeBlock = 1,
    EdgeHeight = 2,
    CloudHeight = 3,
    MaxFog = 4,
}

/// 0x29 (EnvMapAspect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetMapEnvProperty {
    pub property: MapEnvProperty,
    pub value: i32,
}

impl ServerMessage for SetMapEnvProperty {
    const ID: u8 = id::SET_MAP_ENV_PROPERTY;
}

impl ProtoEncode for SetMapEnvProperty {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.property as u8);
        buf.put_i32(self.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::Packet;

    #[test]
    fn appearance_versions_differ_in_length() {
        let v1 = EnvSetMapAppearance {
            texture_url: String::new(),
            side_block: 7,
            edge_block: 8,
            side_level: 32,
            v2: None,
        };
        let v2 = EnvSetMapAppearance {
            v2: Some((-1, 0)),
            ..v1.clone()
        };
        assert_eq!(Packet::encode(&v1).len(), 69);
        assert_eq!(Packet::encode(&v2).len(), 73);
    }

    #[test]
    fn reset_color_sends_negative_channels() {
        let packet = Packet::encode(&EnvSetColor {
            variable: EnvColor::Fog,
            rgb: None,
        });
        assert_eq!(&packet.bytes()[..], &[0x19, 2, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn default_colors_all_reset() {
        let env = EnvironmentSettings::default();
        assert_eq!(env.side_block, block::ADMINCRETE);
        assert!(env.colors().iter().all(|(_, rgb)| rgb.is_none()));
    }
}
