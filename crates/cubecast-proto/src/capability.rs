//! CPE capability set and the single mapping from negotiated capabilities to
//! the wire shapes a session may use.

use bitflags::bitflags;

use crate::block;
use crate::codec::STRING_LEN;
use crate::packets::{
    AddEntity, BulkBlockUpdate, ChangeModel, EnvSetColor, EnvSetMapAppearance, EnvSetWeatherType,
    EnvironmentSettings, ExtAddEntity2, ExtEntry, HackControl, HoldThis, MapEnvProperty, Message,
    MessageClass, Packet, SetBlock, SetBlockPermission, SetClickDistance, SetMapEnvProperty,
    SetMapEnvUrl,
};
use crate::types::{BlockPos, Position};

bitflags! {
    /// Extensions agreed with one client.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CapabilitySet: u32 {
        const CLICK_DISTANCE = 1 << 0;
        const CUSTOM_BLOCKS = 1 << 1;
        const HELD_BLOCK = 1 << 2;
        const EXT_PLAYER_LIST = 1 << 3;
        const ENV_COLORS = 1 << 4;
        const BLOCK_PERMISSIONS = 1 << 5;
        const CHANGE_MODEL = 1 << 6;
        const ENV_MAP_APPEARANCE = 1 << 7;
        const ENV_MAP_APPEARANCE_V2 = 1 << 8;
        const ENV_WEATHER_TYPE = 1 << 9;
        const HACK_CONTROL = 1 << 10;
        const MESSAGE_TYPES = 1 << 11;
        const PLAYER_CLICK = 1 << 12;
        const LONGER_MESSAGES = 1 << 13;
        const BULK_BLOCK_UPDATE = 1 << 14;
        const ENV_MAP_ASPECT = 1 << 15;
    }
}

/// One extension the server advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extension {
    pub name: &'static str,
    pub version: i32,
    pub flag: CapabilitySet,
}

const fn ext(name: &'static str, version: i32, flag: CapabilitySet) -> Extension {
    Extension {
        name,
        version,
        flag,
    }
}

/// Everything the server offers during negotiation.
pub const SUPPORTED_EXTENSIONS: &[Extension] = &[
    ext("ClickDistance", 1, CapabilitySet::CLICK_DISTANCE),
    ext("CustomBlocks", 1, CapabilitySet::CUSTOM_BLOCKS),
    ext("HeldBlock", 1, CapabilitySet::HELD_BLOCK),
    ext("ExtPlayerList", 2, CapabilitySet::EXT_PLAYER_LIST),
    ext("EnvColors", 1, CapabilitySet::ENV_COLORS),
    ext("BlockPermissions", 1, CapabilitySet::BLOCK_PERMISSIONS),
    ext("ChangeModel", 1, CapabilitySet::CHANGE_MODEL),
    ext("EnvMapAppearance", 2, CapabilitySet::ENV_MAP_APPEARANCE),
    ext("EnvWeatherType", 1, CapabilitySet::ENV_WEATHER_TYPE),
    ext("HackControl", 1, CapabilitySet::HACK_CONTROL),
    ext("MessageTypes", 1, CapabilitySet::MESSAGE_TYPES),
    ext("PlayerClick", 1, CapabilitySet::PLAYER_CLICK),
    ext("LongerMessages", 1, CapabilitySet::LONGER_MESSAGES),
    ext("BulkBlockUpdate", 1, CapabilitySet::BULK_BLOCK_UPDATE),
    ext("EnvMapAspect", 1, CapabilitySet::ENV_MAP_ASPECT),
];

impl CapabilitySet {
    /// Flag for one client entry, if both sides agree on name and version.
    /// EnvMapAppearance is accepted at version 1 or 2.
    pub fn for_entry(entry: &ExtEntry) -> CapabilitySet {
        let Some(ext) = SUPPORTED_EXTENSIONS
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(&entry.name))
        else {
            return CapabilitySet::empty();
        };
        if ext.flag == CapabilitySet::ENV_MAP_APPEARANCE {
            return match entry.version {
                1 => CapabilitySet::ENV_MAP_APPEARANCE,
                2 => CapabilitySet::ENV_MAP_APPEARANCE | CapabilitySet::ENV_MAP_APPEARANCE_V2,
                _ => CapabilitySet::empty(),
            };
        }
        if ext.version == entry.version {
            ext.flag
        } else {
            CapabilitySet::empty()
        }
    }

    /// Intersection of our list with the client's.
    pub fn negotiate<'a>(entries: impl IntoIterator<Item = &'a ExtEntry>) -> CapabilitySet {
        entries
            .into_iter()
            .fold(CapabilitySet::empty(), |acc, e| acc | CapabilitySet::for_entry(e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityShape {
    Legacy,
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvShape {
    None,
    AppearanceV1,
    AppearanceV2,
    MapAspect,
}

/// How to talk to one client, derived once from its capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    caps: CapabilitySet,
    entity: EntityShape,
    env: EnvShape,
    max_block: u8,
}

impl From<CapabilitySet> for Encoding {
    fn from(caps: CapabilitySet) -> Self {
        let entity = if caps.contains(CapabilitySet::EXT_PLAYER_LIST) {
            EntityShape::Extended
        } else {
            EntityShape::Legacy
        };
        let env = if caps.contains(CapabilitySet::ENV_MAP_ASPECT) {
            EnvShape::MapAspect
        } else if caps.contains(CapabilitySet::ENV_MAP_APPEARANCE_V2) {
            EnvShape::AppearanceV2
        } else if caps.contains(CapabilitySet::ENV_MAP_APPEARANCE) {
            EnvShape::AppearanceV1
        } else {
            EnvShape::None
        };
        let max_block = if caps.contains(CapabilitySet::CUSTOM_BLOCKS) {
            block::MAX_CUSTOM
        } else {
            block::MAX_CLASSIC
        };
        Self {
            caps,
            entity,
            env,
            max_block,
        }
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Self::from(CapabilitySet::empty())
    }
}

impl Encoding {
    pub fn capabilities(&self) -> CapabilitySet {
        self.caps
    }

    pub fn supports(&self, flag: CapabilitySet) -> bool {
        self.caps.contains(flag)
    }

    pub fn entity_shape(&self) -> EntityShape {
        self.entity
    }

    pub fn env_shape(&self) -> EnvShape {
        self.env
    }

    pub fn max_block(&self) -> u8 {
        self.max_block
    }

    /// Block id this client can render.
    pub fn convert_block(&self, id: u8) -> u8 {
        block::downgrade(id, self.max_block)
    }

    pub fn add_entity(&self, id: u8, name: &str, skin: &str, position: Position) -> Packet {
        match self.entity {
            EntityShape::Extended => {
                Packet::encode(&ExtAddEntity2::new(id, name, skin, position))
            }
            EntityShape::Legacy => Packet::encode(&AddEntity::new(id, name, position)),
        }
    }

    pub fn set_block(&self, pos: BlockPos, id: u8) -> Packet {
        Packet::encode(&SetBlock {
            pos,
            block: self.convert_block(id),
        })
    }

    /// One bulk packet for up to 256 `(map index, block)` pairs, when the
    /// client negotiated BulkBlockUpdate.
    pub fn bulk_blocks(&self, entries: &[(i32, u8)]) -> Option<Packet> {
        if !self.supports(CapabilitySet::BULK_BLOCK_UPDATE) || entries.is_empty() {
            return None;
        }
        let entries = entries
            .iter()
            .map(|&(index, id)| (index, self.convert_block(id)))
            .collect();
        Some(Packet::encode(&BulkBlockUpdate { entries }))
    }

    /// Appearance, colors and weather, in whatever shape the client accepts.
    pub fn environment(&self, env: &EnvironmentSettings) -> Vec<Packet> {
        let mut packets = Vec::new();
        let side = self.convert_block(env.side_block);
        let edge = self.convert_block(env.edge_block);
        match self.env {
            EnvShape::None => {}
            EnvShape::AppearanceV1 | EnvShape::AppearanceV2 => {
                let v2 = (self.env == EnvShape::AppearanceV2)
                    .then_some((env.cloud_height, env.max_fog));
                packets.push(Packet::encode(&EnvSetMapAppearance {
                    texture_url: env.texture_url.clone(),
                    side_block: side,
                    edge_block: edge,
                    side_level: env.side_level,
                    v2,
                }));
            }
            EnvShape::MapAspect => {
                packets.push(Packet::encode(&SetMapEnvUrl {
                    url: env.texture_url.clone(),
                }));
                let properties = [
                    (MapEnvProperty::SideBlock, i32::from(side)),
                    (MapEnvProperty::EdgeBlock, i32::from(edge)),
                    (MapEnvProperty::EdgeHeight, i32::from(env.side_level)),
                    (MapEnvProperty::CloudHeight, i32::from(env.cloud_height)),
                    (MapEnvProperty::MaxFog, i32::from(env.max_fog)),
                ];
                for (property, value) in properties {
                    packets.push(Packet::encode(&SetMapEnvProperty { property, value }));
                }
            }
        }
        if self.supports(CapabilitySet::ENV_COLORS) {
            for (variable, rgb) in env.colors() {
                packets.push(Packet::encode(&EnvSetColor { variable, rgb }));
            }
        }
        if self.supports(CapabilitySet::ENV_WEATHER_TYPE) {
            packets.push(Packet::encode(&EnvSetWeatherType {
                weather: env.weather,
            }));
        }
        packets
    }

    /// Type byte for `class`, or `None` when the client cannot show it.
    pub fn message_type(&self, class: MessageClass) -> Option<u8> {
        if class == MessageClass::Chat || self.supports(CapabilitySet::MESSAGE_TYPES) {
            Some(class.type_byte())
        } else {
            None
        }
    }

    /// Chat text wrapped into 64-character lines. Non-chat classes get a
    /// single truncated line, or nothing if unsupported.
    pub fn message(&self, class: MessageClass, text: &str) -> Vec<Packet> {
        let Some(kind) = self.message_type(class) else {
            return Vec::new();
        };
        if class != MessageClass::Chat {
            return vec![Packet::encode(&Message::new(kind, text))];
        }
        wrap_lines(text)
            .into_iter()
            .map(|line| Packet::encode(&Message::new(kind, line)))
            .collect()
    }

    pub fn hold_this(&self, block: u8, prevent_change: bool) -> Option<Packet> {
        self.supports(CapabilitySet::HELD_BLOCK).then(|| {
            Packet::encode(&HoldThis {
                block: self.convert_block(block),
                prevent_change,
            })
        })
    }

    /// Reach in blocks.
    pub fn click_distance(&self, blocks: i16) -> Option<Packet> {
        self.supports(CapabilitySet::CLICK_DISTANCE).then(|| {
            Packet::encode(&SetClickDistance {
                distance: blocks.saturating_mul(32),
            })
        })
    }

    pub fn hack_control(&self, hacks: &HackControl) -> Option<Packet> {
        self.supports(CapabilitySet::HACK_CONTROL)
            .then(|| Packet::encode(hacks))
    }

    /// Place/delete permission for every block the client knows.
    pub fn block_permissions(&self, allowed: impl Fn(u8) -> (bool, bool)) -> Vec<Packet> {
        if !self.supports(CapabilitySet::BLOCK_PERMISSIONS) {
            return Vec::new();
        }
        (1..=self.max_block)
            .map(|block| {
                let (allow_place, allow_delete) = allowed(block);
                Packet::encode(&SetBlockPermission {
                    block,
                    allow_place,
                    allow_delete,
                })
            })
            .collect()
    }

    pub fn change_model(&self, id: u8, model: &str) -> Option<Packet> {
        self.supports(CapabilitySet::CHANGE_MODEL).then(|| {
            Packet::encode(&ChangeModel {
                id,
                model: model.to_string(),
            })
        })
    }
}

/// Split text into protocol-width lines, continuation lines prefixed "> ".
fn wrap_lines(text: &str) -> Vec<String> {
    const PREFIX: &str = "> ";
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= STRING_LEN {
        return vec![text.to_string()];
    }
    let mut lines = vec![chars[..STRING_LEN].iter().collect::<String>()];
    let width = STRING_LEN - PREFIX.len();
    for chunk in chars[STRING_LEN..].chunks(width) {
        lines.push(format!("{PREFIX}{}", chunk.iter().collect::<String>()));
    }
    lines
}
