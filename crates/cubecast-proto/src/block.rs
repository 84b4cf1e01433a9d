//! Block ids known to classic clients, plus the CustomBlocks level-1 set
//! and the fallbacks used for clients that did not negotiate it.

/// Highest block id every client understands.
pub const MAX_CLASSIC: u8 = 49;

/// Highest block id once CustomBlocks (level 1) is agreed.
pub const MAX_CUSTOM: u8 = 65;

pub const AIR: u8 = 0;
pub const STONE: u8 = 1;
pub const GRASS: u8 = 2;
pub const DIRT: u8 = 3;
pub const COBBLESTONE: u8 = 4;
pub const WOOD: u8 = 5;
pub const ADMINCRETE: u8 = 7;
pub const WATER: u8 = 8;
pub const STILL_WATER: u8 = 9;
pub const LAVA: u8 = 10;
pub const STILL_LAVA: u8 = 11;
pub const SAND: u8 = 12;
pub const GLASS: u8 = 20;
pub const OBSIDIAN: u8 = 49;

const NAMES: [&str; MAX_CUSTOM as usize + 1] = [
    "air",
    "stone",
    "grass",
    "dirt",
    "cobblestone",
    "wood",
    "plant",
    "admincrete",
    "water",
    "still_water",
    "lava",
    "still_lava",
    "sand",
    "gravel",
    "gold_ore",
    "iron_ore",
    "coal",
    "log",
    "leaves",
    "sponge",
    "glass",
    "red",
    "orange",
    "yellow",
    "lime",
    "green",
    "teal",
    "aqua",
    "cyan",
    "blue",
    "indigo",
    "violet",
    "magenta",
    "pink",
    "black",
    "gray",
    "white",
    "yellow_flower",
    "red_flower",
    "brown_mushroom",
    "red_mushroom",
    "gold",
    "iron",
    "double_stair",
    "stair",
    "brick",
    "tnt",
    "books",
    "mossy_rocks",
    "obsidian",
    "cobble_slab",
    "rope",
    "sandstone",
    "snow",
    "fire",
    "light_pink",
    "dark_green",
    "brown",
    "dark_blue",
    "deep_blue",
    "ice",
    "ceramic_tile",
    "magma",
    "pillar",
    "crate",
    "stone_brick",
];

// Indexed by `id - 50`.
const FALLBACKS: [u8; (MAX_CUSTOM - MAX_CLASSIC) as usize] = [
    44, // cobble_slab -> stair
    39, // rope -> brown_mushroom
    12, // sandstone -> sand
    0,  // snow -> air
    10, // fire -> lava
    33, // light_pink -> pink
    25, // dark_green -> green
    3,  // brown -> dirt
    29, // dark_blue -> blue
    28, // deep_blue -> cyan
    20, // ice -> glass
    42, // ceramic_tile -> iron
    49, // magma -> obsidian
    36, // pillar -> white
    5,  // crate -> wood
    1,  // stone_brick -> stone
];

/// Whether `id` names a block in the extended table.
pub fn is_defined(id: u8) -> bool {
    id <= MAX_CUSTOM
}

pub fn name(id: u8) -> Option<&'static str> {
    NAMES.get(usize::from(id)).copied()
}

/// Look a block up by name, case-insensitively.
pub fn parse(name: &str) -> Option<u8> {
    let lower = name.to_ascii_lowercase();
    NAMES.iter().position(|n| *n == lower).map(|i| i as u8)
}

/// Classic replacement for a custom block. Classic ids map to themselves.
pub fn fallback(id: u8) -> u8 {
    if id > MAX_CLASSIC && id <= MAX_CUSTOM {
        FALLBACKS[usize::from(id - MAX_CLASSIC - 1)]
    } else {
        id
    }
}

/// Convert `id` so that it does not exceed `max`.
pub fn downgrade(id: u8, max: u8) -> u8 {
    if id > max {
        fallback(id)
    } else {
        id
    }
}
