//! Wire representation of a full game snapshot
//!
//! A snapshot is always total: every animal, resource and terrain cell is
//! present. Missing fields fall back to the same defaults a freshly created
//! game would use, so partially filled mappings from older peers still decode.

use crate::game::{TerrainType, HUNGER_PER_HP, MAX_THIRST, TERRAIN_HEIGHT, TERRAIN_WIDTH};
use crate::message::{ProtocolError, StateMap};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub current_turn: u32,
    pub game_over: bool,
    pub winner: Option<String>,
    pub animals: Vec<AnimalRecord>,
    pub resources: Vec<ResourceRecord>,
    pub terrain: TerrainRecord,
    // Control flags are owned by the session, so they are only written when
    // set; an encoded game sent as an action never clears them.
    #[serde(skip_serializing_if = "is_false")]
    pub setup_complete: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub game_started: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub players: Vec<PlayerEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Snapshot {
    /// Minimal snapshot standing in for a game that could not be encoded
    pub fn error_flagged(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_state_map(&self) -> Result<StateMap, ProtocolError> {
        match serde_json::to_value(self).map_err(ProtocolError::Encode)? {
            serde_json::Value::Object(map) => Ok(map),
            // A struct always serializes to an object
            _ => Ok(StateMap::new()),
        }
    }

    pub fn from_state_map(state: &StateMap) -> Result<Self, ProtocolError> {
        serde_json::from_value(serde_json::Value::Object(state.clone()))
            .map_err(ProtocolError::Decode)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AnimalWire")]
pub struct AnimalRecord {
    pub name: String,
    pub max_hp: i32,
    pub hp: i32,
    pub max_stamina: i32,
    pub stamina: i32,
    pub speed: i32,
    pub speed_points: i32,
    pub position: u32,
    pub is_alive: bool,
    pub teeth: i32,
    pub claws: i32,
    pub skin: i32,
    pub height: i32,
    pub max_hunger: i32,
    pub hunger: i32,
    pub max_thirst: i32,
    pub thirst: i32,
}

/// Lenient input shape for `AnimalRecord`. Current values default to their
/// maximums, which in turn default to a fresh animal's stats.
#[derive(Deserialize)]
struct AnimalWire {
    name: Option<String>,
    max_hp: Option<i32>,
    hp: Option<i32>,
    max_stamina: Option<i32>,
    stamina: Option<i32>,
    speed: Option<i32>,
    speed_points: Option<i32>,
    position: Option<u32>,
    is_alive: Option<bool>,
    teeth: Option<i32>,
    claws: Option<i32>,
    skin: Option<i32>,
    height: Option<i32>,
    max_hunger: Option<i32>,
    hunger: Option<i32>,
    max_thirst: Option<i32>,
    thirst: Option<i32>,
}

impl From<AnimalWire> for AnimalRecord {
    fn from(wire: AnimalWire) -> Self {
        let max_hp = wire.max_hp.unwrap_or(10);
        let max_stamina = wire.max_stamina.unwrap_or(10);
        let speed = wire.speed.unwrap_or(5);
        let max_hunger = wire.max_hunger.unwrap_or(HUNGER_PER_HP * max_hp);
        let max_thirst = wire.max_thirst.unwrap_or(MAX_THIRST);

        Self {
            name: wire.name.unwrap_or_else(|| "Animal".to_string()),
            max_hp,
            hp: wire.hp.unwrap_or(max_hp),
            max_stamina,
            stamina: wire.stamina.unwrap_or(max_stamina),
            speed,
            speed_points: wire.speed_points.unwrap_or(speed),
            position: wire.position.unwrap_or(1),
            is_alive: wire.is_alive.unwrap_or(true),
            teeth: wire.teeth.unwrap_or(1),
            claws: wire.claws.unwrap_or(1),
            skin: wire.skin.unwrap_or(1),
            height: wire.height.unwrap_or(1),
            max_hunger,
            hunger: wire.hunger.unwrap_or(max_hunger),
            max_thirst,
            thirst: wire.thirst.unwrap_or(max_thirst),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(default = "default_position")]
    pub position: u32,
    #[serde(rename = "type", default = "default_resource_type")]
    pub kind: String,
    #[serde(default = "default_heal_amount")]
    pub heal_amount: i32,
    #[serde(default = "default_stamina_recovery")]
    pub stamina_recovery: i32,
    #[serde(default = "default_hunger_recovery")]
    pub hunger_recovery: i32,
}

fn default_position() -> u32 {
    1
}

fn default_resource_type() -> String {
    "Fruit".to_string()
}

fn default_heal_amount() -> i32 {
    5
}

fn default_stamina_recovery() -> i32 {
    2
}

fn default_hunger_recovery() -> i32 {
    20
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainRecord {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub squares: Vec<CellRecord>,
}

fn default_width() -> u32 {
    TERRAIN_WIDTH
}

fn default_height() -> u32 {
    TERRAIN_HEIGHT
}

impl Default for TerrainRecord {
    fn default() -> Self {
        Self {
            width: TERRAIN_WIDTH,
            height: TERRAIN_HEIGHT,
            squares: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub x: u32,
    pub y: u32,
    #[serde(default)]
    pub terrain_type: TerrainType,
    #[serde(default)]
    pub is_orchard: bool,
    #[serde(default)]
    pub speed_points: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub ready: bool,
}
