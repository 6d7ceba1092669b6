//! Minimal game model the snapshot codec reads from and writes into
//!
//! Only the data that crosses the wire lives here. Turn resolution, combat and
//! the rest of the game rules belong to the game loop, not to this crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TERRAIN_WIDTH: u32 = 10;
pub const TERRAIN_HEIGHT: u32 = 10;
pub const SQUARE_INITIAL_SPEED_POINTS: i32 = 100;

pub const MAX_THIRST: i32 = 100;
pub const HUNGER_PER_HP: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerrainType {
    #[default]
    Normal,
    Water,
    Forest,
    Mountain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Square {
    pub x: u32,
    pub y: u32,
    pub terrain_type: TerrainType,
    pub is_orchard: bool,
    pub speed_points: i32,
}

impl Square {
    pub fn new(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            terrain_type: TerrainType::Normal,
            is_orchard: false,
            speed_points: SQUARE_INITIAL_SPEED_POINTS,
        }
    }
}

/// Rectangular grid of squares indexed as `grid[y][x]`.
///
/// Positions are 1-based and row-major: `position = y * width + x + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Terrain {
    pub width: u32,
    pub height: u32,
    pub grid: Vec<Vec<Square>>,
}

impl Terrain {
    pub fn new(width: u32, height: u32) -> Self {
        let grid = (0..height)
            .map(|y| (0..width).map(|x| Square::new(x, y)).collect())
            .collect();
        Self {
            width,
            height,
            grid,
        }
    }

    pub fn cell_count(&self) -> u32 {
        self.width * self.height
    }

    pub fn position_to_coordinates(&self, position: u32) -> Option<(u32, u32)> {
        if position == 0 || position > self.cell_count() {
            return None;
        }
        let index = position - 1;
        Some((index % self.width, index / self.width))
    }

    pub fn is_valid_position(&self, position: u32) -> bool {
        self.position_to_coordinates(position).is_some()
    }

    pub fn square(&self, x: u32, y: u32) -> Option<&Square> {
        self.grid.get(y as usize)?.get(x as usize)
    }

    pub fn square_mut(&mut self, x: u32, y: u32) -> Option<&mut Square> {
        self.grid.get_mut(y as usize)?.get_mut(x as usize)
    }

    pub fn square_at(&self, position: u32) -> Option<&Square> {
        let (x, y) = self.position_to_coordinates(position)?;
        self.square(x, y)
    }

    /// True when the grid has exactly `height` rows of `width` squares each
    pub fn is_consistent(&self) -> bool {
        self.grid.len() == self.height as usize
            && self.grid.iter().all(|row| row.len() == self.width as usize)
    }
}

impl Default for Terrain {
    fn default() -> Self {
        Self::new(TERRAIN_WIDTH, TERRAIN_HEIGHT)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Animal {
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

impl Animal {
    /// Creates a fresh animal at full health, stamina, hunger and thirst.
    /// Attributes start at 1; use `with_attributes` to set them.
    pub fn new(name: &str, hp: i32, stamina: i32, speed: i32, position: u32) -> Self {
        Self {
            name: name.to_string(),
            max_hp: hp,
            hp,
            max_stamina: stamina,
            stamina,
            speed,
            speed_points: speed,
            position,
            is_alive: true,
            teeth: 1,
            claws: 1,
            skin: 1,
            height: 1,
            max_hunger: HUNGER_PER_HP * hp,
            hunger: HUNGER_PER_HP * hp,
            max_thirst: MAX_THIRST,
            thirst: MAX_THIRST,
        }
    }

    pub fn with_attributes(mut self, teeth: i32, claws: i32, skin: i32, height: i32) -> Self {
        self.teeth = teeth;
        self.claws = claws;
        self.skin = skin;
        self.height = height;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceKind {
    #[default]
    Fruit,
    GreenFruit,
    RedFruit,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Fruit => "Fruit",
            ResourceKind::GreenFruit => "GreenFruit",
            ResourceKind::RedFruit => "RedFruit",
        }
    }

    /// Unrecognised names fall back to the generic fruit
    pub fn from_name(name: &str) -> Self {
        match name {
            "GreenFruit" => ResourceKind::GreenFruit,
            "RedFruit" => ResourceKind::RedFruit,
            _ => ResourceKind::Fruit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub kind: ResourceKind,
    pub heal_amount: i32,
    pub stamina_recovery: i32,
    pub hunger_recovery: i32,
}

impl Resource {
    pub fn fruit() -> Self {
        Self {
            kind: ResourceKind::Fruit,
            heal_amount: 5,
            stamina_recovery: 2,
            hunger_recovery: 200,
        }
    }

    pub fn green_fruit() -> Self {
        Self {
            kind: ResourceKind::GreenFruit,
            heal_amount: 2,
            stamina_recovery: 0,
            hunger_recovery: 150,
        }
    }

    pub fn red_fruit() -> Self {
        Self {
            kind: ResourceKind::RedFruit,
            heal_amount: 0,
            stamina_recovery: 5,
            hunger_recovery: 200,
        }
    }

    pub fn of_kind(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Fruit => Self::fruit(),
            ResourceKind::GreenFruit => Self::green_fruit(),
            ResourceKind::RedFruit => Self::red_fruit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub current_turn: u32,
    pub game_over: bool,
    /// Index into `animals`
    pub winner: Option<usize>,
    pub animals: Vec<Animal>,
    /// Resources keyed by board position
    pub resources: BTreeMap<u32, Resource>,
    pub terrain: Terrain,
}

impl GameState {
    pub fn new() -> Self {
        Self::with_terrain(Terrain::default())
    }

    pub fn with_terrain(terrain: Terrain) -> Self {
        Self {
            current_turn: 0,
            game_over: false,
            winner: None,
            animals: Vec::new(),
            resources: BTreeMap::new(),
            terrain,
        }
    }

    /// Places an animal on the board. Returns false and leaves the game
    /// untouched if the position is off the grid or already occupied.
    pub fn add_animal(&mut self, animal: Animal) -> bool {
        if !self.terrain.is_valid_position(animal.position) || self.is_occupied(animal.position) {
            return false;
        }
        self.animals.push(animal);
        true
    }

    pub fn add_resource(&mut self, position: u32, resource: Resource) -> bool {
        if !self.terrain.is_valid_position(position) {
            return false;
        }
        self.resources.insert(position, resource);
        true
    }

    pub fn is_occupied(&self, position: u32) -> bool {
        self.animals.iter().any(|a| a.position == position)
    }

    pub fn winner(&self) -> Option<&Animal> {
        self.winner.and_then(|index| self.animals.get(index))
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
