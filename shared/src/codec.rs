//! Conversion between the game model and its wire snapshot
//!
//! `encode` never fails: a game that cannot be represented yields an
//! error-flagged snapshot instead. `decode` fully replaces the terrain, animals
//! and resources of the target game, and leaves the target untouched when the
//! input is unusable.

use crate::game::{Animal, GameState, Resource, ResourceKind, Terrain};
use crate::message::StateMap;
use crate::snapshot::{AnimalRecord, CellRecord, ResourceRecord, Snapshot, TerrainRecord};
use log::{debug, error, warn};
use thiserror::Error;

/// Upper bound on `width * height` accepted from the wire
pub const MAX_TERRAIN_CELLS: u64 = 65_536;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("terrain grid does not match its {width}x{height} dimensions")]
    TerrainMismatch { width: u32, height: u32 },
    #[error("winner index {index} out of range for {animals} animals")]
    WinnerOutOfRange { index: usize, animals: usize },
    #[error("animal {name} is off the grid at position {position}")]
    AnimalOffGrid { name: String, position: u32 },
    #[error("resource at position {0} is off the grid")]
    ResourceOffGrid(u32),
    #[error("terrain of {width}x{height} cells exceeds the supported size")]
    TerrainTooLarge { width: u32, height: u32 },
}

pub fn encode(game: &GameState) -> Snapshot {
    match try_encode(game) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Failed to encode game state: {}", e);
            Snapshot::error_flagged(e.to_string())
        }
    }
}

/// Encodes straight to the mapping carried in `action` and `game_update`
pub fn encode_state(game: &GameState) -> StateMap {
    let snapshot = encode(game);
    match snapshot.to_state_map() {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to serialize snapshot: {}", e);
            Snapshot::error_flagged(e.to_string())
                .to_state_map()
                .unwrap_or_default()
        }
    }
}

fn try_encode(game: &GameState) -> Result<Snapshot, SnapshotError> {
    let terrain = &game.terrain;
    if !terrain.is_consistent() {
        return Err(SnapshotError::TerrainMismatch {
            width: terrain.width,
            height: terrain.height,
        });
    }

    let winner = match game.winner {
        Some(index) => match game.animals.get(index) {
            Some(animal) => Some(animal.name.clone()),
            None => {
                return Err(SnapshotError::WinnerOutOfRange {
                    index,
                    animals: game.animals.len(),
                })
            }
        },
        None => None,
    };

    let mut animals = Vec::with_capacity(game.animals.len());
    for animal in &game.animals {
        if terrain.square_at(animal.position).is_none() {
            return Err(SnapshotError::AnimalOffGrid {
                name: animal.name.clone(),
                position: animal.position,
            });
        }
        animals.push(animal_record(animal));
    }

    let mut resources = Vec::with_capacity(game.resources.len());
    for (&position, resource) in &game.resources {
        if terrain.square_at(position).is_none() {
            return Err(SnapshotError::ResourceOffGrid(position));
        }
        resources.push(ResourceRecord {
            position,
            kind: resource.kind.as_str().to_string(),
            heal_amount: resource.heal_amount,
            stamina_recovery: resource.stamina_recovery,
            hunger_recovery: resource.hunger_recovery,
        });
    }

    let squares = terrain
        .grid
        .iter()
        .flatten()
        .map(|square| CellRecord {
            x: square.x,
            y: square.y,
            terrain_type: square.terrain_type,
            is_orchard: square.is_orchard,
            speed_points: square.speed_points,
        })
        .collect();

    Ok(Snapshot {
        current_turn: game.current_turn,
        game_over: game.game_over,
        winner,
        animals,
        resources,
        terrain: TerrainRecord {
            width: terrain.width,
            height: terrain.height,
            squares,
        },
        ..Snapshot::default()
    })
}

fn animal_record(animal: &Animal) -> AnimalRecord {
    AnimalRecord {
        name: animal.name.clone(),
        max_hp: animal.max_hp,
        hp: animal.hp,
        max_stamina: animal.max_stamina,
        stamina: animal.stamina,
        speed: animal.speed,
        speed_points: animal.speed_points,
        position: animal.position,
        is_alive: animal.is_alive,
        teeth: animal.teeth,
        claws: animal.claws,
        skin: animal.skin,
        height: animal.height,
        max_hunger: animal.max_hunger,
        hunger: animal.hunger,
        max_thirst: animal.max_thirst,
        thirst: animal.thirst,
    }
}

fn animal_from_record(record: &AnimalRecord) -> Animal {
    Animal {
        name: record.name.clone(),
        max_hp: record.max_hp,
        hp: record.hp,
        max_stamina: record.max_stamina,
        stamina: record.stamina,
        speed: record.speed,
        speed_points: record.speed_points,
        position: record.position,
        is_alive: record.is_alive,
        teeth: record.teeth,
        claws: record.claws,
        skin: record.skin,
        height: record.height,
        max_hunger: record.max_hunger,
        hunger: record.hunger,
        max_thirst: record.max_thirst,
        thirst: record.thirst,
    }
}

fn resource_from_record(record: &ResourceRecord) -> Resource {
    match ResourceKind::from_name(&record.kind) {
        ResourceKind::Fruit => Resource {
            kind: ResourceKind::Fruit,
            heal_amount: record.heal_amount,
            stamina_recovery: record.stamina_recovery,
            hunger_recovery: record.hunger_recovery,
        },
        kind => Resource::of_kind(kind),
    }
}

/// Rebuilds `target` from a snapshot.
///
/// Terrain, animals and resources are replaced wholesale. Control flags
/// (`setup_complete`, `game_started`, `players`) belong to the session and are
/// not interpreted here. Error-flagged snapshots and oversized terrains are
/// logged and the target comes back unchanged.
pub fn decode(snapshot: &Snapshot, mut target: GameState) -> GameState {
    if let Some(message) = &snapshot.error {
        warn!("Received error-flagged snapshot: {}", message);
        return target;
    }

    let (width, height) = (snapshot.terrain.width, snapshot.terrain.height);
    if u64::from(width) * u64::from(height) > MAX_TERRAIN_CELLS {
        warn!(
            "Ignoring snapshot: {}",
            SnapshotError::TerrainTooLarge { width, height }
        );
        return target;
    }

    let mut terrain = Terrain::new(width, height);
    for cell in &snapshot.terrain.squares {
        match terrain.square_mut(cell.x, cell.y) {
            Some(square) => {
                square.terrain_type = cell.terrain_type;
                square.is_orchard = cell.is_orchard;
                square.speed_points = cell.speed_points;
            }
            None => debug!(
                "Skipping cell ({}, {}) outside {}x{} terrain",
                cell.x, cell.y, width, height
            ),
        }
    }

    target.current_turn = snapshot.current_turn;
    target.game_over = snapshot.game_over;
    target.terrain = terrain;
    target.animals.clear();
    target.resources.clear();
    target.winner = None;

    for record in &snapshot.animals {
        if !target.add_animal(animal_from_record(record)) {
            warn!(
                "Skipping animal {} at unusable position {}",
                record.name, record.position
            );
        }
    }

    for record in &snapshot.resources {
        if !target.add_resource(record.position, resource_from_record(record)) {
            warn!("Skipping resource at unusable position {}", record.position);
        }
    }

    if target.game_over {
        if let Some(name) = &snapshot.winner {
            target.winner = target.animals.iter().position(|a| &a.name == name);
        }
    }

    target
}

/// Decodes the raw mapping received in `game_update`. A mapping that is not a
/// valid snapshot is logged and the target is returned unchanged.
pub fn decode_state(state: &StateMap, target: GameState) -> GameState {
    match Snapshot::from_state_map(state) {
        Ok(snapshot) => decode(&snapshot, target),
        Err(e) => {
            warn!("Keeping last good game state: {}", e);
            target
        }
    }
}
