//! Loaders for the static JSON data caches (pokemon/moves/items/types)
//! consulted by ruleset collaborators, never by the engine itself. Kept
//! here because the engine's own tests build fixture rulesets against
//! this schema. A missing or malformed file yields an empty map rather
//! than aborting, matching the original "log and continue" loader.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BaseStats {
    pub hp: u32,
    pub attack: u32,
    pub defense: u32,
    #[serde(alias = "sp_attack")]
    pub special_attack: u32,
    #[serde(alias = "sp_defense")]
    pub special_defense: u32,
    pub speed: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PokemonData {
    pub name: String,
    pub types: Vec<String>,
    pub base_stats: BaseStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveCategory {
    Physical,
    Special,
    Status,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveData {
    pub name: String,
    pub move_type: String,
    pub category: MoveCategory,
    pub power: Option<u32>,
    pub accuracy: Option<u32>,
    pub pp: u32,
    pub priority: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemData {
    pub name: String,
    pub fling_power: Option<u32>,
    pub effect: Option<String>,
}

pub type TypeChart = HashMap<String, HashMap<String, f64>>;

fn load_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                log::error!("error loading data from {}: {e}", path.display());
                T::default()
            }
        },
        Err(e) => {
            log::error!("error loading data from {}: {e}", path.display());
            T::default()
        }
    }
}

pub fn load_pokemon_data(path: impl AsRef<Path>) -> HashMap<String, PokemonData> {
    load_json(path.as_ref())
}

pub fn load_move_data(path: impl AsRef<Path>) -> HashMap<String, MoveData> {
    load_json(path.as_ref())
}

pub fn load_item_data(path: impl AsRef<Path>) -> HashMap<String, ItemData> {
    load_json(path.as_ref())
}

pub fn load_type_data(path: impl AsRef<Path>) -> TypeChart {
    load_json(path.as_ref())
}
