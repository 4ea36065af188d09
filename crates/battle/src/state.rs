//! Pure-data records describing a battle at a point in time. These are
//! the only things an event handler is allowed to mutate; they are plain
//! data so a whole `BattleState` can be serialized for a replay or sent
//! over the wire without any engine-internal machinery attached.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Dynamic, per-combatant state the engine itself tracks. Anything
/// ruleset-specific (current HP, status, stat stages) lives in the
/// ruleset's own combatant map, not here — the engine has no opinion on
/// what "health" means.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatantState {
    pub id: String,
}

impl CombatantState {
    pub fn new(id: impl Into<String>) -> Self {
        CombatantState { id: id.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamState {
    pub combatants: Vec<CombatantState>,
    pub active_combatant_id: String,
    pub hazards: BTreeSet<String>,
}

impl TeamState {
    pub fn new(combatants: Vec<CombatantState>, active_combatant_id: impl Into<String>) -> Self {
        TeamState { combatants, active_combatant_id: active_combatant_id.into(), hazards: BTreeSet::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleState {
    pub teams: Vec<TeamState>,
    pub turn_number: u64,
    pub weather: Option<String>,
    pub terrain: Option<String>,
}

impl BattleState {
    pub fn new(teams: Vec<TeamState>) -> Self {
        BattleState { teams, turn_number: 0, weather: None, terrain: None }
    }

    /// Builds the lookup every `Battle` needs at construction: which team
    /// each combatant id belongs to, so actions can be validated cheaply.
    pub fn team_of(&self, combatant_id: &str) -> Option<usize> {
        self.teams.iter().position(|t| t.combatants.iter().any(|c| c.id == combatant_id))
    }

    pub fn combatant_ids(&self) -> HashMap<String, usize> {
        let mut map = HashMap::new();
        for (team_idx, team) in self.teams.iter().enumerate() {
            for combatant in &team.combatants {
                map.insert(combatant.id.clone(), team_idx);
            }
        }
        map
    }
}
