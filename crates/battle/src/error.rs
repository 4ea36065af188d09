use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BattleError {
    #[error("team {team_index} was provided with no active combatant")]
    NoActiveCombatant { team_index: usize },

    #[error("action submitted for unknown combatant '{combatant_id}'")]
    UnknownCombatant { combatant_id: String },
}
