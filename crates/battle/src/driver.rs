//! `Battle`: owns the state and the ruleset reference, and drives whole
//! turns. The engine has no opinion on what an action *does* — only its
//! priority, used to order the "action-request" events it wraps actions
//! in before handing the turn to the event queue.

use crate::error::BattleError;
use crate::event::{Event, PayloadValue};
use crate::queue::EventQueue;
use crate::ruleset::Ruleset;
use crate::state::{BattleState, CombatantState, TeamState};

/// One combatant as supplied at battle construction: just enough to seed
/// `BattleState`. Everything else about the combatant (stats, moves,
/// held item) lives in the ruleset's own combatant map.
#[derive(Debug, Clone)]
pub struct CombatantSpec {
    pub id: String,
    pub is_active: bool,
}

impl CombatantSpec {
    pub fn new(id: impl Into<String>, is_active: bool) -> Self {
        CombatantSpec { id: id.into(), is_active }
    }
}

/// A single action a combatant takes this turn. The engine reads only
/// `priority`, for scheduling; `payload` is opaque and interpreted solely
/// by ruleset handlers reacting to the "action-request" event it's
/// wrapped in.
#[derive(Debug, Clone)]
pub struct Action {
    pub priority: i32,
    pub payload: PayloadValue,
}

impl Action {
    pub fn new(priority: i32, payload: PayloadValue) -> Self {
        Action { priority, payload }
    }
}

pub struct Battle<R: Ruleset> {
    pub state: BattleState,
    ruleset: R,
    pending: Vec<(String, Vec<Action>)>,
}

impl<R: Ruleset> Battle<R> {
    pub fn new(teams: Vec<Vec<CombatantSpec>>, ruleset: R) -> Result<Self, BattleError> {
        let mut team_states = Vec::with_capacity(teams.len());
        for (team_index, combatants) in teams.into_iter().enumerate() {
            let mut active_id = None;
            let mut combatant_states = Vec::with_capacity(combatants.len());
            for combatant in &combatants {
                combatant_states.push(CombatantState::new(combatant.id.clone()));
                if combatant.is_active {
                    active_id = Some(combatant.id.clone());
                }
            }
            let active_id = active_id.ok_or(BattleError::NoActiveCombatant { team_index })?;
            team_states.push(TeamState::new(combatant_states, active_id));
        }
        Ok(Battle { state: BattleState::new(team_states), ruleset, pending: Vec::new() })
    }

    /// Players submit their chosen actions for the turn as an ordered
    /// list of (combatant id, action list) pairs; empty lists are dropped
    /// before scheduling. The order supplied here is the tie-break order
    /// `process_turn`'s stable sort falls back to for equal priorities,
    /// so this takes a `Vec` rather than a `HashMap` — a hash map's
    /// iteration order is randomized per process and would make
    /// same-priority ties nondeterministic across runs.
    pub fn submit_actions(&mut self, actions: Vec<(String, Vec<Action>)>) -> Result<(), BattleError> {
        let known_ids = self.state.combatant_ids();
        self.pending.clear();
        for (combatant_id, actions) in actions {
            if actions.is_empty() {
                continue;
            }
            if !known_ids.contains_key(&combatant_id) {
                return Err(BattleError::UnknownCombatant { combatant_id });
            }
            self.pending.push((combatant_id, actions));
        }
        Ok(())
    }

    /// Runs a full turn: schedules this turn's submitted actions by
    /// priority (stable, descending, ties preserved), drains the event
    /// queue to completion, then increments the turn counter.
    pub fn process_turn(&mut self) -> Vec<Event> {
        log::info!("processing turn {}", self.state.turn_number + 1);

        self.pending.sort_by_key(|(_, actions)| std::cmp::Reverse(actions[0].priority));

        let mut queue = EventQueue::new(&self.ruleset);
        for (user_id, actions) in self.pending.drain(..) {
            for action in actions {
                let mut event = Event::new("action-request");
                event.payload.insert("user-id".to_string(), PayloadValue::Str(user_id.clone()));
                event.payload.insert("action-priority".to_string(), PayloadValue::Int(action.priority as i64));
                event.payload.insert("action".to_string(), action.payload);
                queue.enqueue_back(event);
            }
        }

        let log = queue.drain(&mut self.state);
        self.state.turn_number += 1;
        log
    }

    pub fn ruleset(&self) -> &R {
        &self.ruleset
    }
}
