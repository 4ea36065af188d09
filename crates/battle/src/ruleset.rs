//! The `Ruleset` trait is the "brain" of a simulation: it owns all
//! game-specific logic as a table of event handlers, plus a lookup from
//! combatant id to combatant. The driver and event queue know nothing
//! about damage, health, or victory — only that handlers exist and can
//! be invoked.

use std::collections::HashMap;

use crate::event::Event;
use crate::queue::EventQueue;
use crate::state::BattleState;

pub type Handler = Box<dyn Fn(&Event, &mut BattleState, &mut EventQueue<'_>)>;

#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Vec<Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        HandlerTable::default()
    }

    pub fn register(&mut self, event_type: impl Into<String>, handler: impl Fn(&Event, &mut BattleState, &mut EventQueue<'_>) + 'static) {
        self.handlers.entry(event_type.into()).or_default().push(Box::new(handler));
    }

    pub fn get(&self, event_type: &str) -> Option<&Vec<Handler>> {
        self.handlers.get(event_type)
    }
}

/// Game-specific logic. The engine is deliberately ignorant of what a
/// `Ruleset` implementation actually simulates; it only dispatches events
/// to whatever handlers are registered here.
pub trait Ruleset {
    fn event_handlers(&self) -> &HandlerTable;

    /// The ids of every combatant this ruleset knows about, in a stable
    /// order. Used only for validation (e.g. "does this action's user_id
    /// refer to a real combatant?"); the driver does not otherwise care.
    fn combatant_ids(&self) -> Vec<String>;
}
