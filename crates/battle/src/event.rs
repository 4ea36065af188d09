//! Event payloads. The source engine uses a dynamically-typed `dict` for
//! the payload; here it is a tagged value so a ruleset's handlers can
//! destructure it without resorting to `Any`/downcasting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PayloadValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<PayloadValue>),
    Map(BTreeMap<String, PayloadValue>),
}

/// A single thing that happened in a battle. Events are the only way
/// handlers observe and mutate the simulation: a handler reads the
/// payload, updates `BattleState`, and may enqueue further events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub payload: BTreeMap<String, PayloadValue>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Event { event_type: event_type.into(), payload: BTreeMap::new() }
    }

    pub fn with(mut self, key: impl Into<String>, value: PayloadValue) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.payload.get(key)
    }
}
