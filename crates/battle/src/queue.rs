//! The double-ended event queue: the heart of the deterministic turn loop.
//! Handlers run synchronously and may enqueue further events — at the
//! back for "happens later" or the front for an immediate reaction — so
//! the queue is genuinely reentrant: `drain` keeps popping until whatever
//! handlers pushed is gone too.

use std::collections::VecDeque;

use crate::event::Event;
use crate::ruleset::{HandlerTable, Ruleset};
use crate::state::BattleState;

pub struct EventQueue<'a> {
    queue: VecDeque<Event>,
    handlers: &'a HandlerTable,
}

impl<'a> EventQueue<'a> {
    pub fn new(ruleset: &'a impl Ruleset) -> Self {
        EventQueue { queue: VecDeque::new(), handlers: ruleset.event_handlers() }
    }

    /// Enqueues `event` for processing after everything already queued.
    pub fn enqueue_back(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    /// Enqueues `event` to be processed next, ahead of anything already
    /// queued. Used by reactive handlers (e.g. an ability triggering off
    /// damage just dealt).
    pub fn enqueue_front(&mut self, event: Event) {
        self.queue.push_front(event);
    }

    /// Drains the queue to empty, dispatching every event to every
    /// handler registered for its `event_type` exactly once. Returns the
    /// full processing log, in the order events were actually handled.
    pub fn drain(&mut self, state: &mut BattleState) -> Vec<Event> {
        let mut log = Vec::new();
        while let Some(event) = self.queue.pop_front() {
            if let Some(handlers) = self.handlers.get(event.event_type.as_str()) {
                for handler in handlers {
                    handler(&event, state, self);
                }
            }
            log.push(event);
        }
        log
    }
}
