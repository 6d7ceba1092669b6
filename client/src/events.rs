//! Session events and the observers that react to them
//!
//! Observers are plain callbacks registered per event kind. They run on the
//! receive task in registration order, so they should hand heavy work off
//! rather than block. A panicking observer is caught and logged; the rest of
//! the observers and the receive task carry on.

use log::error;
use shared::StateMap;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The server assigned this client its participant id
    Connection { id: u32 },
    GameStart,
    /// A new authoritative state mapping arrived
    GameUpdate { state: StateMap },
    Chat { sender_id: u32, message: String },
    /// The connection is gone for good: reconnects were exhausted or the
    /// session was closed locally
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connection,
    GameStart,
    GameUpdate,
    Chat,
    Disconnect,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Connection { .. } => EventKind::Connection,
            SessionEvent::GameStart => EventKind::GameStart,
            SessionEvent::GameUpdate { .. } => EventKind::GameUpdate,
            SessionEvent::Chat { .. } => EventKind::Chat,
            SessionEvent::Disconnect => EventKind::Disconnect,
        }
    }
}

pub type Observer = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Handle returned by `register`, used to unregister later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
pub struct ObserverRegistry {
    observers: HashMap<EventKind, Vec<(ObserverId, Observer)>>,
    next_id: u64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: EventKind, observer: F) -> ObserverId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(observer)));
        id
    }

    pub fn unregister(&mut self, kind: EventKind, id: ObserverId) -> bool {
        match self.observers.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|(observer_id, _)| *observer_id != id);
                list.len() != before
            }
            None => false,
        }
    }

    /// Copies the observers for one kind so they can run without the
    /// registry borrowed. An observer may then register or unregister others.
    pub fn observers_for(&self, kind: EventKind) -> Vec<Observer> {
        self.observers
            .get(&kind)
            .map(|list| list.iter().map(|(_, o)| Arc::clone(o)).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.observers.get(&kind).map_or(0, Vec::len)
    }
}

/// Runs every observer with the event. Returns how many of them panicked.
pub fn dispatch(observers: &[Observer], event: &SessionEvent) -> usize {
    let mut panicked = 0;
    for observer in observers {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer(event))) {
            panicked += 1;
            error!(
                "{:?} observer panicked: {}",
                event.kind(),
                panic_message(payload.as_ref())
            );
        }
    }
    panicked
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
