//! Simulation event listeners
//!
//! Listeners are keyed by `type.name`. Registering a listener under a key that
//! is already taken replaces it; registering `None` removes it. The name part
//! is optional, so `"tick"` and `"tick.render"` are two separate listeners.

use std::str::FromStr;

use crate::backend::BackendKind;
use crate::error::{Result, SimulationError};

/// The kinds of event a simulation fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// After every step of the stepping loop
    Tick,
    /// Once, when alpha first drops below alpha_min
    End,
    /// Whenever the active backend is selected or changes
    Mode,
}

impl FromStr for EventType {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tick" => Ok(EventType::Tick),
            "end" => Ok(EventType::End),
            "mode" => Ok(EventType::Mode),
            other => Err(SimulationError::UnknownEvent(other.to_string())),
        }
    }
}

/// Payload handed to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationEvent {
    Tick { alpha: f64 },
    End { alpha: f64 },
    ModeChange { mode: BackendKind, reason: String },
}

impl SimulationEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            SimulationEvent::Tick { .. } => EventType::Tick,
            SimulationEvent::End { .. } => EventType::End,
            SimulationEvent::ModeChange { .. } => EventType::Mode,
        }
    }
}

/// Boxed event listener
pub type Listener = Box<dyn FnMut(&SimulationEvent) + Send>;

struct Entry {
    event: EventType,
    name: String,
    listener: Listener,
}

/// Registered listeners, fired in registration order
#[derive(Default)]
pub struct Dispatch {
    entries: Vec<Entry>,
}

impl Dispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register, replace or (with `None`) remove the listener for `typename`
    pub fn on(&mut self, typename: &str, listener: Option<Listener>) -> Result<()> {
        let (event, name) = match typename.split_once('.') {
            Some((event, name)) => (event.parse::<EventType>()?, name),
            None => (typename.parse::<EventType>()?, ""),
        };

        let existing = self
            .entries
            .iter()
            .position(|e| e.event == event && e.name == name);
        match (existing, listener) {
            (Some(i), Some(listener)) => self.entries[i].listener = listener,
            (Some(i), None) => {
                self.entries.remove(i);
            }
            (None, Some(listener)) => self.entries.push(Entry {
                event,
                name: name.to_string(),
                listener,
            }),
            (None, None) => {}
        }
        Ok(())
    }

    pub fn emit(&mut self, event: &SimulationEvent) {
        let kind = event.event_type();
        for entry in self.entries.iter_mut().filter(|e| e.event == kind) {
            (entry.listener)(event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.event, &e.name)))
            .finish()
    }
}
