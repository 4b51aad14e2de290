//! Event system
//!
//! Key principles:
//! - Key-value arguments (no order dependency)
//! - Handler returns bool (true = consumed, stops forwarding)
//! - Registration system (only notify interested handlers)
//! - Producers anywhere (entities, importers, worker threads) post through a
//!   cloneable [`EventSender`]; the owner drains and dispatches once per tick

use std::collections::HashMap;

use crossbeam::channel::{unbounded, Receiver, Sender};

/// Event type identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Components were added/removed or a subtree was deserialized
    SceneResolve,
    /// Simulation must pause (e.g. around a slow synchronous import)
    WorldStop,
    /// Simulation may resume
    WorldStart,
    /// A scene file finished loading
    WorldLoaded,
    /// A frame is about to start
    FrameStart,
    /// A frame has ended
    FrameEnd,
}

/// Variant for type-safe event arguments
#[derive(Debug, Clone, PartialEq)]
pub enum EventArg {
    /// Entity identifier
    EntityId(u64),
    /// File path
    Path(String),
    /// Frame delta time in seconds
    DeltaTime(f32),
}

/// Event with type ID and key-value arguments
#[derive(Debug, Clone)]
pub struct Event {
    /// Type of event
    pub event_type: EventType,
    args: HashMap<&'static str, EventArg>,
}

impl Event {
    /// Create a new event with the given type
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            args: HashMap::new(),
        }
    }

    /// Add an argument to the event (builder pattern)
    #[must_use]
    pub fn with_arg(mut self, key: &'static str, value: EventArg) -> Self {
        self.args.insert(key, value);
        self
    }

    /// Get an argument by key
    pub fn get_arg(&self, key: &str) -> Option<&EventArg> {
        self.args.get(key)
    }

    /// Get the `entity` argument if present
    pub fn get_entity(&self) -> Option<u64> {
        match self.get_arg("entity") {
            Some(EventArg::EntityId(id)) => Some(*id),
            _ => None,
        }
    }

    /// Get the `path` argument if present
    pub fn get_path(&self) -> Option<&str> {
        match self.get_arg("path") {
            Some(EventArg::Path(path)) => Some(path),
            _ => None,
        }
    }
}

/// Event handler trait
///
/// Returns true if the event was consumed (stops forwarding).
pub trait EventHandler: Send {
    /// Handle an event, return true if consumed
    fn on_event(&mut self, event: &Event) -> bool;
}

/// Cloneable handle used to post events from anywhere
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: Sender<Event>,
}

impl EventSender {
    /// Post an event for the next dispatch
    pub fn send(&self, event: Event) {
        if self.sender.send(event).is_err() {
            log::trace!("Event system gone, event dropped");
        }
    }

    /// Post an argument-less event
    pub fn fire(&self, event_type: EventType) {
        self.send(Event::new(event_type));
    }

    /// A sender whose events go nowhere, for objects living outside an engine
    pub fn detached() -> Self {
        let (sender, _) = unbounded();
        Self { sender }
    }
}

/// Event system with registration and queuing
pub struct EventSystem {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
    handlers: HashMap<EventType, Vec<Box<dyn EventHandler>>>,
}

impl EventSystem {
    /// Create a new empty event system
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            handlers: HashMap::new(),
        }
    }

    /// Handle for posting events into this system
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Register a handler for a specific event type
    pub fn register_handler(&mut self, event_type: EventType, handler: Box<dyn EventHandler>) {
        self.handlers.entry(event_type).or_default().push(handler);
    }

    /// Number of events waiting for dispatch
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Dispatch all pending events in posting order
    ///
    /// Returns the dispatched events so the owner can react to them too.
    pub fn dispatch(&mut self) -> Vec<Event> {
        let events: Vec<Event> = self.receiver.try_iter().collect();
        for event in &events {
            self.dispatch_event(event);
        }
        events
    }

    /// Dispatch single event to registered handlers
    /// Stops on first handler that returns true (consumed)
    fn dispatch_event(&mut self, event: &Event) {
        if let Some(handlers) = self.handlers.get_mut(&event.event_type) {
            for handler in handlers.iter_mut() {
                if handler.on_event(event) {
                    break;
                }
            }
        }
    }

    /// Drop all queued events
    pub fn clear(&mut self) {
        self.receiver.try_iter().for_each(drop);
    }
}

impl Default for EventSystem {
    fn default() -> Self {
        Self::new()
    }
}
