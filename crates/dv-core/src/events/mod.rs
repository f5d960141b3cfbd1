//! Named-event publish/subscribe capability
//!
//! Every stateful object owns its own [`EventBus`] and declares the event
//! names it may emit. Emitting or subscribing to an undeclared name is an
//! error, which catches typos in event names at the first call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use thiserror::Error;

/// Wildcard event name. Always part of a bus vocabulary; listeners on it
/// receive every emitted event.
pub const WILDCARD: &str = "*";

/// Common event names shared between layers, sources and dataviews
pub mod names {
    pub const DATA_UPDATE: &str = "dataUpdate";
    pub const ERROR: &str = "error";
    pub const VIEWPORT_LOAD: &str = "viewportLoad";
    pub const FILTER_CHANGE: &str = "filterChange";
    pub const RENDER: &str = "render";
    pub const TILE_LOAD: &str = "tileLoad";
}

/// Errors raised by the event bus
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    #[error("Unknown event '{event}'. Available events: {}", available.join(", "))]
    UnknownEvent {
        event: String,
        available: Vec<String>,
    },
}

/// Payload carried by an event
#[derive(Clone, Default)]
pub enum EventPayload {
    #[default]
    Empty,
    Value(serde_json::Value),
    Error(Arc<dyn std::error::Error + Send + Sync>),
}

impl std::fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventPayload::Empty => write!(f, "Empty"),
            EventPayload::Value(value) => write!(f, "Value({})", value),
            EventPayload::Error(error) => write!(f, "Error({})", error),
        }
    }
}

/// An emitted event
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub payload: EventPayload,
}

/// Handler trait for event listeners
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event);
}

/// Identifier returned by [`EventBus::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listeners = AHashMap<String, Vec<(ListenerId, Arc<dyn EventHandler>)>>;

/// Event bus with a fixed vocabulary.
///
/// Cloning yields another handle to the same bus; two buses created with
/// [`EventBus::new`] never share listeners.
#[derive(Clone)]
pub struct EventBus {
    available: Arc<AHashSet<String>>,
    handlers: Arc<Mutex<Listeners>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus accepting the given event names
    pub fn new(events: &[&str]) -> Self {
        let mut available: AHashSet<String> = events.iter().map(|e| e.to_string()).collect();
        available.insert(WILDCARD.to_string());

        Self {
            available: Arc::new(available),
            handlers: Arc::new(Mutex::new(AHashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Event names accepted by this bus, sorted
    pub fn available_events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.available.iter().cloned().collect();
        events.sort();
        events
    }

    /// Whether `event` belongs to this bus vocabulary
    pub fn accepts(&self, event: &str) -> bool {
        self.available.contains(event)
    }

    fn check(&self, event: &str) -> Result<(), EventError> {
        if self.accepts(event) {
            Ok(())
        } else {
            Err(EventError::UnknownEvent {
                event: event.to_string(),
                available: self.available_events(),
            })
        }
    }

    /// Subscribe a handler to an event
    pub fn on(&self, event: &str, handler: Arc<dyn EventHandler>) -> Result<ListenerId, EventError> {
        self.check(event)?;

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));

        Ok(id)
    }

    /// Unsubscribe a handler. Returns whether a listener was removed.
    pub fn off(&self, event: &str, id: ListenerId) -> Result<bool, EventError> {
        self.check(event)?;

        let mut handlers = self.handlers.lock();
        let Some(listeners) = handlers.get_mut(event) else {
            return Ok(false);
        };
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);

        Ok(listeners.len() != before)
    }

    /// Emit an event without payload
    pub fn emit(&self, event: &str) -> Result<(), EventError> {
        self.emit_with(event, EventPayload::Empty)
    }

    /// Emit an event to its listeners and to wildcard listeners
    pub fn emit_with(&self, event: &str, payload: EventPayload) -> Result<(), EventError> {
        self.check(event)?;

        // Handlers run outside the lock so they may subscribe or emit themselves
        let targets: Vec<Arc<dyn EventHandler>> = {
            let handlers = self.handlers.lock();
            let direct = handlers.get(event).into_iter().flatten();
            let wildcard = if event == WILDCARD {
                None
            } else {
                handlers.get(WILDCARD)
            };
            direct
                .chain(wildcard.into_iter().flatten())
                .map(|(_, handler)| handler.clone())
                .collect()
        };

        let event = Event {
            name: event.to_string(),
            payload,
        };
        for handler in targets {
            handler.handle(&event);
        }

        Ok(())
    }

    /// Subscribe a handler for as long as the returned guard lives
    pub fn subscribe(&self, event: &str, handler: Arc<dyn EventHandler>) -> Result<Subscription, EventError> {
        let id = self.on(event, handler)?;
        Ok(Subscription {
            bus: self.clone(),
            event: event.to_string(),
            id,
        })
    }

    /// Number of listeners registered for `event`
    pub fn listener_count(&self, event: &str) -> usize {
        self.handlers.lock().get(event).map(Vec::len).unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("available", &self.available_events())
            .finish()
    }
}

/// Listener registration removed from its bus on drop
#[must_use = "the listener is removed as soon as the subscription is dropped"]
pub struct Subscription {
    bus: EventBus,
    event: String,
    id: ListenerId,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The event name was checked when subscribing
        let _ = self.bus.off(&self.event, self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle(&self, event: &Event) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(ClosureEventHandler { handler: f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn EventHandler>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        let handler = handler_from_fn(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    #[test]
    fn test_emit_reaches_listener() {
        let bus = EventBus::new(&[names::DATA_UPDATE]);
        let (count, handler) = counter();

        bus.on(names::DATA_UPDATE, handler).unwrap();
        bus.emit(names::DATA_UPDATE).unwrap();
        bus.emit(names::DATA_UPDATE).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_event_rejected() {
        let bus = EventBus::new(&[names::DATA_UPDATE]);
        let (_, handler) = counter();

        let err = bus.emit("dataUpdated").unwrap_err();
        assert!(matches!(err, EventError::UnknownEvent { ref event, .. } if event == "dataUpdated"));
        assert!(err.to_string().contains("dataUpdate"));
        assert!(bus.on("dataUpdated", handler).is_err());
    }

    #[test]
    fn test_wildcard_always_available() {
        let bus = EventBus::new(&[names::ERROR]);
        let (count, handler) = counter();

        bus.on(WILDCARD, handler).unwrap();
        bus.emit(names::ERROR).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.available_events(), vec!["*".to_string(), "error".to_string()]);
    }

    #[test]
    fn test_off_removes_listener() {
        let bus = EventBus::new(&[names::DATA_UPDATE]);
        let (count, handler) = counter();

        let id = bus.on(names::DATA_UPDATE, handler).unwrap();
        assert!(bus.off(names::DATA_UPDATE, id).unwrap());
        assert!(!bus.off(names::DATA_UPDATE, id).unwrap());
        bus.emit(names::DATA_UPDATE).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_instances_are_isolated() {
        let first = EventBus::new(&[names::DATA_UPDATE]);
        let second = EventBus::new(&[names::DATA_UPDATE]);
        let (count, handler) = counter();

        first.on(names::DATA_UPDATE, handler).unwrap();
        second.emit(names::DATA_UPDATE).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Clones share listeners
        first.clone().emit(names::DATA_UPDATE).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = EventBus::new(&[names::DATA_UPDATE]);
        let (count, handler) = counter();

        let subscription = bus.subscribe(names::DATA_UPDATE, handler).unwrap();
        bus.emit(names::DATA_UPDATE).unwrap();
        assert_eq!(bus.listener_count(names::DATA_UPDATE), 1);

        drop(subscription);
        bus.emit(names::DATA_UPDATE).unwrap();
        assert_eq!(bus.listener_count(names::DATA_UPDATE), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_emit_reentrantly() {
        let bus = EventBus::new(&[names::FILTER_CHANGE, names::DATA_UPDATE]);
        let (count, handler) = counter();
        bus.on(names::DATA_UPDATE, handler).unwrap();

        let inner = bus.clone();
        bus.on(
            names::FILTER_CHANGE,
            handler_from_fn(move |_| {
                let _ = inner.emit(names::DATA_UPDATE);
            }),
        )
        .unwrap();

        bus.emit(names::FILTER_CHANGE).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
