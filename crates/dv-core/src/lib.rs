//! Core capabilities shared by the DataView crates
//!
//! This crate provides the event bus every stateful object embeds, the
//! debounce timer, viewport geometry and credential configuration.

pub mod config;
pub mod debounce;
pub mod events;
pub mod viewport;

// Re-export commonly used types
pub use config::{Credentials, DataViewSettings};
pub use debounce::Debouncer;
pub use events::{Event, EventBus, EventError, EventHandler, EventPayload, ListenerId, Subscription};
pub use viewport::{BBox, Viewport};
