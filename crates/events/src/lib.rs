//! Domain event contract shared by every event-sourced aggregate.

pub mod event;

pub use event::Event;
