//! Weft Event
//!
//! This crate contains the wire-level types shared by the worker, the
//! dispatcher, and the mount: the application [`Event`], the [`EventFilter`]
//! used to route events to functions, the pluggable [`EventSchema`] that
//! validates untyped payloads before any handler runs, and the [`Envelope`]
//! carrying an event (plus, on continuations, an [`ExecutionContext`])
//! between deliveries.

mod envelope;
mod event;
mod filter;
mod schema;

pub use envelope::{Envelope, ExecutionContext};
pub use event::Event;
pub use filter::EventFilter;
pub use schema::{EventSchema, InvalidEventError, TypeSchema};
