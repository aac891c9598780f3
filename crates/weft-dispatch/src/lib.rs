//! Weft Dispatch
//!
//! This crate provides the dispatcher trait and the in-process reference
//! implementations. A dispatcher transports opaque serialized envelopes to a
//! sink that will eventually process them; delivery semantics are each
//! dispatcher's own contract. The engine assumes at-least-once eventual
//! delivery; a fire-and-forget dispatcher forfeits durability on that
//! boundary, which is the caller's choice to make.

mod channel;
mod recording;

pub use channel::{channel, ChannelDispatcher, DeliveryPump};
pub use recording::RecordingDispatcher;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

/// Error type for dispatch operations.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
  /// The dispatch sink is gone.
  #[error("dispatch sink closed")]
  Closed,

  /// The underlying transport failed.
  #[error("transport failure: {message}")]
  Transport { message: String },
}

/// Transports a serialized envelope toward a processing sink.
#[async_trait]
pub trait Dispatcher: Send + Sync {
  /// Hand `payload` to the transport. `options` carries dispatcher-specific
  /// settings (a delay, a routing key, ...) and is opaque to the engine.
  async fn dispatch(&self, payload: Bytes, options: Option<Value>) -> Result<(), DispatchError>;
}
