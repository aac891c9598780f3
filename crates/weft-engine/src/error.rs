use thiserror::Error;
use weft_dispatch::DispatchError;
use weft_event::InvalidEventError;
use weft_store::StoreError;

/// Errors that can surface inside a handler invocation.
///
/// Suspensions are not errors and never appear here: when the engine
/// suspends a handler it signals the mount's supervisor directly, so handler
/// code matching on a `Result` from a step can only ever observe the
/// variants below.
#[derive(Debug, Error)]
pub enum ExecutionError {
  /// A store operation failed; the invocation fails and the transport's
  /// redelivery resumes the execution.
  #[error("store operation failed: {0}")]
  Store(#[from] StoreError),

  /// Publishing a continuation failed.
  #[error("continuation dispatch failed: {0}")]
  Dispatch(#[from] DispatchError),

  /// A step value failed to encode or decode.
  #[error("step value codec failure: {0}")]
  Codec(#[from] serde_json::Error),

  /// An application error raised inside a step callback.
  #[error("handler error: {0}")]
  Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ExecutionError {
  /// Wrap an application error raised inside a step callback.
  pub fn handler(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
    Self::Handler(error.into())
  }
}

/// Errors surfaced by a mount's entry points.
#[derive(Debug, Error)]
pub enum MountError {
  /// Two functions registered with the same id.
  #[error("duplicate function id: {0}")]
  DuplicateFunctionId(String),

  /// The inbound payload is not a valid envelope.
  #[error("malformed envelope: {0}")]
  Envelope(#[source] serde_json::Error),

  /// The inbound event did not match the schema.
  #[error(transparent)]
  InvalidEvent(#[from] InvalidEventError),

  /// A store operation failed outside any handler.
  #[error("store operation failed: {0}")]
  Store(#[from] StoreError),

  /// One or more functions failed while processing the event.
  #[error("{} function invocation(s) failed", errors.len())]
  HandlerFailures { errors: Vec<ExecutionError> },

  /// A supervised function task aborted.
  #[error("supervised function task aborted: {0}")]
  Join(#[from] tokio::task::JoinError),
}
