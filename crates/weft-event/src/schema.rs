use serde_json::Value;
use thiserror::Error;

use crate::Event;

/// The payload's event did not match the schema.
///
/// Non-retryable: the adapter hosting the mount should signal a permanent
/// failure to the transport.
#[derive(Debug, Error)]
#[error("invalid event: {}", issues.join("; "))]
pub struct InvalidEventError {
  /// Human-readable validation issues.
  pub issues: Vec<String>,
}

impl InvalidEventError {
  pub fn new(issues: Vec<String>) -> Self {
    Self { issues }
  }
}

/// Validates an untyped payload into a typed [`Event`].
///
/// A schema runs before any handler sees the event. Custom schemas can
/// enforce application-level shapes; [`TypeSchema`] is the default and
/// requires only the mandatory `type` attribute.
pub trait EventSchema: Send + Sync {
  fn parse(&self, raw: &Value) -> Result<Event, InvalidEventError>;
}

/// Default schema: an object with a string `type` attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeSchema;

impl EventSchema for TypeSchema {
  fn parse(&self, raw: &Value) -> Result<Event, InvalidEventError> {
    let object = raw
      .as_object()
      .ok_or_else(|| InvalidEventError::new(vec!["event must be an object".to_string()]))?;

    match object.get("type") {
      Some(Value::String(_)) => {}
      Some(_) => {
        return Err(InvalidEventError::new(vec![
          "event `type` must be a string".to_string(),
        ]));
      }
      None => {
        return Err(InvalidEventError::new(vec![
          "event is missing the `type` attribute".to_string(),
        ]));
      }
    }

    serde_json::from_value(raw.clone())
      .map_err(|e| InvalidEventError::new(vec![format!("event does not deserialize: {e}")]))
  }
}
