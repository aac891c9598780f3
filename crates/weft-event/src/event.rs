use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An application event.
///
/// Every event carries a string `type` used for routing; any further
/// attributes ride along untyped and are preserved across serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  /// The event type, e.g. `"order/created"`.
  #[serde(rename = "type")]
  pub event_type: String,

  /// Additional attributes of the event.
  #[serde(flatten)]
  pub data: Map<String, Value>,
}

impl Event {
  /// Create an event with the given type and no further attributes.
  pub fn new(event_type: impl Into<String>) -> Self {
    Self {
      event_type: event_type.into(),
      data: Map::new(),
    }
  }

  /// Attach an attribute.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.data.insert(key.into(), value.into());
    self
  }

  /// Look up an attribute by name.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.data.get(key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_extra_attributes() {
    let event = Event::new("order/created").with("order_id", 42);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "order/created");
    assert_eq!(json["order_id"], 42);

    let back: Event = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
  }

  #[test]
  fn get_reads_attributes() {
    let event = Event::new("foo").with("k", "v");
    assert_eq!(event.get("k"), Some(&Value::String("v".to_string())));
    assert_eq!(event.get("missing"), None);
  }
}
