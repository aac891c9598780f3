use std::fmt;
use std::sync::Arc;

use crate::Event;

/// Selects which functions see an event.
///
/// Filters are normalized at registration time: a single type string, a set
/// of type strings, or an arbitrary predicate all become an `EventFilter`.
#[derive(Clone)]
pub enum EventFilter {
  /// Match one event type exactly.
  Type(String),
  /// Match any of a set of event types.
  OneOf(Vec<String>),
  /// Arbitrary predicate over the event.
  Predicate(Arc<dyn Fn(&Event) -> bool + Send + Sync>),
}

impl EventFilter {
  /// Build a predicate filter.
  pub fn predicate(f: impl Fn(&Event) -> bool + Send + Sync + 'static) -> Self {
    Self::Predicate(Arc::new(f))
  }

  /// Whether this filter accepts `event`.
  pub fn matches(&self, event: &Event) -> bool {
    match self {
      Self::Type(t) => event.event_type == *t,
      Self::OneOf(types) => types.iter().any(|t| event.event_type == *t),
      Self::Predicate(f) => f(event),
    }
  }
}

impl fmt::Debug for EventFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Type(t) => f.debug_tuple("Type").field(t).finish(),
      Self::OneOf(types) => f.debug_tuple("OneOf").field(types).finish(),
      Self::Predicate(_) => f.write_str("Predicate(..)"),
    }
  }
}

impl From<&str> for EventFilter {
  fn from(event_type: &str) -> Self {
    Self::Type(event_type.to_string())
  }
}

impl From<String> for EventFilter {
  fn from(event_type: String) -> Self {
    Self::Type(event_type)
  }
}

impl From<Vec<String>> for EventFilter {
  fn from(types: Vec<String>) -> Self {
    Self::OneOf(types)
  }
}

impl From<Vec<&str>> for EventFilter {
  fn from(types: Vec<&str>) -> Self {
    Self::OneOf(types.into_iter().map(str::to_string).collect())
  }
}

impl<const N: usize> From<[&str; N]> for EventFilter {
  fn from(types: [&str; N]) -> Self {
    Self::OneOf(types.into_iter().map(str::to_string).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn matches_single_type() {
    let filter = EventFilter::from("foo");
    assert!(filter.matches(&Event::new("foo")));
    assert!(!filter.matches(&Event::new("bar")));
  }

  #[test]
  fn matches_type_set() {
    let filter = EventFilter::from(["foo", "bar"]);
    assert!(filter.matches(&Event::new("foo")));
    assert!(filter.matches(&Event::new("bar")));
    assert!(!filter.matches(&Event::new("baz")));
  }

  #[test]
  fn matches_predicate() {
    let filter = EventFilter::predicate(|e| e.event_type.starts_with("order/"));
    assert!(filter.matches(&Event::new("order/created")));
    assert!(!filter.matches(&Event::new("user/created")));
  }
}
