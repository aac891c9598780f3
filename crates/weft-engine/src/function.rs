use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use weft_event::{Event, EventFilter};

use crate::{ExecutionError, Step};

type HandlerFn = dyn Fn(Event, Step) -> BoxFuture<'static, Result<(), ExecutionError>> + Send + Sync;

/// A registered workflow function: an id unique within its mount, an event
/// filter, and the handler driven by the step engine.
///
/// Handlers must route all side-effecting work through [`Step::run`]; the
/// code between steps replays on every delivery.
#[derive(Clone)]
pub struct Function {
  id: String,
  filter: EventFilter,
  handler: Arc<HandlerFn>,
}

impl Function {
  pub fn new<F, Fut>(id: impl Into<String>, filter: impl Into<EventFilter>, handler: F) -> Self
  where
    F: Fn(Event, Step) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ExecutionError>> + Send + 'static,
  {
    Self {
      id: id.into(),
      filter: filter.into(),
      handler: Arc::new(move |event, step| Box::pin(handler(event, step))),
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  /// Whether this function's filter accepts `event`.
  pub fn accepts(&self, event: &Event) -> bool {
    self.filter.matches(event)
  }

  pub(crate) fn invoke(
    &self,
    event: Event,
    step: Step,
  ) -> BoxFuture<'static, Result<(), ExecutionError>> {
    (self.handler)(event, step)
  }
}

impl fmt::Debug for Function {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Function")
      .field("id", &self.id)
      .field("filter", &self.filter)
      .finish_non_exhaustive()
  }
}

/// All functions accepting `event`, preserving registration order.
pub fn filter_for_event<'a>(functions: &'a [Function], event: &Event) -> Vec<&'a Function> {
  functions.iter().filter(|f| f.accepts(event)).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn noop(id: &str, filter: impl Into<EventFilter>) -> Function {
    Function::new(id, filter, |_event, _step| async { Ok(()) })
  }

  #[test]
  fn routing_preserves_registration_order() {
    let functions = vec![
      noop("a", "foo"),
      noop("b", "bar"),
      noop("c", ["foo", "bar"]),
    ];

    let matched = filter_for_event(&functions, &Event::new("foo"));
    let ids: Vec<&str> = matched.iter().map(|f| f.id()).collect();
    assert_eq!(ids, vec!["a", "c"]);
  }

  #[test]
  fn predicate_filters_route() {
    let functions = vec![noop("a", EventFilter::predicate(|e| e.get("vip").is_some()))];

    assert_eq!(filter_for_event(&functions, &Event::new("x")).len(), 0);
    let vip = Event::new("x").with("vip", true);
    assert_eq!(filter_for_event(&functions, &vip).len(), 1);
  }
}
