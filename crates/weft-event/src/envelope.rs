use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The wire envelope.
///
/// A top-level publish carries only the event; continuations additionally
/// carry the [`ExecutionContext`] naming the execution and the task the
/// delivery is responsible for advancing. The event stays untyped here: it
/// is validated by the mount's schema before any handler runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
  pub event: Value,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub context: Option<ExecutionContext>,
}

impl Envelope {
  /// Envelope for a top-level publish.
  pub fn top_level(event: Value) -> Self {
    Self {
      event,
      context: None,
    }
  }

  /// Envelope for a continuation.
  pub fn continuation(event: Value, context: ExecutionContext) -> Self {
    Self {
      event,
      context: Some(context),
    }
  }
}

/// The per-invocation tuple carried across dispatches.
///
/// `task_id`, when present, is the colon-separated path of the leaf task
/// this delivery advances. When absent the delivery is a top-level re-entry:
/// the handler continues from wherever it now stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
  pub execution_id: String,

  /// Milliseconds since the epoch, fixed at first publish and carried
  /// unchanged on continuations.
  pub timestamp: i64,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_id: Option<String>,
}

impl ExecutionContext {
  pub fn new(execution_id: impl Into<String>, timestamp: i64) -> Self {
    Self {
      execution_id: execution_id.into(),
      timestamp,
      task_id: None,
    }
  }

  pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
    self.task_id = Some(task_id.into());
    self
  }
}
