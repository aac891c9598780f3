//! Suspension signalling between the step engine and the mount's supervisor.
//!
//! A suspension is control flow, not an error. It travels on a side channel:
//! the suspending step records its reason on the invocation's gate, wakes
//! the supervisor, and then never resolves. The supervisor races the handler
//! future against the gate and drops the handler at its suspension point, so
//! application code (including a `match` wrapped around a step call) can
//! never observe or swallow a suspension.

use std::sync::Mutex;

use tokio::sync::Notify;

/// Why a handler invocation was suspended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptReason {
  /// The task committed its value and its parent's delivery was enqueued.
  TaskCompleted { task_path: String },
  /// The task was marked in progress and its own delivery was enqueued.
  TaskTriggered { task_path: String },
  /// Another delivery owns the task; this invocation yields.
  TaskInProgress { task_path: String },
}

impl InterruptReason {
  pub fn task_path(&self) -> &str {
    match self {
      Self::TaskCompleted { task_path }
      | Self::TaskTriggered { task_path }
      | Self::TaskInProgress { task_path } => task_path,
    }
  }
}

/// Invocation-scoped gate the engine fires to suspend a handler.
#[derive(Debug, Default)]
pub(crate) struct InterruptGate {
  reason: Mutex<Option<InterruptReason>>,
  notify: Notify,
}

impl InterruptGate {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Record the reason and wake the supervisor. The calling step future must
  /// never resolve afterwards.
  pub(crate) fn fire(&self, reason: InterruptReason) {
    *self.reason.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason);
    self.notify.notify_one();
  }

  /// Resolve once the gate has fired.
  pub(crate) async fn fired(&self) -> InterruptReason {
    loop {
      self.notify.notified().await;
      let taken = self.reason.lock().unwrap_or_else(|e| e.into_inner()).take();
      if let Some(reason) = taken {
        return reason;
      }
    }
  }
}
