use std::fmt;
use std::sync::{Arc, RwLock};

use weft_dispatch::Dispatcher;
use weft_event::{EventSchema, TypeSchema};
use weft_store::Store;

use crate::ExecutionError;

/// Best-effort diagnostic hook invoked for handler failures observed at the
/// mount level. Its return value is ignored; it is not a retry mechanism.
pub type ErrorHook = Arc<dyn Fn(&ExecutionError) + Send + Sync>;

/// Collaborators shared by a worker and its mounts.
#[derive(Clone)]
pub struct WorkerOptions {
  pub store: Arc<dyn Store>,
  pub dispatcher: Arc<dyn Dispatcher>,
  pub schema: Arc<dyn EventSchema>,
  pub on_error: Option<ErrorHook>,
}

impl WorkerOptions {
  /// Options with the default event schema and no error hook.
  pub fn new(store: Arc<dyn Store>, dispatcher: Arc<dyn Dispatcher>) -> Self {
    Self {
      store,
      dispatcher,
      schema: Arc::new(TypeSchema),
      on_error: None,
    }
  }

  pub fn with_schema(mut self, schema: Arc<dyn EventSchema>) -> Self {
    self.schema = schema;
    self
  }

  pub fn with_on_error(mut self, hook: impl Fn(&ExecutionError) + Send + Sync + 'static) -> Self {
    self.on_error = Some(Arc::new(hook));
    self
  }
}

impl fmt::Debug for WorkerOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WorkerOptions")
      .field("on_error", &self.on_error.is_some())
      .finish_non_exhaustive()
  }
}

/// Options behind a single swap point.
///
/// A worker replaces the inner `Arc` on reconfiguration; mounts snapshot it
/// once per invocation, so mid-flight invocations keep a consistent set.
pub type SharedOptions = Arc<RwLock<Arc<WorkerOptions>>>;

/// Wrap options for sharing between a worker and its mounts.
pub fn share_options(options: WorkerOptions) -> SharedOptions {
  Arc::new(RwLock::new(Arc::new(options)))
}

/// Read the current snapshot.
pub fn snapshot_options(options: &SharedOptions) -> Arc<WorkerOptions> {
  options
    .read()
    .unwrap_or_else(|e| e.into_inner())
    .clone()
}

/// Swap in a new option set.
pub fn swap_options(options: &SharedOptions, next: WorkerOptions) {
  *options.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
}
