use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use weft_dispatch::{DispatchError, Dispatcher};
use weft_engine::{
  share_options, snapshot_options, swap_options, ErrorHook, ExecutionError, Function, Mount,
  MountError, MountOptions, SharedOptions, Step, WorkerOptions,
};
use weft_event::{Envelope, Event, EventFilter, EventSchema};
use weft_store::Store;

/// Errors surfaced by [`Worker::publish`].
#[derive(Debug, Error)]
pub enum PublishError {
  #[error("event serialization failed: {0}")]
  Codec(#[from] serde_json::Error),

  #[error(transparent)]
  Dispatch(#[from] DispatchError),
}

/// Partial options for [`Worker::configure`]; unset fields keep their
/// current value.
#[derive(Default)]
pub struct WorkerOptionsPatch {
  pub store: Option<Arc<dyn Store>>,
  pub dispatcher: Option<Arc<dyn Dispatcher>>,
  pub schema: Option<Arc<dyn EventSchema>>,
  pub on_error: Option<ErrorHook>,
}

impl WorkerOptionsPatch {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn store(mut self, store: Arc<dyn Store>) -> Self {
    self.store = Some(store);
    self
  }

  pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
    self.dispatcher = Some(dispatcher);
    self
  }

  pub fn schema(mut self, schema: Arc<dyn EventSchema>) -> Self {
    self.schema = Some(schema);
    self
  }

  pub fn on_error(mut self, hook: impl Fn(&ExecutionError) + Send + Sync + 'static) -> Self {
    self.on_error = Some(Arc::new(hook));
    self
  }
}

/// The worker facade: owns the options and hands out functions and mounts.
pub struct Worker {
  options: SharedOptions,
}

impl Worker {
  pub fn new(options: WorkerOptions) -> Self {
    Self {
      options: share_options(options),
    }
  }

  /// Current options snapshot.
  pub fn options(&self) -> Arc<WorkerOptions> {
    snapshot_options(&self.options)
  }

  /// Merge-replace options. Mounts created earlier pick the new set up on
  /// their next invocation; invocations already in flight keep the snapshot
  /// they started with.
  pub fn configure(&self, patch: WorkerOptionsPatch) {
    let current = self.options();
    let next = WorkerOptions {
      store: patch.store.unwrap_or_else(|| Arc::clone(&current.store)),
      dispatcher: patch
        .dispatcher
        .unwrap_or_else(|| Arc::clone(&current.dispatcher)),
      schema: patch.schema.unwrap_or_else(|| Arc::clone(&current.schema)),
      on_error: patch.on_error.or_else(|| current.on_error.clone()),
    };
    swap_options(&self.options, next);
  }

  /// Serialize the event into a top-level envelope and dispatch it.
  pub async fn publish(
    &self,
    event: &Event,
    dispatch_options: Option<Value>,
  ) -> Result<(), PublishError> {
    let envelope = Envelope::top_level(serde_json::to_value(event)?);
    let payload = Bytes::from(serde_json::to_vec(&envelope)?);

    self
      .options()
      .dispatcher
      .dispatch(payload, dispatch_options)
      .await?;

    metrics::counter!("weft_events_published_total").increment(1);
    info!(event_type = %event.event_type, "event_published");
    Ok(())
  }

  /// Register a workflow function.
  pub fn create_function<F, Fut>(
    &self,
    id: impl Into<String>,
    filter: impl Into<EventFilter>,
    handler: F,
  ) -> Function
  where
    F: Fn(Event, Step) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ExecutionError>> + Send + 'static,
  {
    Function::new(id, filter, handler)
  }

  /// Build a mount over this worker's options.
  pub fn mount(&self, options: MountOptions) -> Result<Mount, MountError> {
    Mount::new(Arc::clone(&self.options), options)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use weft_dispatch::RecordingDispatcher;
  use weft_store::MemoryStore;

  fn test_worker(dispatcher: Arc<RecordingDispatcher>) -> Worker {
    Worker::new(WorkerOptions::new(Arc::new(MemoryStore::new()), dispatcher))
  }

  #[tokio::test]
  async fn publish_sends_a_top_level_envelope() {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let worker = test_worker(Arc::clone(&dispatcher));

    let event = Event::new("order/created").with("order_id", 7);
    worker.publish(&event, None).await.unwrap();

    let payloads = dispatcher.take();
    assert_eq!(payloads.len(), 1);
    let raw: Value = serde_json::from_slice(&payloads[0]).unwrap();
    assert_eq!(raw["event"]["type"], "order/created");
    assert_eq!(raw["event"]["order_id"], 7);
    assert!(raw.get("context").is_none());
  }

  #[tokio::test]
  async fn configure_swaps_the_dispatcher_for_later_publishes() {
    let first = Arc::new(RecordingDispatcher::new());
    let second = Arc::new(RecordingDispatcher::new());
    let worker = test_worker(Arc::clone(&first));

    worker
      .configure(WorkerOptionsPatch::new().dispatcher(Arc::clone(&second) as Arc<dyn Dispatcher>));
    worker.publish(&Event::new("foo"), None).await.unwrap();

    assert!(first.is_empty());
    assert_eq!(second.len(), 1);
  }

  #[tokio::test]
  async fn mounts_observe_reconfigured_options() {
    let first = Arc::new(RecordingDispatcher::new());
    let second = Arc::new(RecordingDispatcher::new());
    let worker = test_worker(Arc::clone(&first));

    let function = worker.create_function("func1", "foo", |_event, _step| async { Ok(()) });
    let mount = worker.mount(MountOptions::new(vec![function])).unwrap();

    worker
      .configure(WorkerOptionsPatch::new().dispatcher(Arc::clone(&second) as Arc<dyn Dispatcher>));
    mount.execute(Event::new("foo"), None).await.unwrap();

    // the function task's continuation went through the swapped dispatcher
    assert!(first.is_empty());
    assert_eq!(second.len(), 1);
  }
}
