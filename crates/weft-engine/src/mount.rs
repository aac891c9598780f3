//! The mount: the per-function-set entry point.
//!
//! A mount wires a set of functions to the worker's collaborators and runs
//! the dispatch loop: validate the inbound payload, select the functions the
//! event routes to, and drive each of them one step forward through the
//! engine, publishing or queueing continuations as the execution mode
//! dictates.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use futures::future;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use weft_event::{Envelope, Event, ExecutionContext};

use crate::ids::{generate_execution_id, now_millis};
use crate::interrupt::InterruptGate;
use crate::options::{snapshot_options, SharedOptions, WorkerOptions};
use crate::step::{
  drive_function, ContinuationSink, FunctionOutcome, LocalMarkers, ResultCache, StepRuntime,
};
use crate::{ExecutionError, Function, MountError};

/// How step continuations travel between invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
  /// Every continuation crosses the dispatcher; each step is an independent
  /// unit of work (default).
  #[default]
  Isolated,
  /// Continuations drain on an in-process queue until the execution is done
  /// or a handler fails; the dispatcher is never used.
  RunUntilError,
}

/// Options for building a [`Mount`].
#[derive(Debug)]
pub struct MountOptions {
  pub functions: Vec<Function>,
  pub execution_mode: ExecutionMode,
}

impl MountOptions {
  pub fn new(functions: Vec<Function>) -> Self {
    Self {
      functions,
      execution_mode: ExecutionMode::default(),
    }
  }

  pub fn with_execution_mode(mut self, execution_mode: ExecutionMode) -> Self {
    self.execution_mode = execution_mode;
    self
  }
}

/// The per-function-set entry point exposing [`execute`](Mount::execute) and
/// [`process`](Mount::process).
#[derive(Debug)]
pub struct Mount {
  functions: Vec<Function>,
  mode: ExecutionMode,
  options: SharedOptions,
}

impl Mount {
  /// Build a mount. Fails if two functions share an id.
  pub fn new(options: SharedOptions, mount_options: MountOptions) -> Result<Self, MountError> {
    let mut seen = HashSet::new();
    for function in &mount_options.functions {
      if !seen.insert(function.id().to_string()) {
        return Err(MountError::DuplicateFunctionId(function.id().to_string()));
      }
    }
    Ok(Self {
      functions: mount_options.functions,
      mode: mount_options.execution_mode,
      options,
    })
  }

  /// Parse a raw envelope payload, validate the event, and advance the
  /// execution it belongs to.
  #[instrument(name = "mount_process", skip(self, payload))]
  pub async fn process(&self, payload: &[u8]) -> Result<(), MountError> {
    let envelope: Envelope = serde_json::from_slice(payload).map_err(MountError::Envelope)?;
    let options = snapshot_options(&self.options);
    let event = options.schema.parse(&envelope.event)?;
    self.execute_with(options, event, envelope.context).await
  }

  /// Advance an execution by one inbound context.
  ///
  /// Without a context (or without a task id) this is a top-level entry: a
  /// fresh execution is created as needed and the handler continues from
  /// wherever it now stands.
  pub async fn execute(
    &self,
    event: Event,
    context: Option<ExecutionContext>,
  ) -> Result<(), MountError> {
    self
      .execute_with(snapshot_options(&self.options), event, context)
      .await
  }

  async fn execute_with(
    &self,
    options: Arc<WorkerOptions>,
    event: Event,
    inbound: Option<ExecutionContext>,
  ) -> Result<(), MountError> {
    let matched = crate::filter_for_event(&self.functions, &event);
    if matched.is_empty() {
      debug!(event_type = %event.event_type, "no matching functions");
      return Ok(());
    }
    let matched: Vec<Function> = matched.into_iter().cloned().collect();

    let context = inbound
      .unwrap_or_else(|| ExecutionContext::new(generate_execution_id(), now_millis()));

    if context.task_id.is_none() {
      options.store.begin_execution(&context.execution_id).await?;
      info!(
        execution_id = %context.execution_id,
        event_type = %event.event_type,
        "execution_started"
      );
    } else if !options
      .store
      .is_execution_in_progress(&context.execution_id)
      .await?
    {
      // a delayed redelivery after disposal; drop it
      warn!(
        execution_id = %context.execution_id,
        task_id = ?context.task_id,
        "delivery_for_unknown_execution"
      );
      return Ok(());
    }

    let cache = ResultCache::default();
    if let Some(results) = options
      .store
      .get_execution_task_results(&context.execution_id)
      .await?
    {
      cache.seed(results);
    }

    let markers = match self.mode {
      ExecutionMode::Isolated => None,
      ExecutionMode::RunUntilError => Some(LocalMarkers::default()),
    };
    let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
    let sink = match self.mode {
      ExecutionMode::Isolated => ContinuationSink::Dispatcher(Arc::clone(&options.dispatcher)),
      ExecutionMode::RunUntilError => ContinuationSink::Queue(queue_tx),
    };

    let mut queue = VecDeque::from([context]);
    let mut errors: Vec<ExecutionError> = Vec::new();

    while let Some(current) = queue.pop_front() {
      let mut handles = Vec::with_capacity(matched.len());
      for function in &matched {
        let rt = Arc::new(StepRuntime {
          store: Arc::clone(&options.store),
          event: event.clone(),
          execution_id: current.execution_id.clone(),
          timestamp: current.timestamp,
          inbound_task: current.task_id.clone(),
          cache: cache.clone(),
          markers: markers.clone(),
          sink: sink.clone(),
          gate: InterruptGate::new(),
        });
        let function = function.clone();
        handles.push(tokio::spawn(drive_function(function, rt)));
      }

      let mut interrupted = false;
      for joined in future::join_all(handles).await {
        match joined? {
          Ok(FunctionOutcome::Completed) => {}
          Ok(FunctionOutcome::Interrupted(reason)) => {
            debug!(
              execution_id = %current.execution_id,
              task_path = %reason.task_path(),
              "function_suspended"
            );
            interrupted = true;
          }
          Err(err) => {
            if let Some(hook) = &options.on_error {
              hook(&err);
            }
            error!(
              execution_id = %current.execution_id,
              error = %err,
              "function_failed"
            );
            errors.push(err);
          }
        }
      }

      if !errors.is_empty() {
        break;
      }
      if !interrupted {
        options
          .store
          .dispose_execution(&current.execution_id)
          .await?;
        info!(execution_id = %current.execution_id, "execution_disposed");
        break;
      }
      while let Ok(next) = queue_rx.try_recv() {
        queue.push_back(next);
      }
    }

    if errors.is_empty() {
      Ok(())
    } else {
      Err(MountError::HandlerFailures { errors })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::options::share_options;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use weft_dispatch::RecordingDispatcher;
  use weft_store::{MemoryStore, Store};

  fn test_options(
    store: Arc<MemoryStore>,
    dispatcher: Arc<RecordingDispatcher>,
  ) -> SharedOptions {
    share_options(WorkerOptions::new(store, dispatcher))
  }

  fn recorded_task_ids(dispatcher: &RecordingDispatcher) -> Vec<Option<String>> {
    dispatcher
      .payloads()
      .iter()
      .map(|payload| {
        let envelope: Envelope = serde_json::from_slice(payload).unwrap();
        envelope.context.unwrap().task_id
      })
      .collect()
  }

  #[test]
  fn duplicate_function_ids_fail_construction() {
    let options = test_options(
      Arc::new(MemoryStore::new()),
      Arc::new(RecordingDispatcher::new()),
    );
    let functions = vec![
      Function::new("f", "foo", |_e, _s| async { Ok(()) }),
      Function::new("f", "bar", |_e, _s| async { Ok(()) }),
    ];

    let err = Mount::new(options, MountOptions::new(functions)).unwrap_err();
    assert!(matches!(err, MountError::DuplicateFunctionId(id) if id == "f"));
  }

  #[tokio::test]
  async fn fresh_execution_begins_the_function_task_without_running_the_handler() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let handler_calls = Arc::clone(&calls);
    let function = Function::new("func1", "foo", move |_event, _step| {
      let calls = Arc::clone(&handler_calls);
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
      }
    });

    let mount = Mount::new(
      test_options(Arc::clone(&store), Arc::clone(&dispatcher)),
      MountOptions::new(vec![function]),
    )
    .unwrap();

    mount
      .execute(
        Event::new("foo"),
        Some(ExecutionContext::new("e1", 1)),
      )
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(store.is_execution_in_progress("e1").await.unwrap());
    assert!(store
      .is_execution_task_in_progress("e1", "func1")
      .await
      .unwrap());
    assert_eq!(
      recorded_task_ids(&dispatcher),
      vec![Some("func1".to_string())]
    );
  }

  #[tokio::test]
  async fn delivery_for_a_disposed_execution_is_dropped() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let handler_calls = Arc::clone(&calls);
    let function = Function::new("func1", "foo", move |_event, _step| {
      let calls = Arc::clone(&handler_calls);
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
      }
    });

    let mount = Mount::new(
      test_options(Arc::clone(&store), Arc::clone(&dispatcher)),
      MountOptions::new(vec![function]),
    )
    .unwrap();

    mount
      .execute(
        Event::new("foo"),
        Some(ExecutionContext::new("gone", 1).with_task("func1")),
      )
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(dispatcher.is_empty());
  }

  #[tokio::test]
  async fn events_with_no_matching_function_are_ignored() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let function = Function::new("func1", "foo", |_e, _s| async { Ok(()) });

    let mount = Mount::new(
      test_options(Arc::clone(&store), Arc::clone(&dispatcher)),
      MountOptions::new(vec![function]),
    )
    .unwrap();

    mount.execute(Event::new("other"), None).await.unwrap();
    assert!(dispatcher.is_empty());
  }

  #[tokio::test]
  async fn an_in_progress_task_owned_elsewhere_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());

    // another delivery already owns func1:step1
    store.begin_execution("e1").await.unwrap();
    store.begin_execution_task("e1", "func1").await.unwrap();
    store
      .begin_execution_task("e1", "func1:step1")
      .await
      .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let step_calls = Arc::clone(&calls);
    let function = Function::new("func1", "foo", move |_event, step| {
      let calls = Arc::clone(&step_calls);
      async move {
        let _: String = step
          .run("step1", |_| {
            let calls = Arc::clone(&calls);
            async move {
              calls.fetch_add(1, Ordering::SeqCst);
              Ok("r1".to_string())
            }
          })
          .await?;
        Ok(())
      }
    });

    let mount = Mount::new(
      test_options(Arc::clone(&store), Arc::clone(&dispatcher)),
      MountOptions::new(vec![function]),
    )
    .unwrap();

    mount
      .execute(
        Event::new("foo"),
        Some(ExecutionContext::new("e1", 1).with_task("func1")),
      )
      .await
      .unwrap();

    // neither run nor re-begun nor re-published
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(dispatcher.is_empty());
    assert!(store.is_execution_in_progress("e1").await.unwrap());
  }

  #[tokio::test]
  async fn process_rejects_malformed_envelopes_and_invalid_events() {
    let mount = Mount::new(
      test_options(
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingDispatcher::new()),
      ),
      MountOptions::new(vec![Function::new("f", "foo", |_e, _s| async { Ok(()) })]),
    )
    .unwrap();

    let err = mount.process(b"not json").await.unwrap_err();
    assert!(matches!(err, MountError::Envelope(_)));

    let err = mount
      .process(br#"{"event": {"no_type": true}}"#)
      .await
      .unwrap_err();
    assert!(matches!(err, MountError::InvalidEvent(_)));
  }
}
