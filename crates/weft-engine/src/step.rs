//! The resumable step engine.
//!
//! A handler advances one execution by composing named steps through
//! [`Step::run`]. Each step runs at most once to a committed result; on
//! replay a finished step short-circuits to its cached value, and the first
//! step with work left to do suspends the whole handler after arranging its
//! own next delivery.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};
use weft_dispatch::{DispatchError, Dispatcher};
use weft_event::{Envelope, Event, ExecutionContext};
use weft_store::{decode_result, encode_result, Store};

use crate::interrupt::{InterruptGate, InterruptReason};
use crate::{ExecutionError, Function};

/// True when the inbound task is the step at `path` or one of its
/// descendants. Segment-aware: `f:a` does not target `f:ab`.
pub(crate) fn task_targets(inbound: &str, path: &str) -> bool {
  inbound == path
    || (inbound.len() > path.len()
      && inbound.starts_with(path)
      && inbound.as_bytes()[path.len()] == b':')
}

/// Strip the last `:`-delimited segment; `None` for a single-segment path.
pub(crate) fn parent_path(path: &str) -> Option<String> {
  path.rfind(':').map(|i| path[..i].to_string())
}

/// Read-through cache over committed results, shared by every function
/// driven for one inbound context. Seeded from the store's bulk prefetch
/// when available; commits made during the invocation land here too, so
/// run-until-error replays see them without another store read.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResultCache {
  inner: Arc<Mutex<HashMap<String, Value>>>,
}

impl ResultCache {
  pub(crate) fn seed(&self, results: HashMap<String, Value>) {
    self.lock().extend(results);
  }

  fn get(&self, path: &str) -> Option<Value> {
    self.lock().get(path).cloned()
  }

  fn insert(&self, path: String, value: Value) {
    self.lock().insert(path, value);
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// In-progress markers for run-until-error mode, which never persists them:
/// the queue lives and dies with one invocation, so the markers can too.
#[derive(Debug, Clone, Default)]
pub(crate) struct LocalMarkers {
  inner: Arc<Mutex<HashSet<String>>>,
}

impl LocalMarkers {
  fn contains(&self, path: &str) -> bool {
    self.lock().contains(path)
  }

  fn insert(&self, path: &str) {
    self.lock().insert(path.to_string());
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// Where continuations go: across the dispatcher (isolated mode) or onto
/// the mount's in-process queue (run-until-error mode).
#[derive(Clone)]
pub(crate) enum ContinuationSink {
  Dispatcher(Arc<dyn Dispatcher>),
  Queue(mpsc::UnboundedSender<ExecutionContext>),
}

/// Shared engine state for one function invocation.
pub(crate) struct StepRuntime {
  pub(crate) store: Arc<dyn Store>,
  pub(crate) event: Event,
  pub(crate) execution_id: String,
  pub(crate) timestamp: i64,
  pub(crate) inbound_task: Option<String>,
  pub(crate) cache: ResultCache,
  pub(crate) markers: Option<LocalMarkers>,
  pub(crate) sink: ContinuationSink,
  pub(crate) gate: InterruptGate,
}

impl StepRuntime {
  async fn lookup(&self, path: &str) -> Result<Option<Value>, ExecutionError> {
    if let Some(value) = self.cache.get(path) {
      return Ok(Some(value));
    }
    match self
      .store
      .get_execution_task_result(&self.execution_id, path)
      .await?
    {
      Some(value) => {
        self.cache.insert(path.to_string(), value.clone());
        Ok(Some(value))
      }
      None => Ok(None),
    }
  }

  async fn task_in_progress(&self, path: &str) -> Result<bool, ExecutionError> {
    match &self.markers {
      Some(markers) => Ok(markers.contains(path)),
      None => Ok(
        self
          .store
          .is_execution_task_in_progress(&self.execution_id, path)
          .await?,
      ),
    }
  }

  async fn begin_task(&self, path: &str) -> Result<(), ExecutionError> {
    match &self.markers {
      Some(markers) => markers.insert(path),
      None => {
        self
          .store
          .begin_execution_task(&self.execution_id, path)
          .await?
      }
    }
    Ok(())
  }

  async fn commit(&self, path: &str, value: Value) -> Result<(), ExecutionError> {
    self
      .store
      .commit_execution_task_result(&self.execution_id, path, value.clone())
      .await?;
    self.cache.insert(path.to_string(), value);
    info!(
      execution_id = %self.execution_id,
      task_path = %path,
      "task_committed"
    );
    Ok(())
  }

  async fn enqueue(&self, task_id: Option<String>) -> Result<(), ExecutionError> {
    let context = ExecutionContext {
      execution_id: self.execution_id.clone(),
      timestamp: self.timestamp,
      task_id,
    };
    match &self.sink {
      ContinuationSink::Dispatcher(dispatcher) => {
        let envelope =
          Envelope::continuation(serde_json::to_value(&self.event)?, context);
        let payload = Bytes::from(serde_json::to_vec(&envelope)?);
        dispatcher.dispatch(payload, None).await?;
      }
      ContinuationSink::Queue(queue) => {
        queue
          .send(context)
          .map_err(|_| DispatchError::Closed)?;
      }
    }
    Ok(())
  }

  /// Fire the gate and park this step forever; the supervisor drops the
  /// whole handler at its current suspension point.
  async fn suspend<T>(&self, reason: InterruptReason) -> Result<T, ExecutionError> {
    debug!(
      execution_id = %self.execution_id,
      task_path = %reason.task_path(),
      reason = ?reason,
      "invocation_suspended"
    );
    self.gate.fire(reason);
    std::future::pending().await
  }
}

/// The durable-step frame handed to handlers.
///
/// A `Step` names the task it belongs to; nested [`run`](Step::run) calls
/// extend the task path one `:`-delimited segment at a time, so a step is
/// identified by where it sits in the handler, not by when it runs.
#[derive(Clone)]
pub struct Step {
  rt: Arc<StepRuntime>,
  path: String,
}

impl Step {
  pub(crate) fn new(rt: Arc<StepRuntime>, path: String) -> Self {
    Self { rt, path }
  }

  /// The task path of the step this frame belongs to.
  pub fn path(&self) -> &str {
    &self.path
  }

  pub fn execution_id(&self) -> &str {
    &self.rt.execution_id
  }

  /// Run the named step at most once to a committed result.
  ///
  /// On replay a committed step returns its cached value without invoking
  /// the callback. A step with work left to do arranges its own delivery
  /// and suspends the handler; the callback runs only on the delivery that
  /// targets it. An error returned by the callback is yours to handle: the
  /// step commits nothing and its in-progress marker stays until a
  /// redelivery runs it again.
  pub async fn run<T, F, Fut>(&self, key: &str, callback: F) -> Result<T, ExecutionError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(Step) -> Fut,
    Fut: Future<Output = Result<T, ExecutionError>>,
  {
    let path = format!("{}:{}", self.path, key);

    if let Some(value) = self.rt.lookup(&path).await? {
      return Ok(serde_json::from_value(decode_result(value))?);
    }

    let targeted = self
      .rt
      .inbound_task
      .as_deref()
      .is_some_and(|task| task_targets(task, &path));

    if targeted {
      let child = Step::new(Arc::clone(&self.rt), path.clone());
      let value = callback(child).await?;
      let value = encode_result(serde_json::to_value(&value)?);
      self.rt.commit(&path, value).await?;
      self.rt.enqueue(parent_path(&path)).await?;
      self
        .rt
        .suspend(InterruptReason::TaskCompleted { task_path: path })
        .await
    } else {
      if self.rt.task_in_progress(&path).await? {
        return self
          .rt
          .suspend(InterruptReason::TaskInProgress { task_path: path })
          .await;
      }
      self.rt.begin_task(&path).await?;
      self.rt.enqueue(Some(path.clone())).await?;
      self
        .rt
        .suspend(InterruptReason::TaskTriggered { task_path: path })
        .await
    }
  }
}

/// How one supervised function invocation ended.
#[derive(Debug)]
pub(crate) enum FunctionOutcome {
  /// The handler finished; the function task is committed (or was already).
  Completed,
  /// The engine suspended the invocation.
  Interrupted(InterruptReason),
}

/// Drive one function through the step protocol for one inbound context.
///
/// The function itself is a task at path `function_id`: untargeted and
/// unstarted, it is begun-and-enqueued without invoking the handler; a
/// delivery targeting it (or a descendant) replays the handler under the
/// supervisor; a top-level re-entry (no inbound task) replays it only if it
/// is already underway. Successful completion commits the function task with
/// no continuation and no suspension, which is what lets the mount decide
/// disposal.
pub(crate) async fn drive_function(
  function: Function,
  rt: Arc<StepRuntime>,
) -> Result<FunctionOutcome, ExecutionError> {
  let path = function.id().to_string();

  if rt.lookup(&path).await?.is_some() {
    debug!(
      execution_id = %rt.execution_id,
      function_id = %path,
      "function_already_finished"
    );
    return Ok(FunctionOutcome::Completed);
  }

  let entered = match rt.inbound_task.as_deref() {
    Some(task) => task_targets(task, &path),
    None => rt.task_in_progress(&path).await?,
  };

  if !entered {
    if rt.task_in_progress(&path).await? {
      return Ok(FunctionOutcome::Interrupted(InterruptReason::TaskInProgress {
        task_path: path,
      }));
    }
    rt.begin_task(&path).await?;
    rt.enqueue(Some(path.clone())).await?;
    debug!(
      execution_id = %rt.execution_id,
      function_id = %path,
      "function_triggered"
    );
    return Ok(FunctionOutcome::Interrupted(InterruptReason::TaskTriggered {
      task_path: path,
    }));
  }

  let root = Step::new(Arc::clone(&rt), path.clone());
  let handler = function.invoke(rt.event.clone(), root);

  tokio::select! {
    reason = rt.gate.fired() => Ok(FunctionOutcome::Interrupted(reason)),
    result = handler => {
      result?;
      rt.commit(&path, encode_result(Value::Null)).await?;
      Ok(FunctionOutcome::Completed)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn targeting_is_segment_aware() {
    assert!(task_targets("f", "f"));
    assert!(task_targets("f:a", "f"));
    assert!(task_targets("f:a:b", "f:a"));
    assert!(!task_targets("f", "f:a"));
    assert!(!task_targets("f:ab", "f:a"));
    assert!(!task_targets("g:a", "f"));
  }

  #[test]
  fn parent_strips_one_segment() {
    assert_eq!(parent_path("f:a:b"), Some("f:a".to_string()));
    assert_eq!(parent_path("f:a"), Some("f".to_string()));
    assert_eq!(parent_path("f"), None);
  }
}
