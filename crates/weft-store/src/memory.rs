use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::{Store, StoreError};

#[derive(Debug, Default)]
struct ExecutionState {
  transactions: HashSet<String>,
  results: HashMap<String, Value>,
}

/// In-memory store; the reference backend for tests.
///
/// All operations take a single lock, so commit is trivially atomic with
/// respect to concurrent observers.
#[derive(Debug, Default)]
pub struct MemoryStore {
  executions: Mutex<HashMap<String, ExecutionState>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ExecutionState>> {
    self.executions.lock().unwrap_or_else(|e| e.into_inner())
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn begin_execution(&self, execution_id: &str) -> Result<(), StoreError> {
    self.lock().entry(execution_id.to_string()).or_default();
    Ok(())
  }

  async fn is_execution_in_progress(&self, execution_id: &str) -> Result<bool, StoreError> {
    Ok(self.lock().contains_key(execution_id))
  }

  async fn begin_execution_task(
    &self,
    execution_id: &str,
    task_path: &str,
  ) -> Result<(), StoreError> {
    self
      .lock()
      .entry(execution_id.to_string())
      .or_default()
      .transactions
      .insert(task_path.to_string());
    Ok(())
  }

  async fn is_execution_task_in_progress(
    &self,
    execution_id: &str,
    task_path: &str,
  ) -> Result<bool, StoreError> {
    Ok(
      self
        .lock()
        .get(execution_id)
        .is_some_and(|state| state.transactions.contains(task_path)),
    )
  }

  async fn get_execution_task_result(
    &self,
    execution_id: &str,
    task_path: &str,
  ) -> Result<Option<Value>, StoreError> {
    Ok(
      self
        .lock()
        .get(execution_id)
        .and_then(|state| state.results.get(task_path).cloned()),
    )
  }

  async fn commit_execution_task_result(
    &self,
    execution_id: &str,
    task_path: &str,
    value: Value,
  ) -> Result<(), StoreError> {
    let mut executions = self.lock();
    let state = executions.entry(execution_id.to_string()).or_default();
    state.transactions.remove(task_path);
    state.results.insert(task_path.to_string(), value);
    Ok(())
  }

  async fn dispose_execution(&self, execution_id: &str) -> Result<(), StoreError> {
    self.lock().remove(execution_id);
    Ok(())
  }

  async fn get_execution_task_results(
    &self,
    execution_id: &str,
  ) -> Result<Option<HashMap<String, Value>>, StoreError> {
    Ok(Some(
      self
        .lock()
        .get(execution_id)
        .map(|state| state.results.clone())
        .unwrap_or_default(),
    ))
  }
}
