//! Weft Store
//!
//! This crate provides the storage trait and implementations for
//! per-execution task state. A store records that an execution exists, which
//! tasks are in progress, and the committed result of each finished task.
//!
//! The [`Store`] trait defines operations for:
//! - Recording and disposing executions
//! - Marking tasks in progress
//! - Committing and reading task results
//!
//! The value domain is opaque: a store must round-trip any JSON value
//! unchanged, including the reserved [`EMPTY_RESULT`] sentinel that stands
//! in for "this task committed no value".

mod fs;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use fs::FsStore;
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

/// Reserved committed-value sentinel for a task that produced no value,
/// distinguishing "committed empty" from "not yet committed".
pub const EMPTY_RESULT: &str = "<empty_execution_result>";

/// Translate a value for commit: JSON null is stored as the empty sentinel.
pub fn encode_result(value: Value) -> Value {
  if value.is_null() {
    Value::String(EMPTY_RESULT.to_string())
  } else {
    value
  }
}

/// Translate a committed value for the handler: the empty sentinel reads
/// back as JSON null.
pub fn decode_result(value: Value) -> Value {
  match value {
    Value::String(ref s) if s == EMPTY_RESULT => Value::Null,
    value => value,
  }
}

/// Error type for store operations.
///
/// Logical lookup misses are not errors; only transport and corruption
/// failures surface here.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The underlying transport failed.
  #[error("store i/o error: {0}")]
  Io(#[from] std::io::Error),

  /// A stored value could not be decoded.
  #[error("stored value is not valid JSON: {0}")]
  Corrupt(#[from] serde_json::Error),

  /// A database error occurred.
  #[cfg(feature = "sqlite")]
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

/// Storage trait for per-execution task state.
#[async_trait]
pub trait Store: Send + Sync {
  /// Record that an execution exists. Idempotent.
  async fn begin_execution(&self, execution_id: &str) -> Result<(), StoreError>;

  /// True iff `begin_execution` has been called and `dispose_execution`
  /// has not.
  async fn is_execution_in_progress(&self, execution_id: &str) -> Result<bool, StoreError>;

  /// Idempotent mark of "in progress" for a task.
  async fn begin_execution_task(
    &self,
    execution_id: &str,
    task_path: &str,
  ) -> Result<(), StoreError>;

  /// Whether the task's in-progress marker is set.
  async fn is_execution_task_in_progress(
    &self,
    execution_id: &str,
    task_path: &str,
  ) -> Result<bool, StoreError>;

  /// The committed result for a task, if any.
  async fn get_execution_task_result(
    &self,
    execution_id: &str,
    task_path: &str,
  ) -> Result<Option<Value>, StoreError>;

  /// Atomically clear the in-progress marker and write the value.
  ///
  /// A concurrent observer must never see a committed task as neither
  /// in progress nor committed.
  async fn commit_execution_task_result(
    &self,
    execution_id: &str,
    task_path: &str,
    value: Value,
  ) -> Result<(), StoreError>;

  /// Delete all state for the execution.
  async fn dispose_execution(&self, execution_id: &str) -> Result<(), StoreError>;

  /// Bulk prefetch of all committed results for an execution, keyed by task
  /// path. Returns `None` when the backend does not support it; the mount
  /// then falls back to per-task reads.
  async fn get_execution_task_results(
    &self,
    execution_id: &str,
  ) -> Result<Option<HashMap<String, Value>>, StoreError> {
    let _ = execution_id;
    Ok(None)
  }
}
