use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use crate::{Store, StoreError};

const TRANSACTION_EXT: &str = ".transaction";
const RESULT_EXT: &str = ".result";

/// Filesystem store: one directory per execution, a `.transaction` marker
/// file and a `.result` value file per task.
///
/// Commit writes the result file (via temp-file rename) before removing the
/// marker, so an observer that sees the marker gone always finds the value.
#[derive(Debug, Clone)]
pub struct FsStore {
  root: PathBuf,
}

impl FsStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn execution_dir(&self, execution_id: &str) -> PathBuf {
    self.root.join(execution_id)
  }

  fn task_file(&self, execution_id: &str, task_path: &str, ext: &str) -> PathBuf {
    self.execution_dir(execution_id).join(format!("{task_path}{ext}"))
  }
}

async fn exists(path: &Path) -> Result<bool, StoreError> {
  Ok(fs::try_exists(path).await?)
}

async fn remove_if_present(path: &Path) -> Result<(), StoreError> {
  match fs::remove_file(path).await {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e.into()),
  }
}

#[async_trait]
impl Store for FsStore {
  async fn begin_execution(&self, execution_id: &str) -> Result<(), StoreError> {
    fs::create_dir_all(self.execution_dir(execution_id)).await?;
    Ok(())
  }

  async fn is_execution_in_progress(&self, execution_id: &str) -> Result<bool, StoreError> {
    exists(&self.execution_dir(execution_id)).await
  }

  async fn begin_execution_task(
    &self,
    execution_id: &str,
    task_path: &str,
  ) -> Result<(), StoreError> {
    fs::create_dir_all(self.execution_dir(execution_id)).await?;
    fs::write(self.task_file(execution_id, task_path, TRANSACTION_EXT), b"").await?;
    Ok(())
  }

  async fn is_execution_task_in_progress(
    &self,
    execution_id: &str,
    task_path: &str,
  ) -> Result<bool, StoreError> {
    exists(&self.task_file(execution_id, task_path, TRANSACTION_EXT)).await
  }

  async fn get_execution_task_result(
    &self,
    execution_id: &str,
    task_path: &str,
  ) -> Result<Option<Value>, StoreError> {
    match fs::read(self.task_file(execution_id, task_path, RESULT_EXT)).await {
      Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  async fn commit_execution_task_result(
    &self,
    execution_id: &str,
    task_path: &str,
    value: Value,
  ) -> Result<(), StoreError> {
    fs::create_dir_all(self.execution_dir(execution_id)).await?;
    let result_file = self.task_file(execution_id, task_path, RESULT_EXT);
    let staged = self.task_file(execution_id, task_path, ".result.tmp");

    fs::write(&staged, serde_json::to_vec(&value)?).await?;
    fs::rename(&staged, &result_file).await?;
    remove_if_present(&self.task_file(execution_id, task_path, TRANSACTION_EXT)).await
  }

  async fn dispose_execution(&self, execution_id: &str) -> Result<(), StoreError> {
    match fs::remove_dir_all(self.execution_dir(execution_id)).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  async fn get_execution_task_results(
    &self,
    execution_id: &str,
  ) -> Result<Option<HashMap<String, Value>>, StoreError> {
    let mut results = HashMap::new();
    let mut entries = match fs::read_dir(self.execution_dir(execution_id)).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Some(results)),
      Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
      let name = entry.file_name();
      let Some(name) = name.to_str() else { continue };
      let Some(task_path) = name.strip_suffix(RESULT_EXT) else {
        continue;
      };
      let bytes = fs::read(entry.path()).await?;
      results.insert(task_path.to_string(), serde_json::from_slice(&bytes)?);
    }

    Ok(Some(results))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tempfile::tempdir;

  #[tokio::test]
  async fn task_lifecycle_on_disk() {
    let dir = tempdir().unwrap();
    let store = FsStore::new(dir.path());

    store.begin_execution("e1").await.unwrap();
    assert!(store.is_execution_in_progress("e1").await.unwrap());

    store.begin_execution_task("e1", "f:a").await.unwrap();
    assert!(store
      .is_execution_task_in_progress("e1", "f:a")
      .await
      .unwrap());

    store
      .commit_execution_task_result("e1", "f:a", json!({"k": 1}))
      .await
      .unwrap();
    assert!(!store
      .is_execution_task_in_progress("e1", "f:a")
      .await
      .unwrap());
    assert_eq!(
      store.get_execution_task_result("e1", "f:a").await.unwrap(),
      Some(json!({"k": 1}))
    );
  }

  #[tokio::test]
  async fn commit_leaves_result_file_and_clears_marker() {
    let dir = tempdir().unwrap();
    let store = FsStore::new(dir.path());

    store.begin_execution_task("e1", "f:a").await.unwrap();
    store
      .commit_execution_task_result("e1", "f:a", json!("r"))
      .await
      .unwrap();

    let execution_dir = dir.path().join("e1");
    assert!(execution_dir.join("f:a.result").exists());
    assert!(!execution_dir.join("f:a.transaction").exists());
  }

  #[tokio::test]
  async fn dispose_removes_the_execution_directory() {
    let dir = tempdir().unwrap();
    let store = FsStore::new(dir.path());

    store.begin_execution("e1").await.unwrap();
    store
      .commit_execution_task_result("e1", "f:a", json!(1))
      .await
      .unwrap();
    store.dispose_execution("e1").await.unwrap();

    assert!(!store.is_execution_in_progress("e1").await.unwrap());
    assert_eq!(store.get_execution_task_result("e1", "f:a").await.unwrap(), None);

    // disposing twice is fine
    store.dispose_execution("e1").await.unwrap();
  }

  #[tokio::test]
  async fn bulk_prefetch_scans_result_files() {
    let dir = tempdir().unwrap();
    let store = FsStore::new(dir.path());

    store
      .commit_execution_task_result("e1", "f:a", json!("ra"))
      .await
      .unwrap();
    store
      .commit_execution_task_result("e1", "f:b:c", json!("rc"))
      .await
      .unwrap();
    store.begin_execution_task("e1", "f:d").await.unwrap();

    let results = store.get_execution_task_results("e1").await.unwrap().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results["f:a"], json!("ra"));
    assert_eq!(results["f:b:c"], json!("rc"));

    let empty = store.get_execution_task_results("missing").await.unwrap();
    assert_eq!(empty, Some(HashMap::new()));
  }
}
