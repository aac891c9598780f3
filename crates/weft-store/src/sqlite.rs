use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::{Store, StoreError};

/// SQLite-backed store.
///
/// One row per execution and one row per task, keyed
/// `(execution_id, task_path)`. Commit is a single upsert, so the
/// marker-clear and the value write are atomic.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Connect and create the schema if it does not exist.
  pub async fn connect(url: &str) -> Result<Self, StoreError> {
    // an in-memory database exists per connection; keep the pool to one
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
      .max_connections(max_connections)
      .connect(url)
      .await?;

    sqlx::query(
      "CREATE TABLE IF NOT EXISTS executions (
         execution_id TEXT PRIMARY KEY,
         started_at INTEGER NOT NULL
       )",
    )
    .execute(&pool)
    .await?;

    sqlx::query(
      "CREATE TABLE IF NOT EXISTS execution_tasks (
         execution_id TEXT NOT NULL,
         task_path TEXT NOT NULL,
         in_progress INTEGER NOT NULL DEFAULT 0,
         result TEXT,
         PRIMARY KEY (execution_id, task_path)
       )",
    )
    .execute(&pool)
    .await?;

    Ok(Self { pool })
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn begin_execution(&self, execution_id: &str) -> Result<(), StoreError> {
    sqlx::query(
      "INSERT INTO executions (execution_id, started_at) VALUES (?1, ?2)
       ON CONFLICT (execution_id) DO NOTHING",
    )
    .bind(execution_id)
    .bind(chrono::Utc::now().timestamp_millis())
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn is_execution_in_progress(&self, execution_id: &str) -> Result<bool, StoreError> {
    let count: i64 =
      sqlx::query_scalar("SELECT COUNT(*) FROM executions WHERE execution_id = ?1")
        .bind(execution_id)
        .fetch_one(&self.pool)
        .await?;
    Ok(count > 0)
  }

  async fn begin_execution_task(
    &self,
    execution_id: &str,
    task_path: &str,
  ) -> Result<(), StoreError> {
    sqlx::query(
      "INSERT INTO execution_tasks (execution_id, task_path, in_progress)
       VALUES (?1, ?2, 1)
       ON CONFLICT (execution_id, task_path) DO NOTHING",
    )
    .bind(execution_id)
    .bind(task_path)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn is_execution_task_in_progress(
    &self,
    execution_id: &str,
    task_path: &str,
  ) -> Result<bool, StoreError> {
    let count: i64 = sqlx::query_scalar(
      "SELECT COUNT(*) FROM execution_tasks
       WHERE execution_id = ?1 AND task_path = ?2 AND in_progress = 1",
    )
    .bind(execution_id)
    .bind(task_path)
    .fetch_one(&self.pool)
    .await?;
    Ok(count > 0)
  }

  async fn get_execution_task_result(
    &self,
    execution_id: &str,
    task_path: &str,
  ) -> Result<Option<Value>, StoreError> {
    let row: Option<Option<String>> = sqlx::query_scalar(
      "SELECT result FROM execution_tasks
       WHERE execution_id = ?1 AND task_path = ?2",
    )
    .bind(execution_id)
    .bind(task_path)
    .fetch_optional(&self.pool)
    .await?;

    match row.flatten() {
      Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
      None => Ok(None),
    }
  }

  async fn commit_execution_task_result(
    &self,
    execution_id: &str,
    task_path: &str,
    value: Value,
  ) -> Result<(), StoreError> {
    sqlx::query(
      "INSERT INTO execution_tasks (execution_id, task_path, in_progress, result)
       VALUES (?1, ?2, 0, ?3)
       ON CONFLICT (execution_id, task_path)
       DO UPDATE SET in_progress = 0, result = excluded.result",
    )
    .bind(execution_id)
    .bind(task_path)
    .bind(serde_json::to_string(&value)?)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn dispose_execution(&self, execution_id: &str) -> Result<(), StoreError> {
    let mut tx = self.pool.begin().await?;
    sqlx::query("DELETE FROM execution_tasks WHERE execution_id = ?1")
      .bind(execution_id)
      .execute(&mut *tx)
      .await?;
    sqlx::query("DELETE FROM executions WHERE execution_id = ?1")
      .bind(execution_id)
      .execute(&mut *tx)
      .await?;
    tx.commit().await?;
    Ok(())
  }

  async fn get_execution_task_results(
    &self,
    execution_id: &str,
  ) -> Result<Option<HashMap<String, Value>>, StoreError> {
    let rows = sqlx::query(
      "SELECT task_path, result FROM execution_tasks
       WHERE execution_id = ?1 AND result IS NOT NULL",
    )
    .bind(execution_id)
    .fetch_all(&self.pool)
    .await?;

    let mut results = HashMap::with_capacity(rows.len());
    for row in rows {
      let task_path: String = row.try_get("task_path")?;
      let raw: String = row.try_get("result")?;
      results.insert(task_path, serde_json::from_str(&raw)?);
    }
    Ok(Some(results))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  async fn memory_store() -> SqliteStore {
    SqliteStore::connect("sqlite::memory:").await.unwrap()
  }

  #[tokio::test]
  async fn task_lifecycle() {
    let store = memory_store().await;

    store.begin_execution("e1").await.unwrap();
    assert!(store.is_execution_in_progress("e1").await.unwrap());

    store.begin_execution_task("e1", "f:a").await.unwrap();
    assert!(store
      .is_execution_task_in_progress("e1", "f:a")
      .await
      .unwrap());

    store
      .commit_execution_task_result("e1", "f:a", json!(["r", 1]))
      .await
      .unwrap();
    assert!(!store
      .is_execution_task_in_progress("e1", "f:a")
      .await
      .unwrap());
    assert_eq!(
      store.get_execution_task_result("e1", "f:a").await.unwrap(),
      Some(json!(["r", 1]))
    );
  }

  #[tokio::test]
  async fn dispose_clears_both_tables() {
    let store = memory_store().await;

    store.begin_execution("e1").await.unwrap();
    store
      .commit_execution_task_result("e1", "f:a", json!(1))
      .await
      .unwrap();
    store.dispose_execution("e1").await.unwrap();

    assert!(!store.is_execution_in_progress("e1").await.unwrap());
    assert_eq!(store.get_execution_task_result("e1", "f:a").await.unwrap(), None);
  }

  #[tokio::test]
  async fn bulk_prefetch_skips_uncommitted_tasks() {
    let store = memory_store().await;

    store
      .commit_execution_task_result("e1", "f:a", json!("ra"))
      .await
      .unwrap();
    store.begin_execution_task("e1", "f:b").await.unwrap();

    let results = store.get_execution_task_results("e1").await.unwrap().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results["f:a"], json!("ra"));
  }
}
