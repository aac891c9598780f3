/// A fresh globally-unique execution id.
pub fn generate_execution_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
  chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn execution_ids_do_not_collide() {
    let mut seen = HashSet::new();
    for _ in 0..100_000 {
      assert!(seen.insert(generate_execution_id()));
    }
  }
}
