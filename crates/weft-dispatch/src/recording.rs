use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::{DispatchError, Dispatcher};

/// Records every dispatched payload instead of delivering it; for tests.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
  payloads: Mutex<Vec<Bytes>>,
}

impl RecordingDispatcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// All payloads dispatched so far, in order.
  pub fn payloads(&self) -> Vec<Bytes> {
    self.lock().clone()
  }

  /// Drain the recorded payloads.
  pub fn take(&self) -> Vec<Bytes> {
    std::mem::take(&mut *self.lock())
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Bytes>> {
    self.payloads.lock().unwrap_or_else(|e| e.into_inner())
  }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
  async fn dispatch(&self, payload: Bytes, _options: Option<Value>) -> Result<(), DispatchError> {
    self.lock().push(payload);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn records_in_order() {
    let dispatcher = RecordingDispatcher::new();
    dispatcher.dispatch(Bytes::from_static(b"a"), None).await.unwrap();
    dispatcher.dispatch(Bytes::from_static(b"b"), None).await.unwrap();

    assert_eq!(dispatcher.len(), 2);
    assert_eq!(dispatcher.take(), vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
    assert!(dispatcher.is_empty());
  }
}
