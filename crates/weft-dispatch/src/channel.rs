//! In-process dispatch over a bounded channel.
//!
//! The [`ChannelDispatcher`] is the sending half; the [`DeliveryPump`] owns
//! the receiver and drives a processing sink until the channel closes or a
//! cancellation token fires. Together they form the loopback transport used
//! by tests and single-process deployments.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{DispatchError, Dispatcher};

/// Create a connected dispatcher/pump pair with the given channel capacity.
pub fn channel(buffer: usize) -> (ChannelDispatcher, DeliveryPump) {
  let (sender, receiver) = mpsc::channel(buffer);
  (ChannelDispatcher { sender }, DeliveryPump { receiver })
}

/// Dispatcher backed by an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
  sender: mpsc::Sender<Bytes>,
}

#[async_trait]
impl Dispatcher for ChannelDispatcher {
  async fn dispatch(&self, payload: Bytes, _options: Option<Value>) -> Result<(), DispatchError> {
    self
      .sender
      .send(payload)
      .await
      .map_err(|_| DispatchError::Closed)
  }
}

/// The receiving half of an in-process dispatch channel.
pub struct DeliveryPump {
  receiver: mpsc::Receiver<Bytes>,
}

impl DeliveryPump {
  /// Deliver payloads to `sink` until the channel closes or `cancel` fires.
  ///
  /// Sink failures are logged and the loop continues; a failed delivery is
  /// the sink's problem to retry, not the pump's.
  pub async fn run<F, Fut, E>(mut self, sink: F, cancel: CancellationToken)
  where
    F: Fn(Bytes) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: fmt::Display,
  {
    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("delivery pump cancelled");
          break;
        }
        payload = self.receiver.recv() => {
          match payload {
            Some(payload) => {
              if let Err(e) = sink(payload).await {
                error!(error = %e, "delivery failed");
              }
            }
            None => {
              info!("delivery channel closed");
              break;
            }
          }
        }
      }
    }
  }

  /// Receive a single payload; for tests.
  pub async fn recv(&mut self) -> Option<Bytes> {
    self.receiver.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  #[tokio::test]
  async fn dispatch_reaches_the_pump() {
    let (dispatcher, mut pump) = channel(8);
    dispatcher.dispatch(Bytes::from_static(b"hi"), None).await.unwrap();
    assert_eq!(pump.recv().await, Some(Bytes::from_static(b"hi")));
  }

  #[tokio::test]
  async fn dispatch_fails_when_pump_dropped() {
    let (dispatcher, pump) = channel(8);
    drop(pump);
    let err = dispatcher.dispatch(Bytes::from_static(b"hi"), None).await;
    assert!(matches!(err, Err(DispatchError::Closed)));
  }

  #[tokio::test]
  async fn pump_delivers_and_survives_sink_failures() {
    let (dispatcher, pump) = channel(8);
    let delivered = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();

    let sink_count = Arc::clone(&delivered);
    let handle = tokio::spawn(pump.run(
      move |payload: Bytes| {
        let count = Arc::clone(&sink_count);
        async move {
          count.fetch_add(1, Ordering::SeqCst);
          if payload == Bytes::from_static(b"bad") {
            Err("sink refused payload")
          } else {
            Ok(())
          }
        }
      },
      cancel.clone(),
    ));

    dispatcher.dispatch(Bytes::from_static(b"bad"), None).await.unwrap();
    dispatcher.dispatch(Bytes::from_static(b"good"), None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(delivered.load(Ordering::SeqCst), 2);
  }
}
