//! A library for durable, resumable event-driven workflows.
//!
//! A workflow is a straight-line handler that processes one event and
//! composes named steps. Each step runs at most once to a committed result;
//! re-entries of the handler replay from the top and short-circuit finished
//! steps from the store, so an execution survives process death, partial
//! failure, and arbitrary delays between steps.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weft::prelude::*;
//!
//! let worker = Worker::new(WorkerOptions::new(
//!   Arc::new(MemoryStore::new()),
//!   Arc::new(my_dispatcher),
//! ));
//!
//! let charge = worker.create_function("charge", "order/created", |event, step| async move {
//!   let payment: String = step
//!     .run("collect-payment", |_| async move { Ok("payment-id".to_string()) })
//!     .await?;
//!   step
//!     .run("send-receipt", move |_| async move {
//!       println!("receipt for {payment}");
//!       Ok(())
//!     })
//!     .await?;
//!   Ok(())
//! });
//!
//! let mount = worker.mount(MountOptions::new(vec![charge]))?;
//! // hand `mount.process(body)` to your transport of choice
//! ```

mod worker;

pub use worker::{PublishError, Worker, WorkerOptionsPatch};

pub use weft_dispatch::{
  channel, ChannelDispatcher, DeliveryPump, DispatchError, Dispatcher, RecordingDispatcher,
};
pub use weft_engine::{
  filter_for_event, generate_execution_id, now_millis, ErrorHook, ExecutionError, ExecutionMode,
  Function, Mount, MountError, MountOptions, Step, WorkerOptions,
};
pub use weft_event::{
  Envelope, Event, EventFilter, EventSchema, ExecutionContext, InvalidEventError, TypeSchema,
};
pub use weft_store::{FsStore, MemoryStore, Store, StoreError, EMPTY_RESULT};
#[cfg(feature = "sqlite")]
pub use weft_store::SqliteStore;

/// Prelude for convenient imports.
pub mod prelude {
  pub use crate::{
    Event, EventFilter, ExecutionContext, ExecutionError, ExecutionMode, Function, MemoryStore,
    Mount, MountOptions, Step, Worker, WorkerOptions, WorkerOptionsPatch,
  };
}
