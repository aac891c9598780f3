//! Weft Engine
//!
//! The resumable execution engine: the protocol by which a handler, a
//! persistent [`weft_store::Store`], and a [`weft_dispatch::Dispatcher`]
//! cooperate to drive a workflow forward one step at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Mount                              │
//! │  - process(payload) → validate envelope + event             │
//! │  - execute(event, context) → dispatch loop                  │
//! │  - runs matching functions concurrently, decides disposal   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Step engine                           │
//! │  - Step::run(key, callback): cache hit | enter | trigger    │
//! │  - task paths compose per nested call                       │
//! │  - suspends the handler through the interrupt gate          │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Store / Dispatcher                        │
//! │  - committed results, in-progress markers                   │
//! │  - continuation envelopes toward the next delivery          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod error;
mod function;
mod ids;
mod interrupt;
mod mount;
mod options;
mod step;

pub use error::{ExecutionError, MountError};
pub use function::{filter_for_event, Function};
pub use ids::{generate_execution_id, now_millis};
pub use interrupt::InterruptReason;
pub use mount::{ExecutionMode, Mount, MountOptions};
pub use options::{
  share_options, snapshot_options, swap_options, ErrorHook, SharedOptions, WorkerOptions,
};
pub use step::Step;
