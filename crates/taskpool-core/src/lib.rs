//! # taskpool-core
//!
//! Platform-agnostic types shared by the isolated worker pool and the
//! in-process executor: identifiers, the type-erased task envelope, the
//! worker/pool message protocol, and error types.
//!
//! This crate contains no threading or scheduling logic — that lives in
//! `taskpool`. Keeping the data model in its own crate lets both the
//! isolated pool and (in principle) alternative executor backends share the
//! same envelope/message/error vocabulary.
//!
//! ## Modules
//!
//! - `id` - `TaskId` / `WorkerId` and the shared id allocator
//! - `envelope` - the type-erased `TaskEnvelope` and `TaskOutcome`
//! - `message` - the worker -> pool message protocol
//! - `error` - `PoolError` and `TaskError`
//! - `env` - environment variable override helpers

pub mod env;
pub mod envelope;
pub mod error;
pub mod id;
pub mod message;

pub use envelope::{TaskEnvelope, TaskOutcome};
pub use error::{PoolError, PoolResult, TaskError};
pub use id::{IdAllocator, TaskId, WorkerId};
pub use message::WorkerMessage;
