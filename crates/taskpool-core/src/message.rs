//! The worker -> pool message protocol.
//!
//! Models the pool's result channel as a tagged union carrying exactly the
//! three message kinds spec'd for worker lifecycle: readiness, an ack
//! (success or swallowed-but-reported failure), and exit.

use crate::envelope::{TaskEnvelope, TaskOutcome};
use crate::id::{TaskId, WorkerId};
use crossbeam_channel::Sender;

/// A message sent by a worker (or a worker's drop guard) to the owning pool.
pub enum WorkerMessage {
    /// Published once, when the worker's inbound channel is ready to
    /// receive envelopes.
    Ready {
        worker_id: WorkerId,
        inbound: Sender<TaskEnvelope>,
    },
    /// A task finished (successfully or with a caught failure). Carries the
    /// full outcome so the handle can report errors symmetrically with the
    /// in-process executor (see Open Question 1 in the design notes).
    Ack {
        worker_id: WorkerId,
        task_id: TaskId,
        outcome: TaskOutcome,
    },
    /// The worker has self-terminated (idle reap, shutdown, or unexpected
    /// death). May be sent more than once for the same worker; the pool
    /// must treat it idempotently.
    Exit { worker_id: WorkerId },
}

impl std::fmt::Debug for WorkerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready { worker_id, .. } => {
                f.debug_struct("Ready").field("worker_id", worker_id).finish()
            }
            Self::Ack {
                worker_id,
                task_id,
                outcome,
            } => f
                .debug_struct("Ack")
                .field("worker_id", worker_id)
                .field("task_id", task_id)
                .field("ok", &outcome.is_ok())
                .finish(),
            Self::Exit { worker_id } => f.debug_struct("Exit").field("worker_id", worker_id).finish(),
        }
    }
}
