//! Worker (C1): a single isolated execution context.
//!
//! A worker is an OS thread standing in for a heap-isolated execution
//! context — it owns no state shared with its caller beyond the channel
//! endpoints used to hand it work and collect results. It loops: receive an
//! envelope, run it (catching any failure locally, inside the envelope
//! itself — see `taskpool_core::envelope`), ack, repeat. Non-core workers
//! additionally run a 1-second-cadence idle reaper and self-exit once idle
//! past their configured TTL.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use taskpool_core::envelope::TaskEnvelope;
use taskpool_core::id::WorkerId;
use taskpool_core::message::WorkerMessage;

/// Cadence of the idle reaper tick, per spec.
const REAP_TICK: Duration = Duration::from_secs(1);

/// Parameters needed to spawn and run one worker thread.
pub(crate) struct WorkerSpawnConfig {
    pub id: WorkerId,
    pub debug_name: String,
    pub is_core: bool,
    pub keep_active_ticks: u64,
    pub result_tx: Sender<WorkerMessage>,
}

/// Spawn a worker thread. Returns its `JoinHandle` so the pool can perform a
/// best-effort join during shutdown.
pub(crate) fn spawn_worker(cfg: WorkerSpawnConfig) -> JoinHandle<()> {
    let thread_name = cfg.debug_name.clone();
    thread::Builder::new()
        .name(thread_name)
        .spawn(move || worker_main(cfg))
        .expect("failed to spawn taskpool worker thread")
}

/// A drop guard that announces worker exit exactly once, regardless of
/// which code path unwinds the thread's stack frame. This is this crate's
/// concrete stand-in for the "context-exit notification" the abstract
/// design describes: a plain OS thread has no separate death signal beyond
/// running to completion, so the notification is folded into the same
/// message channel via `Drop` instead of a second channel.
struct ExitGuard {
    worker_id: WorkerId,
    result_tx: Sender<WorkerMessage>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let _ = self.result_tx.send(WorkerMessage::Exit {
            worker_id: self.worker_id,
        });
    }
}

fn worker_main(cfg: WorkerSpawnConfig) {
    let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded::<TaskEnvelope>();
    let _exit_guard = ExitGuard {
        worker_id: cfg.id,
        result_tx: cfg.result_tx.clone(),
    };

    let ready = cfg.result_tx.send(WorkerMessage::Ready {
        worker_id: cfg.id,
        inbound: inbound_tx,
    });
    if ready.is_err() {
        // The pool is already gone; nothing more to do.
        return;
    }

    let mut idle_ticks: u64 = 0;
    loop {
        if cfg.is_core {
            // Core workers never reap: block indefinitely for the next envelope.
            match inbound_rx.recv() {
                Ok(envelope) => run_envelope(&cfg, envelope),
                Err(_) => break,
            }
        } else {
            match inbound_rx.recv_timeout(REAP_TICK) {
                Ok(envelope) => {
                    idle_ticks = 0;
                    run_envelope(&cfg, envelope);
                }
                Err(RecvTimeoutError::Timeout) => {
                    idle_ticks += 1;
                    if idle_ticks >= cfg.keep_active_ticks {
                        tracing::debug!(worker = %cfg.id, "idle past keep-active TTL, reaping");
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
    // `_exit_guard` drops here, sending the Exit message.
}

fn run_envelope(cfg: &WorkerSpawnConfig, envelope: TaskEnvelope) {
    let task_id = envelope.id();
    tracing::trace!(worker = %cfg.id, task = %task_id, label = envelope.debug_label(), "running task");
    let outcome = envelope.run();
    let _ = cfg.result_tx.send(WorkerMessage::Ack {
        worker_id: cfg.id,
        task_id,
        outcome,
    });
}
