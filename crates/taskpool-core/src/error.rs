//! taskpool error types.

use core::fmt;

/// Errors returned directly by pool/executor operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool or executor has been shut down; no further work is accepted.
    ShutDown,
    /// The pool has reached its configured `max` and the overflow queue
    /// rejected the entry (only possible for bounded overflow configurations).
    QueueFull,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShutDown => write!(f, "pool is shut down"),
            Self::QueueFull => write!(f, "overflow queue is full"),
        }
    }
}

impl std::error::Error for PoolError {}

pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// The error carried by a `CompletionHandle` when the task itself failed.
///
/// Transported across the worker/pool boundary as a best-effort
/// string-preserving value — a real isolate boundary could not carry the
/// original error type across the heap split, so neither does this one.
#[derive(Debug, Clone)]
pub struct TaskError {
    message: String,
    stack: Option<String>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(message: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: Some(stack.into()),
        }
    }

    /// Build a `TaskError` from a `std::panic::catch_unwind` payload.
    pub fn from_panic_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "task panicked with a non-string payload".to_string()
        };
        let backtrace = std::backtrace::Backtrace::capture();
        let stack = match backtrace.status() {
            std::backtrace::BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };
        Self { message, stack }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TaskError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_message() {
        let e = TaskError::new("boom");
        assert_eq!(format!("{}", e), "boom");
        assert!(e.stack().is_none());
    }

    #[test]
    fn with_stack_round_trips() {
        let e = TaskError::with_stack("boom", "at foo.rs:1");
        assert_eq!(e.stack(), Some("at foo.rs:1"));
    }

    #[test]
    fn pool_error_display() {
        assert_eq!(format!("{}", PoolError::ShutDown), "pool is shut down");
    }
}
