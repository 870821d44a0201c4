//! Join (C5): wait for every handle in a collection to reach a terminal
//! state.
//!
//! Input handles are deduplicated by identity (the same `CompletionHandle`
//! clone appearing twice counts once), matching the
//! "identity-based deduplication" note in the design — here realized
//! structurally: each handle's terminal state is a single
//! mutex-guarded transition, so there is no risk of counting the same
//! terminal event twice the way a naive dual `whenComplete`+`onCancel`
//! subscription could.

use std::sync::Arc;

use taskpool_core::TaskError;

use crate::handle::CompletionHandle;

/// The terminal state of one joined handle.
#[derive(Debug, Clone)]
pub enum JoinOutcome<T> {
    Value(T),
    Error(TaskError),
    Cancelled,
}

/// Wait for every handle to reach a terminal state. An empty input
/// resolves immediately to an empty vector. Duplicate handles (by
/// identity) are only waited on, and only appear, once.
pub async fn join<T, I>(handles: I) -> Vec<JoinOutcome<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = CompletionHandle<T>>,
{
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    for handle in handles {
        let ptr = Arc::as_ptr(&handle.shared()) as *const () as usize;
        if seen.insert(ptr) {
            unique.push(handle);
        }
    }

    if unique.is_empty() {
        return Vec::new();
    }

    let waits = unique.iter().map(|h| wait_terminal(h));
    futures::future::join_all(waits).await
}

async fn wait_terminal<T: Clone + Send + 'static>(handle: &CompletionHandle<T>) -> JoinOutcome<T> {
    match handle.wait().await {
        Ok(value) => JoinOutcome::Value(value),
        Err(crate::handle::WaitError::Task(err)) => JoinOutcome::Error(err),
        Err(crate::handle::WaitError::Cancelled) => JoinOutcome::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{InProcessExecutor, InProcessExecutorConfig};

    #[tokio::test]
    async fn join_empty_resolves_immediately() {
        let out: Vec<JoinOutcome<i32>> = join(Vec::new()).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn join_waits_for_every_handle() {
        let executor = InProcessExecutor::new(InProcessExecutorConfig::default());
        let handles = vec![
            executor.execute(async { 1 }),
            executor.execute(async { 2 }),
            executor.execute(async { panic!("boom") }),
        ];
        let outcomes = join(handles).await;
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], JoinOutcome::Value(1)));
        assert!(matches!(outcomes[1], JoinOutcome::Value(2)));
        assert!(matches!(outcomes[2], JoinOutcome::Error(_)));
    }

    #[tokio::test]
    async fn join_dedups_identical_handles() {
        let executor = InProcessExecutor::new(InProcessExecutorConfig::default());
        let handle = executor.execute(async { 5 });
        let outcomes = join(vec![handle.clone(), handle]).await;
        assert_eq!(outcomes.len(), 1);
    }
}
