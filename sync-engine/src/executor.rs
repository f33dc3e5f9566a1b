//! Bounded, soft-stopping task executor.
//!
//! [`execute`] runs one task per item with at most `limit` tasks in flight.
//! Once a failure has been observed no further task is launched, but tasks
//! already running are awaited rather than cancelled. The first error seen is
//! reported after every launched task has settled.

use std::future::Future;
use tokio::task::{JoinError, JoinSet};

/// Outcome of one [`execute`] call.
#[derive(Debug)]
pub struct Execution<E> {
    /// Tasks launched.
    pub started: usize,
    /// Tasks that finished successfully.
    pub completed: usize,
    /// Tasks that failed or panicked.
    pub failed: usize,
    /// First failure observed, in completion order.
    pub first_error: Option<E>,
}

impl<E> Default for Execution<E> {
    fn default() -> Self {
        Self {
            started: 0,
            completed: 0,
            failed: 0,
            first_error: None,
        }
    }
}

impl<E> Execution<E> {
    /// Check whether every launched task succeeded.
    pub fn is_success(&self) -> bool {
        self.first_error.is_none()
    }

    /// Convert into the number of completed tasks or the first error.
    pub fn into_result(self) -> Result<usize, E> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(self.completed),
        }
    }

    fn record(&mut self, result: Result<Result<(), E>, JoinError>)
    where
        E: From<JoinError>,
    {
        let err = match result {
            Ok(Ok(())) => {
                self.completed += 1;
                return;
            }
            Ok(Err(err)) => err,
            Err(join) => E::from(join),
        };
        self.failed += 1;
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }
}

/// Run `task` for each item with at most `limit` in flight.
///
/// A `limit` of zero is treated as one. Must be called from within a tokio
/// runtime.
pub async fn execute<I, F, Fut, E>(items: I, limit: usize, mut task: F) -> Execution<E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    let limit = limit.max(1);
    let mut set = JoinSet::new();
    let mut execution = Execution::default();

    for item in items {
        while set.len() >= limit {
            match set.join_next().await {
                Some(result) => execution.record(result),
                None => break,
            }
        }
        while let Some(result) = set.try_join_next() {
            execution.record(result);
        }
        if execution.first_error.is_some() {
            tracing::debug!(
                "Not launching further tasks after a failure ({} in flight)",
                set.len()
            );
            break;
        }

        set.spawn(task(item));
        execution.started += 1;
    }

    while let Some(result) = set.join_next().await {
        execution.record(result);
    }
    execution
}
