//! Observable retry progress.
//!
//! [`RetryTracker`] is the stateful form of the executor: it runs the same
//! attempt loop as [`retry`](crate::retry::retry) while publishing a
//! [`RetryState`] snapshot on a `tokio::sync::watch` channel. Presentation
//! layers subscribe to render things like "retry attempt 2 of 3"; the state is
//! purely observational and never feeds back into the loop.

use std::fmt;
use std::future::Future;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::retry::executor::{attempt_loop, without_cancellation, Progress};
use crate::retry::{Failure, Interrupted, RetryEvent, RetryPolicy};

/// Where an execution currently is.
///
/// `Idle → Attempting → {Succeeded | Delaying → Attempting | Failed}`, with
/// `Cancelled` reachable from `Attempting` or `Delaying` when a token fires
/// or the execution future is dropped before it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RetryPhase {
    /// No execution has started, or the tracker was reset.
    #[default]
    Idle,
    /// An attempt is in flight.
    Attempting,
    /// An attempt failed and the backoff delay is running.
    Delaying,
    /// The last execution returned a value.
    Succeeded,
    /// The last execution exhausted its attempts.
    Failed,
    /// The last execution was cancelled or abandoned.
    Cancelled,
}

impl RetryPhase {
    /// Returns true once an execution has finished, one way or another.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Snapshot of one tracker's progress.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RetryState<T> {
    /// Current 0-based attempt index. Resets at the start of every execution.
    pub attempt: u32,
    /// True while an attempt or backoff delay is outstanding.
    pub loading: bool,
    /// Result of the last successful execution.
    pub data: Option<T>,
    /// Terminal failure of the last execution, normalized.
    pub error: Option<Failure>,
    /// Current position in the execution lifecycle.
    pub phase: RetryPhase,
    /// Retry bound of the running (or last) execution.
    pub max_retries: u32,
}

impl<T> Default for RetryState<T> {
    fn default() -> Self {
        Self {
            attempt: 0,
            loading: false,
            data: None,
            error: None,
            phase: RetryPhase::Idle,
            max_retries: 0,
        }
    }
}

impl<T> RetryState<T> {
    /// Returns true while at least one retry has happened and the execution
    /// has not finished.
    pub fn is_retrying(&self) -> bool {
        self.loading && self.attempt > 0
    }
}

/// Stateful retry executor with a live progress channel.
///
/// Each tracker owns its state; two trackers never share anything. Executions
/// take `&mut self`, so one tracker cannot run two at once.
///
/// # Example
///
/// ```rust
/// use growth_retry::{RetryPhase, RetryPolicy, RetryTracker};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let mut tracker = RetryTracker::new();
/// let policy = RetryPolicy::exponential(Duration::from_millis(1)).with_max_retries(2);
///
/// let result: Result<u32, &str> = tracker.execute(&policy, || async { Err("boom") }).await;
/// assert_eq!(result, Err("boom"));
///
/// let state = tracker.state();
/// assert_eq!(state.phase, RetryPhase::Failed);
/// assert_eq!(state.attempt, 2);
/// assert!(!state.loading);
/// assert_eq!(state.data, None);
/// assert_eq!(state.error.unwrap().message(), "boom");
/// # });
/// ```
#[derive(Debug)]
pub struct RetryTracker<T> {
    state: watch::Sender<RetryState<T>>,
}

impl<T> Default for RetryTracker<T> {
    fn default() -> Self {
        let (state, _) = watch::channel(RetryState::default());
        Self { state }
    }
}

impl<T: Clone> RetryTracker<T> {
    /// Create a tracker in the `Idle` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> RetryState<T> {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes.
    ///
    /// The receiver sees every transition that happens while it is being
    /// polled and always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<RetryState<T>> {
        self.state.subscribe()
    }

    /// Return the state to `Idle` defaults, dropping any data or error.
    pub fn reset(&mut self) {
        self.state.send_replace(RetryState::default());
    }

    /// Run `operation` under `policy`, publishing progress.
    ///
    /// Semantics match [`retry`](crate::retry::retry): the final error is
    /// returned unchanged, while the state stores its normalized text.
    pub async fn execute<E, F, Fut>(&mut self, policy: &RetryPolicy, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute_with_hooks(policy, operation, |_| {}).await
    }

    /// Like [`execute`](Self::execute), with an `on_retry` observer.
    pub async fn execute_with_hooks<E, F, Fut, H>(
        &mut self,
        policy: &RetryPolicy,
        operation: F,
        on_retry: H,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        H: FnMut(&RetryEvent<'_, E>),
        E: fmt::Display,
    {
        without_cancellation(self.run(policy, operation, on_retry, None).await)
    }

    /// Run until success, exhaustion, or cancellation of `token`.
    ///
    /// A cancelled execution ends in [`RetryPhase::Cancelled`] with `error`
    /// holding the most recent failure, if any.
    pub async fn execute_until_cancelled<E, F, Fut, H>(
        &mut self,
        policy: &RetryPolicy,
        operation: F,
        on_retry: H,
        token: &CancellationToken,
    ) -> Result<T, Interrupted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        H: FnMut(&RetryEvent<'_, E>),
        E: fmt::Display,
    {
        self.run(policy, operation, on_retry, Some(token)).await
    }

    async fn run<E, F, Fut, H>(
        &mut self,
        policy: &RetryPolicy,
        operation: F,
        on_retry: H,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, Interrupted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        H: FnMut(&RetryEvent<'_, E>),
        E: fmt::Display,
    {
        self.state.send_replace(RetryState {
            max_retries: policy.max_retries(),
            ..RetryState::default()
        });

        let state = &self.state;
        let mut guard = Unfinished {
            state,
            finished: false,
        };
        let result = attempt_loop(
            policy,
            operation,
            on_retry,
            |progress| record(state, progress),
            cancel,
        )
        .await;
        guard.finished = true;

        state.send_modify(|s| {
            s.loading = false;
            match &result {
                Ok(value) => {
                    s.data = Some(value.clone());
                    s.error = None;
                    s.phase = RetryPhase::Succeeded;
                }
                Err(Interrupted::Failed(error)) => {
                    s.data = None;
                    s.error = Some(Failure::from_display(error));
                    s.phase = RetryPhase::Failed;
                }
                Err(Interrupted::Cancelled { last_error, .. }) => {
                    s.data = None;
                    s.error = last_error.as_ref().map(|e| Failure::from_display(e));
                    s.phase = RetryPhase::Cancelled;
                }
            }
        });

        result
    }
}

/// Publishes a terminal state if the execution is dropped or unwinds before
/// the attempt loop returns.
struct Unfinished<'a, T> {
    state: &'a watch::Sender<RetryState<T>>,
    finished: bool,
}

impl<T> Drop for Unfinished<'_, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::debug!("retry execution abandoned before finishing");
        self.state.send_modify(|s| {
            s.loading = false;
            s.data = None;
            s.phase = RetryPhase::Cancelled;
        });
    }
}

fn record<T>(state: &watch::Sender<RetryState<T>>, progress: Progress) {
    state.send_modify(|s| match progress {
        Progress::Attempting { attempt } => {
            s.attempt = attempt;
            s.loading = true;
            s.phase = RetryPhase::Attempting;
        }
        Progress::Delaying { .. } => {
            s.phase = RetryPhase::Delaying;
        }
    });
}
