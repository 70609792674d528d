//! The attempt loop and its stand-alone entry points.
//!
//! Every public retry form funnels into [`attempt_loop`]. The stand-alone
//! functions here run it with no observable state, [`RetryTracker`] runs it
//! while publishing progress, and the cancellable variants race it against a
//! [`CancellationToken`].
//!
//! [`RetryTracker`]: crate::retry::RetryTracker

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::retry::policy::whole_millis;
use crate::retry::{Interrupted, RetryEvent, RetryPolicy, TimeoutError};

/// A state transition inside one execution, reported to progress sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    /// Attempt `attempt` (0-indexed) is about to be invoked.
    Attempting { attempt: u32 },
    /// Attempt `attempt` failed and the loop is sleeping for `delay`.
    Delaying { attempt: u32, delay: Duration },
}

/// Run `operation` under `policy` until it succeeds or attempts run out.
///
/// Attempts are strictly sequential. `on_retry` fires synchronously between a
/// failed attempt and its delay; a panic inside it unwinds through here.
#[tracing::instrument(
    level = "debug",
    name = "retry",
    skip_all,
    fields(max_retries = policy.max_retries(), backoff = ?policy.backoff())
)]
pub(crate) async fn attempt_loop<T, E, F, Fut, H, P>(
    policy: &RetryPolicy,
    mut operation: F,
    mut on_retry: H,
    mut progress: P,
    cancel: Option<&CancellationToken>,
) -> Result<T, Interrupted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: FnMut(&RetryEvent<'_, E>),
    P: FnMut(Progress),
{
    let start = Instant::now();
    let mut last_error: Option<E> = None;
    let mut attempt = 0u32;

    loop {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            info!(attempts = attempt, "retry cancelled");
            return Err(Interrupted::Cancelled {
                attempts: attempt,
                last_error,
            });
        }

        progress(Progress::Attempting { attempt });
        debug!(attempt, "starting attempt");

        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(attempts = attempt + 1, "retry cancelled mid-attempt");
                    return Err(Interrupted::Cancelled {
                        attempts: attempt + 1,
                        last_error,
                    });
                }
                outcome = operation() => outcome,
            },
            None => operation().await,
        };

        let error = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let Some(delay) = policy.delay_with_jitter(attempt) else {
            warn!(attempts = attempt + 1, "retry attempts exhausted");
            return Err(Interrupted::Failed(error));
        };

        on_retry(&RetryEvent {
            attempt: attempt + 1,
            error: &error,
            next_delay: delay,
            elapsed: start.elapsed(),
        });
        debug!(
            attempt = attempt + 1,
            delay_ms = whole_millis(delay),
            "attempt failed, retrying"
        );

        progress(Progress::Delaying { attempt, delay });
        last_error = Some(error);

        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(attempts = attempt + 1, "retry cancelled during backoff");
                    return Err(Interrupted::Cancelled {
                        attempts: attempt + 1,
                        last_error,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            },
            None => tokio::time::sleep(delay).await,
        }

        attempt += 1;
    }
}

/// Strip the cancellation arm from a loop that was run without a token.
pub(crate) fn without_cancellation<T, E>(result: Result<T, Interrupted<E>>) -> Result<T, E> {
    result.map_err(|interrupted| match interrupted {
        Interrupted::Failed(error) => error,
        Interrupted::Cancelled { .. } => {
            unreachable!("attempt loop reported cancellation without a token")
        }
    })
}

/// Retry an operation until it succeeds or the policy's attempts run out.
///
/// `operation` is called once per attempt and must produce a fresh future each
/// time. On exhaustion the error from the final attempt is returned unchanged.
///
/// # Example
///
/// ```rust
/// use growth_retry::{retry, RetryPolicy};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let counter = AtomicU32::new(0);
/// let calls = &counter;
/// let policy = RetryPolicy::exponential(Duration::from_millis(1)).with_max_retries(3);
///
/// let result = retry(&policy, || async move {
///     if calls.fetch_add(1, Ordering::SeqCst) < 2 {
///         Err("transient")
///     } else {
///         Ok(42)
///     }
/// })
/// .await;
///
/// assert_eq!(result, Ok(42));
/// assert_eq!(counter.load(Ordering::SeqCst), 3);
/// # });
/// ```
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_hooks(policy, operation, |_| {}).await
}

/// Retry with an `on_retry` observer.
///
/// The observer runs before each retry delay and receives the attempt number
/// about to run (starting at 1) and the error that caused the retry. It never
/// runs after the final attempt. Keep it short and non-blocking; it is meant for
/// logging and progress reporting.
///
/// # Example
///
/// ```rust
/// use growth_retry::{retry_with_hooks, RetryEvent, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let mut seen = Vec::new();
/// let policy = RetryPolicy::linear(Duration::from_millis(1)).with_max_retries(2);
///
/// let result: Result<(), &str> = retry_with_hooks(
///     &policy,
///     || async { Err("offline") },
///     |event: &RetryEvent<'_, &str>| seen.push((event.attempt, *event.error)),
/// )
/// .await;
///
/// assert_eq!(result, Err("offline"));
/// assert_eq!(seen, vec![(1, "offline"), (2, "offline")]);
/// # });
/// ```
pub async fn retry_with_hooks<T, E, F, Fut, H>(
    policy: &RetryPolicy,
    operation: F,
    on_retry: H,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: FnMut(&RetryEvent<'_, E>),
{
    without_cancellation(attempt_loop(policy, operation, on_retry, |_| {}, None).await)
}

/// Retry until success, exhaustion, or `token` is cancelled.
///
/// The token is checked before every attempt and raced against both the
/// in-flight attempt and the backoff sleep. A cancelled attempt's future is
/// dropped.
pub async fn retry_until_cancelled<T, E, F, Fut, H>(
    policy: &RetryPolicy,
    operation: F,
    on_retry: H,
    token: &CancellationToken,
) -> Result<T, Interrupted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: FnMut(&RetryEvent<'_, E>),
{
    attempt_loop(policy, operation, on_retry, |_| {}, Some(token)).await
}

/// Bound a single attempt by a deadline.
///
/// Wrap the future an operation returns to make slow attempts fail with
/// [`TimeoutError::Timeout`]; the retry loop treats that like any other
/// failure.
pub async fn with_timeout<T, E, Fut>(duration: Duration, future: Fut) -> Result<T, TimeoutError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TimeoutError::Inner(e)),
        Err(_) => Err(TimeoutError::Timeout { duration }),
    }
}

impl RetryPolicy {
    /// Run `operation` under this policy. Same as [`retry`].
    ///
    /// ```rust
    /// use growth_retry::RetryPolicy;
    ///
    /// # tokio_test::block_on(async {
    /// let value = RetryPolicy::default()
    ///     .execute(|| async { Ok::<_, String>("ready") })
    ///     .await;
    /// assert_eq!(value, Ok("ready"));
    /// # });
    /// ```
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        retry(self, operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test(start_paused = true)]
    async fn test_progress_sequence() {
        let policy = RetryPolicy::linear(Duration::from_millis(10)).with_max_retries(2);
        let mut calls = 0;
        let mut seen = Vec::new();

        let result = attempt_loop(
            &policy,
            || {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Err("again")
                    } else {
                        Ok(n)
                    }
                }
            },
            |_| {},
            |p| seen.push(p),
            None,
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(
            seen,
            vec![
                Progress::Attempting { attempt: 0 },
                Progress::Delaying {
                    attempt: 0,
                    delay: Duration::from_millis(10)
                },
                Progress::Attempting { attempt: 1 },
                Progress::Delaying {
                    attempt: 1,
                    delay: Duration::from_millis(20)
                },
                Progress::Attempting { attempt: 2 },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_reports_delay_and_elapsed() {
        let policy = RetryPolicy::exponential(Duration::from_millis(100)).with_max_retries(2);
        let mut events = Vec::new();

        let result: Result<(), String> = retry_with_hooks(
            &policy,
            || async { Err("down".to_string()) },
            |event: &RetryEvent<'_, String>| {
                events.push((event.attempt, event.next_delay, event.elapsed));
            },
        )
        .await;

        assert_eq!(result, Err("down".to_string()));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, 1);
        assert_eq!(events[0].1, Duration::from_millis(100));
        assert_eq!(events[1].0, 2);
        assert_eq!(events[1].1, Duration::from_millis(200));
        assert!(events[1].2 >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_execute_method_matches_retry() {
        let policy = RetryPolicy::default().with_max_retries(0);
        let result: Result<i32, &str> = policy.execute(|| async { Err("nope") }).await;
        assert_eq!(result, Err("nope"));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through() {
        let ok = with_timeout(Duration::from_secs(1), async { Ok::<_, String>(42) }).await;
        assert_eq!(ok, Ok(42));

        let inner = with_timeout(Duration::from_secs(1), async {
            Err::<i32, _>("inner error".to_string())
        })
        .await;
        assert!(matches!(inner, Err(TimeoutError::Inner(e)) if e == "inner error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, String>(42)
        })
        .await;
        assert_eq!(
            result,
            Err(TimeoutError::Timeout {
                duration: Duration::from_millis(10)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_attempts_are_retried() {
        let policy = RetryPolicy::linear(Duration::from_millis(1)).with_max_retries(5);
        let mut calls = 0u32;

        let result = retry(&policy, || {
            calls += 1;
            let slow = calls < 3;
            with_timeout(Duration::from_millis(10), async move {
                if slow {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Ok::<_, String>("success")
            })
        })
        .await;

        assert_eq!(result, Ok("success"));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_logs_retry_and_exhaustion() {
        let policy = RetryPolicy::linear(Duration::from_millis(5)).with_max_retries(1);
        let result: Result<(), &str> = retry(&policy, || async { Err("boom") }).await;

        assert_eq!(result, Err("boom"));
        assert!(logs_contain("attempt failed, retrying"));
        assert!(logs_contain("delay_ms=5"));
        assert!(logs_contain("retry attempts exhausted"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_logs_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result = retry_until_cancelled(
            &RetryPolicy::default(),
            || async { Ok::<_, String>(()) },
            |_| {},
            &token,
        )
        .await;

        assert!(matches!(result, Err(Interrupted::Cancelled { attempts: 0, .. })));
        assert!(logs_contain("retry cancelled"));
    }
}
