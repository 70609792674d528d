//! Testing utilities for code that retries.
//!
//! This module provides a scripted [`FlakyOperation`] that replays a fixed
//! sequence of outcomes and counts its invocations, plus assertion macros for
//! retry results.
//!
//! # Examples
//!
//! ```rust
//! use growth_retry::testing::FlakyOperation;
//! use growth_retry::{assert_retried, assert_recovered, retry, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let op = FlakyOperation::failing_then(2, "timeout", 42);
//! let policy = RetryPolicy::linear(Duration::from_millis(1)).with_max_retries(3);
//!
//! let result = retry(&policy, || op.invoke()).await;
//!
//! assert_recovered!(result, 42);
//! assert_retried!(op, 3);
//! # });
//! ```

use std::future::{ready, Ready};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// An operation that replays scripted outcomes.
///
/// Invocation `i` returns the `i`-th outcome; once the script is used up, the
/// last outcome repeats forever. Clones share the invocation counter, so a
/// clone can be moved into a spawned task while the original is inspected.
///
/// # Example
///
/// ```rust
/// use growth_retry::testing::FlakyOperation;
///
/// # tokio_test::block_on(async {
/// let op = FlakyOperation::new([Err("e0"), Err("e1"), Ok(7)]);
///
/// assert_eq!(op.invoke().await, Err("e0"));
/// assert_eq!(op.invoke().await, Err("e1"));
/// assert_eq!(op.invoke().await, Ok(7));
/// assert_eq!(op.invoke().await, Ok(7));
/// assert_eq!(op.calls(), 4);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct FlakyOperation<T, E> {
    script: Arc<[Result<T, E>]>,
    calls: Arc<AtomicU32>,
}

impl<T: Clone, E: Clone> FlakyOperation<T, E> {
    /// Create an operation from a script of outcomes.
    ///
    /// # Panics
    ///
    /// Panics if the script is empty.
    pub fn new(script: impl IntoIterator<Item = Result<T, E>>) -> Self {
        let script: Arc<[Result<T, E>]> = script.into_iter().collect();
        assert!(!script.is_empty(), "FlakyOperation needs at least one outcome");
        Self {
            script,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fail `failures` times with `error`, then succeed with `value` forever.
    pub fn failing_then(failures: u32, error: E, value: T) -> Self {
        Self::new(
            std::iter::repeat_n(Err(error), failures as usize).chain(std::iter::once(Ok(value))),
        )
    }

    /// Fail on every invocation.
    pub fn always_failing(error: E) -> Self {
        Self::new([Err(error)])
    }

    /// Succeed on every invocation.
    pub fn always_succeeding(value: T) -> Self {
        Self::new([Ok(value)])
    }

    /// Invoke the operation once.
    pub fn invoke(&self) -> Ready<Result<T, E>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        let index = n.min(self.script.len() - 1);
        ready(self.script[index].clone())
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Assert that an operation was invoked exactly `n` times.
///
/// # Example
///
/// ```rust
/// use growth_retry::assert_retried;
/// use growth_retry::testing::FlakyOperation;
///
/// let op = FlakyOperation::<(), _>::always_failing("x");
/// let _ = op.invoke();
/// assert_retried!(op, 1);
/// ```
#[macro_export]
macro_rules! assert_retried {
    ($operation:expr, $expected:expr) => {
        let calls = $operation.calls();
        assert_eq!(
            calls, $expected,
            "Expected {} invocations, got {}",
            $expected, calls
        );
    };
}

/// Assert that a retry result succeeded with the expected value.
///
/// # Example
///
/// ```rust
/// use growth_retry::assert_recovered;
///
/// let result: Result<i32, String> = Ok(42);
/// assert_recovered!(result, 42);
/// ```
#[macro_export]
macro_rules! assert_recovered {
    ($result:expr, $expected:expr) => {
        match $result {
            Ok(value) => assert_eq!(value, $expected),
            Err(e) => {
                panic!("Expected recovery, got Err: {:?}", e);
            }
        }
    };
}

/// Assert that a retry result failed with the expected final error.
///
/// # Example
///
/// ```rust
/// use growth_retry::assert_exhausted;
///
/// let result: Result<i32, &str> = Err("boom");
/// assert_exhausted!(result, "boom");
/// ```
#[macro_export]
macro_rules! assert_exhausted {
    ($result:expr, $expected:expr) => {
        match $result {
            Err(error) => assert_eq!(error, $expected),
            Ok(v) => {
                panic!(
                    "Expected exhausted retries with {:?}, got Ok: {:?}",
                    $expected, v
                );
            }
        }
    };
}
