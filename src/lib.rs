//! # growth-retry
//!
//! Retry with backoff for the Growth OS client.
//!
//! Network calls against the managed backend and third-party SDKs fail
//! transiently. This crate wraps any fallible async operation in a declarative
//! [`RetryPolicy`] and either returns its value or the error from the final
//! attempt.
//!
//! ## Quick Example
//!
//! ```rust
//! use growth_retry::{RetryPolicy, RetryTracker};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::linear(Duration::from_millis(5)).with_max_retries(2);
//!
//! // One-off call site: no observable state
//! let plan = policy.execute(|| async { Ok::<_, String>("pro") }).await;
//! assert_eq!(plan, Ok("pro"));
//!
//! // Progress-reporting call site
//! let mut tracker = RetryTracker::new();
//! let status = tracker
//!     .execute(&policy, || async { Ok::<_, String>("active") })
//!     .await;
//! assert_eq!(status, Ok("active"));
//! assert_eq!(tracker.state().data, Some("active"));
//! # });
//! ```
//!
//! ## Cargo features
//!
//! - `jitter`: randomize delays with `rand`
//! - `serde`: load [`RetryPolicy`] from configuration, serialize [`RetryState`]
//! - `proptest`: `Arbitrary` implementations for policies

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod retry;
pub mod testing;

// Re-exports
pub use retry::{
    retry, retry_until_cancelled, retry_with_hooks, with_timeout, Backoff, Failure, Interrupted,
    JitterStrategy, PolicyError, RetryEvent, RetryPhase, RetryPolicy, RetryState, RetryTracker,
    TimeoutError,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::retry::{
        retry, retry_with_hooks, Backoff, Failure, RetryEvent, RetryPolicy, RetryState,
        RetryTracker,
    };
}
