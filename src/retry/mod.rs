//! Retry with backoff for fallible async operations.
//!
//! - **Pure policy**: [`RetryPolicy`] is plain data and [`RetryPolicy::delay_for_attempt`]
//!   is a pure function, so backoff curves are testable without running anything
//! - **One loop**: the stand-alone functions, [`RetryTracker`], and the cancellable
//!   variants all share one attempt loop
//! - **Verbatim errors**: the final attempt's error is returned as-is; earlier
//!   failures are only visible to `on_retry` observers
//!
//! # Quick Start
//!
//! ```rust
//! use growth_retry::{retry, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::exponential(Duration::from_millis(100))
//!     .with_max_retries(3);
//!
//! let value = retry(&policy, || async { Ok::<_, String>(42) }).await;
//! assert_eq!(value, Ok(42));
//! # });
//! ```
//!
//! # Backoff
//!
//! - **Linear**: `base * (attempt + 1)` (100ms, 200ms, 300ms, ...)
//! - **Exponential**: `base * 2^attempt` (100ms, 200ms, 400ms, ...)
//!
//! An optional `max_delay` caps either curve. Jitter is available behind the
//! `jitter` feature.
//!
//! # Error Types
//!
//! - [`Failure`]: normalized error text stored in [`RetryState`]
//! - [`Interrupted`]: outcome of a cancellable retry that did not succeed
//! - [`TimeoutError`]: returned by [`with_timeout`] when an attempt overruns

mod error;
pub(crate) mod executor;
mod policy;
mod state;

pub use error::{Failure, Interrupted, TimeoutError};
pub use executor::{retry, retry_until_cancelled, retry_with_hooks, with_timeout};
pub use policy::{
    Backoff, JitterStrategy, PolicyError, RetryEvent, RetryPolicy, DEFAULT_BASE_DELAY,
    DEFAULT_MAX_RETRIES,
};
pub use state::{RetryPhase, RetryState, RetryTracker};
