//! Error types for retry operations.

use std::fmt;
use std::time::Duration;

/// Uniform, display-preserving representation of an operation failure.
///
/// Operations may fail with any error type. Observable state stores the
/// failure as a `Failure`, keeping the original textual form verbatim so
/// presentation layers can render it without knowing the concrete type.
///
/// # Examples
///
/// ```rust
/// use growth_retry::Failure;
///
/// let failure = Failure::from_display(&std::io::Error::other("connection reset"));
/// assert_eq!(failure.message(), "connection reset");
///
/// let failure: Failure = "boom".into();
/// assert_eq!(failure.to_string(), "boom");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Failure {
    message: String,
}

impl Failure {
    /// Create a failure from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Normalize any displayable error, keeping its text.
    pub fn from_display<E: fmt::Display + ?Sized>(error: &E) -> Self {
        Self {
            message: error.to_string(),
        }
    }

    /// The failure's text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Extract the message, discarding the wrapper.
    pub fn into_message(self) -> String {
        self.message
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Failure {}

/// Error returned when a single attempt exceeds its deadline.
///
/// Can wrap either a timeout or an inner error from the attempt.
///
/// # Examples
///
/// ```rust
/// use growth_retry::{with_timeout, TimeoutError};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let result = with_timeout(Duration::from_millis(10), async {
///     tokio::time::sleep(Duration::from_secs(10)).await;
///     Ok::<_, String>(42)
/// })
/// .await;
///
/// match result {
///     Err(TimeoutError::Timeout { duration }) => {
///         assert_eq!(duration, Duration::from_millis(10));
///     }
///     _ => panic!("Expected timeout"),
/// }
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutError<E> {
    /// The attempt timed out.
    Timeout {
        /// The timeout duration that was exceeded.
        duration: Duration,
    },
    /// An inner error occurred before timeout.
    Inner(E),
}

impl<E> TimeoutError<E> {
    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create an inner error.
    pub fn inner(error: E) -> Self {
        Self::Inner(error)
    }

    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if this is an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Get the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Timeout { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for TimeoutError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { duration } => write!(f, "attempt timed out after {:?}", duration),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TimeoutError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Timeout { .. } => None,
            Self::Inner(e) => Some(e),
        }
    }
}

/// Outcome of a cancellable retry that did not succeed.
///
/// # Examples
///
/// ```rust
/// use growth_retry::{retry_until_cancelled, Interrupted, RetryPolicy};
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let token = CancellationToken::new();
/// token.cancel();
///
/// let result = retry_until_cancelled(
///     &RetryPolicy::default(),
///     || async { Ok::<_, String>(1) },
///     |_| {},
///     &token,
/// )
/// .await;
///
/// assert_eq!(
///     result,
///     Err(Interrupted::Cancelled { attempts: 0, last_error: None })
/// );
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupted<E> {
    /// The token fired before the execution finished.
    Cancelled {
        /// Number of attempts that were started.
        attempts: u32,
        /// The most recent failure, if any attempt completed with one.
        last_error: Option<E>,
    },
    /// Attempts were exhausted; carries the final error unchanged.
    Failed(E),
}

impl<E> Interrupted<E> {
    /// Returns true if the execution was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The most recent operation error, whichever way the execution ended.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Cancelled { last_error, .. } => last_error.as_ref(),
            Self::Failed(e) => Some(e),
        }
    }

    /// Extract the most recent operation error.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Cancelled { last_error, .. } => last_error,
            Self::Failed(e) => Some(e),
        }
    }
}

impl<E: fmt::Display> fmt::Display for Interrupted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled {
                attempts,
                last_error: Some(e),
            } => write!(f, "retry cancelled after {} attempts: {}", attempts, e),
            Self::Cancelled {
                attempts,
                last_error: None,
            } => write!(f, "retry cancelled after {} attempts", attempts),
            Self::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Interrupted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Cancelled { last_error, .. } => {
                last_error.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
            }
            Self::Failed(e) => Some(e),
        }
    }
}
