//! Retry policy types and configuration.

use std::fmt;
use std::time::Duration;

/// Default number of retries beyond the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn whole_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// A retry policy describing how to retry failed operations.
///
/// Policies are pure data. They describe retry behavior but don't execute it,
/// which makes them easy to test, clone, and load from configuration.
///
/// # Examples
///
/// ```rust
/// use growth_retry::{Backoff, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_retries(), 3);
/// assert_eq!(policy.base_delay(), Duration::from_millis(1000));
/// assert_eq!(policy.backoff(), Backoff::Exponential);
///
/// let policy = RetryPolicy::linear(Duration::from_millis(250)).with_max_retries(5);
/// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(750)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    backoff: Backoff,
    max_delay: Option<Duration>,
    jitter: JitterStrategy,
}

/// The shape of the delay curve between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Backoff {
    /// Delay grows linearly: base * (attempt + 1).
    Linear,
    /// Delay doubles: base * 2^attempt.
    #[default]
    Exponential,
}

/// Strategy for adding randomness to delays.
///
/// Randomization requires the `jitter` feature. Without it every strategy
/// returns the computed delay unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum JitterStrategy {
    /// No jitter applied.
    #[default]
    None,
    /// Add ±factor randomness to the delay.
    Proportional(f64),
    /// Random delay between 0 and the computed delay.
    Full,
}

/// Information about a failed attempt, passed to `on_retry` observers.
///
/// Observers only see failures that will be retried. The final failure is
/// returned to the caller instead.
#[derive(Debug, Clone)]
pub struct RetryEvent<'a, E> {
    /// The attempt about to run (1-indexed, so the first retry is `1`).
    pub attempt: u32,
    /// The error from the attempt that just failed.
    pub error: &'a E,
    /// Delay before the next attempt starts.
    pub next_delay: Duration,
    /// Total elapsed time since the first attempt.
    pub elapsed: Duration,
}

/// Reason a [`RetryPolicy`] was rejected by [`RetryPolicy::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// `max_delay` is below a non-zero `base_delay`, so every delay is capped.
    MaxDelayBelowBase {
        /// The configured base delay.
        base_delay: Duration,
        /// The configured cap.
        max_delay: Duration,
    },
    /// A proportional jitter factor outside `0.0..=1.0`.
    InvalidJitterFactor(f64),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxDelayBelowBase {
                base_delay,
                max_delay,
            } => write!(
                f,
                "max_delay {:?} is below base_delay {:?}",
                max_delay, base_delay
            ),
            Self::InvalidJitterFactor(factor) => {
                write!(f, "jitter factor {} is outside 0.0..=1.0", factor)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

impl Default for RetryPolicy {
    /// Three retries, one second base delay, exponential backoff.
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            backoff: Backoff::Exponential,
            max_delay: None,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with linearly increasing delay and the default retry count.
    ///
    /// Delay = base * (attempt + 1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use growth_retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::linear(Duration::from_millis(100));
    ///
    /// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(200)));
    /// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(300)));
    /// assert_eq!(policy.delay_for_attempt(3), None);
    /// ```
    pub fn linear(base: Duration) -> Self {
        Self {
            base_delay: base,
            backoff: Backoff::Linear,
            ..Self::default()
        }
    }

    /// Create a policy with exponentially increasing delay and the default retry count.
    ///
    /// Delay = base * 2^attempt
    ///
    /// # Examples
    ///
    /// ```rust
    /// use growth_retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(Duration::from_millis(100));
    ///
    /// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(200)));
    /// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(400)));
    /// ```
    pub fn exponential(base: Duration) -> Self {
        Self {
            base_delay: base,
            backoff: Backoff::Exponential,
            ..Self::default()
        }
    }

    /// Set the maximum number of retry attempts.
    ///
    /// This does not include the initial attempt. `with_max_retries(3)` means
    /// up to 4 total invocations, and `with_max_retries(0)` means exactly one.
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the base delay the backoff curve is scaled by.
    pub fn with_base_delay(mut self, base: Duration) -> Self {
        self.base_delay = base;
        self
    }

    /// Set the backoff shape.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Cap every computed delay at `d`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use growth_retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(Duration::from_millis(100))
    ///     .with_max_retries(10)
    ///     .with_max_delay(Duration::from_millis(500));
    ///
    /// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(400)));
    /// assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(500)));
    /// ```
    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = Some(d);
        self
    }

    /// Add proportional jitter to delays.
    ///
    /// `0.25` means the actual delay lands within ±25% of the computed one.
    /// The factor is clamped to `0.0..=1.0`, and NaN counts as `0.0`.
    ///
    /// **Note**: Requires the `jitter` feature. Without it, delays are exact.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        let factor = if factor.is_nan() {
            0.0
        } else {
            factor.clamp(0.0, 1.0)
        };
        self.jitter = JitterStrategy::Proportional(factor);
        self
    }

    /// Use full jitter: a random delay between 0 and the computed delay.
    ///
    /// **Note**: Requires the `jitter` feature. Without it, delays are exact.
    pub fn with_full_jitter(mut self) -> Self {
        self.jitter = JitterStrategy::Full;
        self
    }

    /// Get the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the base delay.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Get the backoff shape.
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Get the maximum delay cap.
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Get the jitter strategy.
    pub fn jitter(&self) -> &JitterStrategy {
        &self.jitter
    }

    /// Total number of invocations the policy allows (first try plus retries).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate the delay that follows a failure of attempt N (0-indexed).
    ///
    /// Returns `None` when attempt N is the last one and no retry follows.
    /// The result ignores jitter and is deterministic.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use growth_retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(Duration::from_millis(1000))
    ///     .with_max_retries(2);
    ///
    /// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(1000)));
    /// assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(2000)));
    /// assert_eq!(policy.delay_for_attempt(2), None);
    /// ```
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }

        let delay = match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt.saturating_add(1)),
            Backoff::Exponential => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
        };

        Some(self.cap(delay))
    }

    /// Calculate the delay with jitter applied.
    ///
    /// This is what the executor actually sleeps for.
    pub(crate) fn delay_with_jitter(&self, attempt: u32) -> Option<Duration> {
        let delay = self.delay_for_attempt(attempt)?;
        Some(self.cap(self.jitter.apply(delay)))
    }

    fn cap(&self, delay: Duration) -> Duration {
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Check the policy for settings that are almost certainly mistakes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use growth_retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(Duration::from_secs(2))
    ///     .with_max_delay(Duration::from_secs(1));
    /// assert!(policy.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), PolicyError> {
        if let Some(max_delay) = self.max_delay {
            if !self.base_delay.is_zero() && max_delay < self.base_delay {
                return Err(PolicyError::MaxDelayBelowBase {
                    base_delay: self.base_delay,
                    max_delay,
                });
            }
        }
        if let JitterStrategy::Proportional(factor) = self.jitter {
            if !(0.0..=1.0).contains(&factor) {
                return Err(PolicyError::InvalidJitterFactor(factor));
            }
        }
        Ok(())
    }
}

impl JitterStrategy {
    /// Apply jitter to a computed delay.
    ///
    /// A proportional factor that leaves no usable range, NaN included,
    /// returns the delay unchanged.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterStrategy::None => delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Proportional(factor) => {
                use rand::Rng;
                let millis = whole_millis(delay) as f64;
                let range = millis * factor;
                let min = (millis - range).max(0.0);
                let max = millis + range;
                if !max.is_finite() || max <= min {
                    delay
                } else {
                    Duration::from_millis(rand::rng().random_range(min..=max) as u64)
                }
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Proportional(_) => delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Full => {
                use rand::Rng;
                let max = whole_millis(delay);
                if max == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::rng().random_range(0..=max))
                }
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Full => delay,
        }
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    //! Config-file shape: `{"max_retries": 3, "base_delay_ms": 1000,
    //! "backoff": "exponential", "max_delay_ms": null, "jitter": "none"}`,
    //! every field optional. Delays are whole milliseconds, so sub-millisecond
    //! precision does not survive serialization.

    use super::{
        whole_millis, Backoff, JitterStrategy, RetryPolicy, DEFAULT_BASE_DELAY,
        DEFAULT_MAX_RETRIES,
    };
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    #[serde(default, deny_unknown_fields)]
    struct PolicyConfig {
        max_retries: u32,
        base_delay_ms: u64,
        backoff: Backoff,
        max_delay_ms: Option<u64>,
        jitter: JitterStrategy,
    }

    impl Default for PolicyConfig {
        fn default() -> Self {
            Self {
                max_retries: DEFAULT_MAX_RETRIES,
                base_delay_ms: whole_millis(DEFAULT_BASE_DELAY),
                backoff: Backoff::default(),
                max_delay_ms: None,
                jitter: JitterStrategy::None,
            }
        }
    }

    impl Serialize for RetryPolicy {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            PolicyConfig {
                max_retries: self.max_retries,
                base_delay_ms: whole_millis(self.base_delay),
                backoff: self.backoff,
                max_delay_ms: self.max_delay.map(whole_millis),
                jitter: self.jitter.clone(),
            }
            .serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for RetryPolicy {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let config = PolicyConfig::deserialize(deserializer)?;
            let policy = RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.base_delay_ms),
                backoff: config.backoff,
                max_delay: config.max_delay_ms.map(Duration::from_millis),
                jitter: config.jitter,
            };
            policy.validate().map_err(serde::de::Error::custom)?;
            Ok(policy)
        }
    }
}

#[cfg(feature = "proptest")]
mod arbitrary {
    use super::{Backoff, RetryPolicy};
    use proptest::prelude::*;
    use std::time::Duration;

    impl Arbitrary for Backoff {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
            prop_oneof![Just(Backoff::Linear), Just(Backoff::Exponential)].boxed()
        }
    }

    impl Arbitrary for RetryPolicy {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        /// Small bounds keep generated executions cheap under a paused clock.
        fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
            (0u32..8, 0u64..5_000, any::<Backoff>())
                .prop_map(|(max_retries, base_ms, backoff)| {
                    RetryPolicy::default()
                        .with_max_retries(max_retries)
                        .with_base_delay(Duration::from_millis(base_ms))
                        .with_backoff(backoff)
                })
                .boxed()
        }
    }
}

#[cfg(test)]
mod policy_tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.base_delay(), Duration::from_millis(1000));
        assert_eq!(policy.backoff(), Backoff::Exponential);
        assert_eq!(policy.max_delay(), None);
        assert_eq!(policy.jitter(), &JitterStrategy::None);
    }

    #[test]
    fn test_linear_delay() {
        let policy = RetryPolicy::linear(Duration::from_millis(100)).with_max_retries(5);

        assert_eq!(
            policy.delay_for_attempt(0),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            policy.delay_for_attempt(1),
            Some(Duration::from_millis(200))
        );
        assert_eq!(
            policy.delay_for_attempt(2),
            Some(Duration::from_millis(300))
        );
        assert_eq!(
            policy.delay_for_attempt(4),
            Some(Duration::from_millis(500))
        );
        assert_eq!(policy.delay_for_attempt(5), None);
    }

    #[test]
    fn test_exponential_delay() {
        let policy = RetryPolicy::exponential(Duration::from_millis(1000)).with_max_retries(4);

        assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_secs(8)));
        assert_eq!(policy.delay_for_attempt(4), None);
    }

    #[test]
    fn test_zero_retries_never_delays() {
        let policy = RetryPolicy::default().with_max_retries(0);
        assert_eq!(policy.delay_for_attempt(0), None);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_exponential_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::exponential(Duration::from_secs(1)).with_max_retries(u32::MAX);
        let delay = policy.delay_for_attempt(200);
        assert!(delay.is_some());
        assert!(delay >= policy.delay_for_attempt(40));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy::linear(Duration::from_millis(100))
            .with_max_retries(10)
            .with_max_delay(Duration::from_millis(250));

        assert_eq!(
            policy.delay_for_attempt(1),
            Some(Duration::from_millis(200))
        );
        assert_eq!(
            policy.delay_for_attempt(2),
            Some(Duration::from_millis(250))
        ); // capped
        assert_eq!(
            policy.delay_for_attempt(9),
            Some(Duration::from_millis(250))
        ); // capped
    }

    #[test]
    fn test_builders_override_defaults() {
        let policy = RetryPolicy::default()
            .with_max_retries(7)
            .with_base_delay(Duration::from_millis(50))
            .with_backoff(Backoff::Linear);

        assert_eq!(policy, RetryPolicy::linear(Duration::from_millis(50)).with_max_retries(7));
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::default()
            .with_base_delay(Duration::ZERO)
            .with_max_delay(Duration::ZERO)
            .validate()
            .is_ok());

        let err = RetryPolicy::exponential(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(1))
            .validate()
            .unwrap_err();
        assert!(matches!(err, PolicyError::MaxDelayBelowBase { .. }));
        assert!(err.to_string().contains("below base_delay"));
    }

    #[test]
    fn test_jitter_factor_is_clamped() {
        let policy = RetryPolicy::default().with_jitter(4.0);
        assert_eq!(policy.jitter(), &JitterStrategy::Proportional(1.0));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_nan_jitter_factor_becomes_zero() {
        let policy = RetryPolicy::default().with_jitter(f64::NAN);
        assert_eq!(policy.jitter(), &JitterStrategy::Proportional(0.0));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_whole_millis_saturates() {
        assert_eq!(whole_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(whole_millis(Duration::from_micros(2_999)), 2);
        assert_eq!(whole_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_jitter_none_returns_delay() {
        let delay = Duration::from_millis(100);
        assert_eq!(JitterStrategy::None.apply(delay), delay);
    }

    #[cfg(not(feature = "jitter"))]
    #[test]
    fn test_jitter_is_inert_without_feature() {
        let policy = RetryPolicy::exponential(Duration::from_millis(100)).with_full_jitter();
        assert_eq!(
            policy.delay_with_jitter(1),
            Some(Duration::from_millis(200))
        );
    }

    #[cfg(feature = "jitter")]
    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::exponential(Duration::from_millis(100))
            .with_max_retries(5)
            .with_jitter(0.25);

        for _ in 0..100 {
            let delay = policy.delay_with_jitter(1).unwrap();
            assert!(delay >= Duration::from_millis(150));
            assert!(delay <= Duration::from_millis(250));
        }

        let full = RetryPolicy::exponential(Duration::from_millis(100)).with_full_jitter();
        for _ in 0..100 {
            assert!(full.delay_with_jitter(2).unwrap() <= Duration::from_millis(400));
        }
    }

    #[cfg(feature = "jitter")]
    #[test]
    fn test_unusable_jitter_factor_leaves_delay_unchanged() {
        let delay = Duration::from_millis(100);

        assert_eq!(JitterStrategy::Proportional(f64::NAN).apply(delay), delay);
        assert_eq!(JitterStrategy::Proportional(-0.5).apply(delay), delay);
        assert_eq!(JitterStrategy::Proportional(0.0).apply(delay), delay);
    }

    #[cfg(feature = "jitter")]
    #[test]
    fn test_full_jitter_on_saturated_delay_stays_large() {
        let policy = RetryPolicy::exponential(Duration::MAX / 2).with_full_jitter();
        let samples: Vec<Duration> = (0..32)
            .map(|_| policy.delay_with_jitter(2).unwrap())
            .collect();

        // drawn from the whole u64 millisecond range
        assert!(samples.iter().any(|d| *d > Duration::from_secs(86_400)));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_policy_from_config() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_retries": 2, "base_delay_ms": 250, "backoff": "linear"}"#)
                .unwrap();
        assert_eq!(policy, RetryPolicy::linear(Duration::from_millis(250)).with_max_retries(2));

        let defaults: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, RetryPolicy::default());

        let json = serde_json::to_value(&RetryPolicy::default()).unwrap();
        assert_eq!(json["backoff"], "exponential");
        assert_eq!(json["base_delay_ms"], 1000);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_policy_config_rejects_invalid() {
        let result: Result<RetryPolicy, _> =
            serde_json::from_str(r#"{"base_delay_ms": 2000, "max_delay_ms": 10}"#);
        assert!(result.is_err());

        let result: Result<RetryPolicy, _> = serde_json::from_str(r#"{"backoff": "fibonacci"}"#);
        assert!(result.is_err());

        let result: Result<RetryPolicy, _> =
            serde_json::from_str(r#"{"jitter": {"proportional": 3.0}}"#);
        assert!(result.is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_jittered_policy_survives_config_round_trip() {
        let policy = RetryPolicy::linear(Duration::from_millis(200))
            .with_max_retries(4)
            .with_max_delay(Duration::from_millis(500))
            .with_jitter(0.25);

        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["jitter"]["proportional"], 0.25);
        assert_eq!(serde_json::from_value::<RetryPolicy>(json).unwrap(), policy);

        let full: RetryPolicy = serde_json::from_str(r#"{"jitter": "full"}"#).unwrap();
        assert_eq!(full.jitter(), &JitterStrategy::Full);
    }
}
