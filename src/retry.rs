//! Retry policies for handling transient failures.
//!
//! A [`RetryPolicy`] answers three questions for the request executor: may this
//! attempt be retried, how long to wait first, and how many retries are allowed
//! at most. Policies are pure functions of their inputs so retry behavior is
//! fully determined by the attempt index and the outcome.

use crate::Error;
use http::StatusCode;
use rand::Rng;
use std::time::Duration;

/// What a single attempt produced, as seen by a [`RetryPolicy`].
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// The exchange failed below HTTP (connection refused, timeout, ...).
    Transport(&'a Error),
    /// The exchange completed with this status.
    Status(StatusCode),
}

impl Outcome<'_> {
    /// Returns `true` for outcomes the default predicate treats as transient:
    /// transport failures, 5xx statuses and 401.
    pub fn is_transient(&self) -> bool {
        match self {
            Outcome::Transport(_) => true,
            Outcome::Status(status) => {
                status.is_server_error() || *status == StatusCode::UNAUTHORIZED
            }
        }
    }
}

/// Decides whether and when a failed attempt is retried.
///
/// `attempt` is zero-based: the first try is attempt `0`, so a policy with
/// `max_retries() == 3` allows up to four tries in total.
///
/// # Examples
///
/// ```
/// use ecloud::retry::{Outcome, RetryPolicy};
/// use std::time::Duration;
///
/// /// Retries only 503 responses, twice, one second apart.
/// struct RetryOn503;
///
/// impl RetryPolicy for RetryOn503 {
///     fn should_retry(&self, attempt: usize, outcome: Outcome<'_>) -> bool {
///         attempt < self.max_retries()
///             && matches!(outcome, Outcome::Status(s) if s.as_u16() == 503)
///     }
///
///     fn backoff(&self, _attempt: usize) -> Duration {
///         Duration::from_secs(1)
///     }
///
///     fn max_retries(&self) -> usize {
///         2
///     }
/// }
/// ```
pub trait RetryPolicy: Send + Sync {
    /// Returns `true` if the attempt that produced `outcome` may be retried.
    fn should_retry(&self, attempt: usize, outcome: Outcome<'_>) -> bool;

    /// Returns the delay to wait after `attempt` before trying again.
    fn backoff(&self, attempt: usize) -> Duration;

    /// Returns the maximum number of retries after the first attempt.
    fn max_retries(&self) -> usize;
}

/// The default policy: quadratic backoff, retrying transport failures, 5xx
/// responses and 401 responses.
///
/// Backoff is `attempt² × unit`, with a unit of one second by default:
/// attempt 0 waits 0s, attempt 1 waits 1s, attempt 2 waits 4s.
///
/// # Examples
///
/// ```
/// use ecloud::retry::{DefaultRetryPolicy, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = DefaultRetryPolicy::new(3);
/// assert_eq!(policy.backoff(0), Duration::ZERO);
/// assert_eq!(policy.backoff(2), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DefaultRetryPolicy {
    max_retries: usize,
    unit: Duration,
}

impl DefaultRetryPolicy {
    /// Creates a policy allowing `max_retries` retries with a one second unit.
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            unit: Duration::from_secs(1),
        }
    }

    /// Replaces the backoff unit. Mostly useful to keep tests fast.
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn should_retry(&self, attempt: usize, outcome: Outcome<'_>) -> bool {
        attempt < self.max_retries && outcome.is_transient()
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt.saturating_mul(attempt)).unwrap_or(u32::MAX);
        self.unit.saturating_mul(factor)
    }

    fn max_retries(&self) -> usize {
        self.max_retries
    }
}

/// Retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff {
    /// The delay between retry attempts.
    pub delay: Duration,
    /// The maximum number of retry attempts.
    pub max_retries: usize,
}

impl RetryPolicy for ConstantBackoff {
    fn should_retry(&self, attempt: usize, outcome: Outcome<'_>) -> bool {
        attempt < self.max_retries && outcome.is_transient()
    }

    fn backoff(&self, _attempt: usize) -> Duration {
        self.delay
    }

    fn max_retries(&self) -> usize {
        self.max_retries
    }
}

/// Retry with exponentially increasing delays.
///
/// Attempt `n` waits `initial_delay * 2^n`, capped at `max_delay`. With jitter
/// enabled the delay is scaled by a random factor between 50% and 100% so that
/// many clients failing together do not retry in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    /// The delay after the first attempt.
    pub initial_delay: Duration,
    /// The maximum delay between retries.
    pub max_delay: Duration,
    /// The maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl RetryPolicy for ExponentialBackoff {
    fn should_retry(&self, attempt: usize, outcome: Outcome<'_>) -> bool {
        attempt < self.max_retries && outcome.is_transient()
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let multiplier = 2u32.saturating_pow(u32::try_from(attempt).unwrap_or(u32::MAX));
        let delay = self
            .initial_delay
            .saturating_mul(multiplier)
            .min(self.max_delay);

        if self.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
            delay.mul_f64(jitter_factor)
        } else {
            delay
        }
    }

    fn max_retries(&self) -> usize {
        self.max_retries
    }
}
