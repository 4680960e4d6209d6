//! Retry budgets and backoff delays for classified provider failures.
//!
//! [`RetryPolicy`] is a plain value handed to each orchestrator call, so
//! concurrent invocations never share retry settings. Randomness (label
//! shuffling and rate-limit jitter) comes from an injected [`Entropy`] source
//! that tests seed for determinism.

use std::future::Future;
use std::ops::RangeInclusive;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::failure::FailureKind;

/// Default number of attempts for a provider call.
pub const DEFAULT_MAX_TRIES: u32 = 5;

/// Jitter, in seconds, added on top of a provider `Retry-After` hint.
pub const RATE_LIMIT_JITTER_SECS: RangeInclusive<u64> = 2..=20;

/// Attempt budget plus exponential delay schedule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    max_tries: u32,
    ceiling: Option<Duration>,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_tries` attempts. A budget of zero is
    /// raised to one so every call is attempted at least once.
    #[must_use]
    pub const fn new(max_tries: u32) -> Self {
        Self {
            max_tries: if max_tries == 0 { 1 } else { max_tries },
            ceiling: None,
        }
    }

    /// Caps the exponential component of every delay.
    #[must_use]
    pub const fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    /// Total attempts allowed, including the first.
    #[must_use]
    pub const fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Exponential delay after the failed attempt with zero-based index
    /// `attempt`: 1 s, 2 s, 4 s, and so on.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let secs = 2_u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay = Duration::from_secs(secs);
        match self.ceiling {
            Some(ceiling) if delay > ceiling => ceiling,
            _ => delay,
        }
    }

    /// Delay for a rate-limited attempt: the exponential delay plus the
    /// provider hint plus `jitter`.
    #[must_use]
    pub fn rate_limited_delay(&self, attempt: u32, retry_after: Duration, jitter: Duration) -> Duration {
        self.next_delay(attempt)
            .saturating_add(retry_after)
            .saturating_add(jitter)
    }

    /// Delay to sleep before retrying after `kind`. Label conflicts retry
    /// immediately with a fresh label.
    #[must_use]
    pub fn delay_for(&self, kind: &FailureKind, attempt: u32, entropy: &Entropy) -> Duration {
        match kind {
            FailureKind::RateLimited { retry_after } => {
                self.rate_limited_delay(attempt, *retry_after, entropy.jitter())
            }
            FailureKind::LabelConflict => Duration::ZERO,
            _ => self.next_delay(attempt),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRIES)
    }
}

/// Per-call retry bookkeeping. Never shared between invocations.
#[derive(Clone, Debug)]
pub struct RetryContext {
    policy: RetryPolicy,
    attempts: u32,
    last_failure: Option<FailureKind>,
    slept: Duration,
}

impl RetryContext {
    /// Starts a fresh context for one orchestrator call.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            last_failure: None,
            slept: Duration::ZERO,
        }
    }

    /// Records the start of an attempt and returns its one-based number.
    pub const fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Returns `true` once the attempt budget is spent.
    #[must_use]
    pub const fn exhausted(&self) -> bool {
        self.attempts >= self.policy.max_tries()
    }

    /// Stores the classification of the latest failed attempt.
    pub fn record_failure(&mut self, kind: FailureKind) {
        self.last_failure = Some(kind);
    }

    /// Computes, records, and returns the sleep before the next attempt.
    pub fn backoff(&mut self, kind: &FailureKind, entropy: &Entropy) -> Duration {
        let delay = self
            .policy
            .delay_for(kind, self.attempts.saturating_sub(1), entropy);
        self.slept = self.slept.saturating_add(delay);
        delay
    }

    /// Attempts made so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Classification of the latest failure, if any.
    #[must_use]
    pub const fn last_failure(&self) -> Option<&FailureKind> {
        self.last_failure.as_ref()
    }

    /// Total backoff time accumulated by this context.
    #[must_use]
    pub const fn slept(&self) -> Duration {
        self.slept
    }
}

/// Injected random source for label order and jitter.
#[derive(Debug)]
pub struct Entropy {
    rng: Mutex<StdRng>,
}

impl Entropy {
    /// Seeds from the operating system.
    #[must_use]
    pub fn from_os() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic source for tests and reproducible runs.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Shuffles `items` in place with a uniform permutation.
    pub fn shuffle<T>(&self, items: &mut [T]) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        items.shuffle(&mut *rng);
    }

    /// Uniform jitter drawn from [`RATE_LIMIT_JITTER_SECS`].
    #[must_use]
    pub fn jitter(&self) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Duration::from_secs(rng.random_range(RATE_LIMIT_JITTER_SECS))
    }
}

impl Default for Entropy {
    fn default() -> Self {
        Self::from_os()
    }
}

/// Future returned by [`Sleeper::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Blocking wait used between retries and status polls.
pub trait Sleeper {
    /// Suspends the calling task for `duration`.
    fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// Sleeper backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}
