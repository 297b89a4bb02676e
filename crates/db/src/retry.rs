//! Bounded retry for operations that lose a write-lock race.
//!
//! Contention shows up as a transient "busy" or "locked" error. The whole
//! operation, transaction included, is re-run after an exponential backoff
//! with jitter; once the budget is spent the caller gets a busy error.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use sea_orm::{DbErr, RuntimeErr};
use tally_shared::config::RetryConfig;
use tracing::warn;

/// `SQLITE_BUSY` primary result code.
const SQLITE_BUSY: i32 = 5;
/// `SQLITE_LOCKED` primary result code.
const SQLITE_LOCKED: i32 = 6;

/// Postgres serialization failure, deadlock, and lock-not-available codes.
const PG_TRANSIENT_CODES: [&str; 3] = ["40001", "40P01", "55P03"];

/// Length of a Postgres SQLSTATE. SQLite extended codes are at most four digits.
const SQLSTATE_LEN: usize = 5;

/// Returns true if the error means another writer held the lock.
#[must_use]
pub fn is_transient(err: &DbErr) -> bool {
    let runtime = match err {
        DbErr::ConnectionAcquire(_) => return true,
        DbErr::Conn(e) | DbErr::Exec(e) | DbErr::Query(e) => e,
        _ => return false,
    };
    let RuntimeErr::SqlxError(sqlx::Error::Database(db_err)) = runtime else {
        return false;
    };
    db_err.code().is_some_and(|code| is_transient_code(&code))
}

fn is_transient_code(code: &str) -> bool {
    // Postgres SQLSTATEs are always five characters, some of them all digits.
    if code.len() == SQLSTATE_LEN {
        return PG_TRANSIENT_CODES.contains(&code);
    }
    // SQLite reports extended codes; the low byte is the primary code.
    code.parse::<i32>()
        .is_ok_and(|extended| matches!(extended & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

/// Errors that can tell a lost lock race apart from a real failure.
pub trait Transient: Sized {
    /// Returns true if re-running the operation may succeed.
    fn is_transient(&self) -> bool;

    /// Converts a transient error into the "still busy" error returned once
    /// the retry budget is spent.
    #[must_use]
    fn exhausted(self, attempts: usize) -> Self;
}

/// Backoff budget for contended writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
    min_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_retries: usize, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            min_delay,
            max_delay,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Number of retries after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
            .build()
    }

    /// Runs `operation`, re-running it while it fails transiently.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient error, or the exhausted form of the
    /// last transient error once the budget is spent.
    pub async fn run<T, E, F, Fut>(&self, name: &'static str, mut operation: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut delays = self.backoff();
        let mut attempts = 0_usize;

        loop {
            attempts += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err),
            };

            let Some(delay) = delays.next() else {
                warn!(operation = name, attempts, error = %err, "Retry budget exhausted");
                return Err(err.exhausted(attempts));
            };
            warn!(
                operation = name,
                attempts,
                backoff_ms = %delay.as_millis(),
                error = %err,
                "Write lock contended, retrying after backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }
}
