use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::SyncResult;

/// Per-request retry with constant backoff plus random jitter.
///
/// Jitter keeps many workers hitting the same failing endpoint from retrying
/// in lockstep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    pub backoff: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Delay before the next attempt.
    pub fn delay(&self) -> Duration {
        let max = self.max_jitter.as_micros() as u64;
        let jitter = if max == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max)
        };
        self.backoff + Duration::from_micros(jitter)
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// the retries are used up.
    pub fn run<T>(&self, operation: &str, mut attempt: impl FnMut() -> SyncResult<T>) -> SyncResult<T> {
        let mut retried = 0;
        loop {
            match attempt() {
                Err(err) if err.is_retryable() && retried < self.retries => {
                    retried += 1;
                    let delay = self.delay();
                    debug!(operation, retry = retried, error = %err, ?delay, "retrying");
                    thread::sleep(delay);
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(2),
            max_jitter: Duration::from_millis(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::cell::Cell;

    fn fast(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            backoff: Duration::from_micros(10),
            max_jitter: Duration::from_micros(10),
        }
    }

    #[test]
    fn retries_transport_errors_until_success() {
        let calls = Cell::new(0);
        let result = fast(3).run("put", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(SyncError::Transport("connection reset".into()))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_configured_retries() {
        let calls = Cell::new(0);
        let result: SyncResult<()> = fast(2).run("put", || {
            calls.set(calls.get() + 1);
            Err(SyncError::Status {
                operation: "put".into(),
                status: 503,
                body: String::new(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn client_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: SyncResult<()> = fast(5).run("put", || {
            calls.set(calls.get() + 1);
            Err(SyncError::Status {
                operation: "put".into(),
                status: 400,
                body: "bad".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn delay_stays_within_jitter_bound() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay();
            assert!(delay >= policy.backoff);
            assert!(delay <= policy.backoff + policy.max_jitter);
        }
        assert_eq!(RetryPolicy::none().retries, 0);
    }
}
