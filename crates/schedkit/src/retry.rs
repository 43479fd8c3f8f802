//! Retry policy for transient action failures.

use crate::error::{Error, Result};
use crate::types::RetryConfig;
use std::thread;
use std::time::Duration;

/// Run `operation`, retrying transient failures with exponential backoff.
///
/// `notify` observes each scheduled retry: the attempt number that just
/// failed (1-indexed), the error, and the delay before the next attempt.
/// It fires between attempts only, never before the first or after the
/// last. Permanent errors return on the first failure.
pub fn with_retry<T, F, N>(config: &RetryConfig, mut notify: N, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
    N: FnMut(u32, &Error, Duration),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match operation() {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_transient() || attempt >= max_attempts {
            return Err(err);
        }

        let delay = config.delay_for_attempt(attempt - 1);
        notify(attempt, &err, delay);
        thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(10),
        }
    }

    fn no_notify(_: u32, _: &Error, _: Duration) {}

    #[test]
    fn test_with_retry_success_first_try() {
        let config = RetryConfig::no_retry();
        let result = with_retry(&config, no_notify, || Ok::<_, Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_with_retry_permanent_error_no_retry() {
        let config = fast_config(3);
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<()> = with_retry(&config, no_notify, || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(Error::InvalidSpec {
                message: "bad version".to_string(),
            })
        });

        assert!(result.is_err());
        // Only one attempt since InvalidSpec is permanent
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_with_retry_eventual_success() {
        let config = fast_config(3);
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry(&config, no_notify, || {
            let current = attempts_clone.get();
            attempts_clone.set(current + 1);
            if current < 2 {
                Err(Error::Network {
                    message: "timeout".to_string(),
                })
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_with_retry_all_attempts_fail() {
        let config = fast_config(3);
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<()> = with_retry(&config, no_notify, || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(Error::Timeout { seconds: 1 })
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_notify_fires_between_attempts_only() {
        let mut notified = Vec::new();

        let _: Result<()> = with_retry(
            &fast_config(3),
            |attempt, _, _| notified.push(attempt),
            || {
                Err(Error::Network {
                    message: "timeout".to_string(),
                })
            },
        );

        // Not before the first attempt, not after the last
        assert_eq!(notified, vec![1, 2]);
    }
}
