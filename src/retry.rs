//! Bounded retry for fallible async operations.
//!
//! The policy only decides how many attempts are made and how long to pause
//! between them; what counts as an attempt is up to the [`Attempt`] impl.

use async_trait::async_trait;
use std::fmt::Display;
use std::time::Duration;

/// How the pause between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// `delay * 2^(retry - 1)`
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_retries + 1`
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

/// One unit of work that may be tried several times
#[async_trait]
pub trait Attempt: Send {
    type Output: Send;
    type Error: Display + Send;

    /// Runs attempt number `number` (1-based)
    async fn attempt(&mut self, number: u32) -> Result<Self::Output, Self::Error>;
}

/// Result of running an [`Attempt`] under a [`RetryPolicy`]
#[derive(Debug)]
pub struct Retried<T, E> {
    pub outcome: Result<T, E>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Pause before retry number `retry` (1-based)
    pub fn delay_before(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 1u32 << retry.saturating_sub(1).min(16);
                self.delay.saturating_mul(factor)
            }
        }
    }

    /// Runs `op` until it succeeds or the attempt budget is spent.
    pub async fn run<A: Attempt>(&self, op: &mut A) -> Retried<A::Output, A::Error> {
        let mut number = 1;
        loop {
            match op.attempt(number).await {
                Ok(value) => {
                    return Retried {
                        outcome: Ok(value),
                        attempts: number,
                    };
                }
                Err(err) if number >= self.max_attempts() => {
                    return Retried {
                        outcome: Err(err),
                        attempts: number,
                    };
                }
                Err(err) => {
                    let pause = self.delay_before(number);
                    ::log::warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        number,
                        self.max_attempts(),
                        err,
                        pause
                    );
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                    number += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails until attempt `succeed_on` (never, if `None`)
    struct Flaky {
        succeed_on: Option<u32>,
        seen: Vec<u32>,
    }

    #[async_trait]
    impl Attempt for Flaky {
        type Output = &'static str;
        type Error = String;

        async fn attempt(&mut self, number: u32) -> Result<Self::Output, Self::Error> {
            self.seen.push(number);
            match self.succeed_on {
                Some(n) if n == number => Ok("done"),
                _ => Err(format!("attempt {number} failed")),
            }
        }
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_all_attempts() {
        let policy = RetryPolicy::fixed(2, Duration::ZERO);
        let mut op = Flaky {
            succeed_on: None,
            seen: vec![],
        };
        let retried = policy.run(&mut op).await;
        assert_eq!(retried.attempts, 3);
        assert_eq!(retried.outcome.unwrap_err(), "attempt 3 failed");
        assert_eq!(op.seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_success_on_attempt_i() {
        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        for i in 1..=4 {
            let mut op = Flaky {
                succeed_on: Some(i),
                seen: vec![],
            };
            let retried = policy.run(&mut op).await;
            assert_eq!(retried.attempts, i);
            assert_eq!(retried.outcome.unwrap(), "done");
        }
    }

    #[tokio::test]
    async fn test_zero_retries_is_single_attempt() {
        let policy = RetryPolicy::fixed(0, Duration::from_secs(60));
        let mut op = Flaky {
            succeed_on: Some(2),
            seen: vec![],
        };
        let retried = policy.run(&mut op).await;
        assert_eq!(retried.attempts, 1);
        assert!(retried.outcome.is_err());
    }

    #[test]
    fn test_backoff_delays() {
        let fixed = RetryPolicy::fixed(3, Duration::from_millis(500));
        assert_eq!(fixed.delay_before(1), Duration::from_millis(500));
        assert_eq!(fixed.delay_before(3), Duration::from_millis(500));

        let exp = RetryPolicy {
            backoff: Backoff::Exponential,
            ..fixed
        };
        assert_eq!(exp.delay_before(1), Duration::from_millis(500));
        assert_eq!(exp.delay_before(2), Duration::from_secs(1));
        assert_eq!(exp.delay_before(3), Duration::from_secs(2));
    }
}
