//! Circuit breaker (§4.6).
//!
//! Closed → Open on `max_failures` consecutive failures. Open rejects
//! immediately until `timeout` elapses, then Half-Open admits one trial;
//! `success_threshold` consecutive successes close it again, any failure
//! reopens it.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Distinguished sentinel: the breaker is open, the call was never made.
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub max_failures: u32,
    pub timeout: Duration,
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    /// Half-Open admits exactly one trial at a time.
    trial_in_flight: bool,
}

/// Thread-safe circuit breaker wrapping any fallible async operation.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    fn admit(&self) -> Result<bool, ()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => Ok(false),
            State::HalfOpen => {
                if inner.trial_in_flight {
                    Err(())
                } else {
                    inner.trial_in_flight = true;
                    Ok(true)
                }
            }
            State::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.timeout)
                    .unwrap_or(false);
                if elapsed {
                    inner.state = State::HalfOpen;
                    inner.trial_in_flight = true;
                    inner.consecutive_successes = 0;
                    Ok(true)
                } else {
                    Err(())
                }
            }
        }
    }

    fn record_success(&self, was_trial: bool) {
        let mut inner = self.inner.lock().unwrap();
        if was_trial {
            inner.trial_in_flight = false;
        }
        match inner.state {
            State::Closed => {
                inner.consecutive_failures = 0;
            }
            State::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = State::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            State::Open => {}
        }
    }

    fn record_failure(&self, was_trial: bool) {
        let mut inner = self.inner.lock().unwrap();
        if was_trial {
            inner.trial_in_flight = false;
        }
        match inner.state {
            State::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.max_failures {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_successes = 0;
            }
            State::Open => {}
        }
    }

    /// Run `op` through the breaker. Returns `CircuitOpen` without invoking
    /// `op` when the breaker rejects the call.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let is_trial = match self.admit() {
            Ok(is_trial) => is_trial,
            Err(()) => return Err(BreakerError::CircuitOpen),
        };

        match op().await {
            Ok(value) => {
                self.record_success(is_trial);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(is_trial);
                Err(BreakerError::Inner(err))
            }
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.inner.lock().unwrap().state, State::Open)
    }
}
