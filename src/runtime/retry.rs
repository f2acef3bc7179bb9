//! Delay policies and per-retry bookkeeping
//!
//! A `Retry` node owns one [`RetryState`] for the lifetime of its evaluation.
//! The state counts attempts against a hard limit and asks its
//! [`DelayPolicy`] how long to wait before the next one.

use std::fmt;

use super::error::ProgramError;
use super::scheduler::Time;

/// Strategy deciding how long to wait between retry attempts
pub trait DelayPolicy: fmt::Debug {
    /// Wait before the attempt following attempt number `attempt` (1-based)
    fn delay(&self, attempt: u32) -> Time;
}

/// Same wait between every attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantDelay {
    /// Wait in time units
    pub value: Time,
}

impl DelayPolicy for ConstantDelay {
    fn delay(&self, _attempt: u32) -> Time {
        self.value
    }
}

/// Geometric backoff: `initial * factor^(attempt - 1)`, optionally capped
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    /// Wait after the first attempt
    pub initial: Time,
    /// Growth factor per attempt
    pub factor: f64,
    /// Upper bound on any single wait
    pub max: Option<Time>,
}

impl DelayPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Time {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let wait = self.initial * self.factor.powi(exponent);
        match self.max {
            Some(max) => wait.min(max),
            None => wait,
        }
    }
}

/// Runtime record of one `Retry` evaluation
///
/// No request is kept here: each attempt evaluates the body afresh and the
/// requests it issues carry their own continuations back to the retry loop.
#[derive(Debug)]
pub struct RetryState {
    attempts: u32,
    limit: u32,
    policy: Box<dyn DelayPolicy>,
}

impl RetryState {
    /// Create the state for a retry allowing at most `limit` attempts
    pub fn new(limit: u32, policy: Box<dyn DelayPolicy>) -> Result<Self, ProgramError> {
        if limit == 0 {
            return Err(ProgramError::InvalidRetryLimit(limit));
        }
        Ok(Self {
            attempts: 0,
            limit,
            policy,
        })
    }

    /// Count a new attempt and return its 1-based number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Attempts issued so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt would exceed the limit
    pub fn exhausted(&self) -> bool {
        self.attempts >= self.limit
    }

    /// Wait before the next attempt
    pub fn next_delay(&self) -> Time {
        self.policy.delay(self.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_delay() {
        let policy = ConstantDelay { value: 2.5 };
        assert_eq!(policy.delay(1), 2.5);
        assert_eq!(policy.delay(10), 2.5);
    }

    #[test]
    fn test_exponential_backoff_with_cap() {
        let policy = ExponentialBackoff {
            initial: 1.0,
            factor: 2.0,
            max: Some(5.0),
        };
        let waits: Vec<_> = (1..=5).map(|attempt| policy.delay(attempt)).collect();
        assert_eq!(waits, vec![1.0, 2.0, 4.0, 5.0, 5.0]);
    }

    #[test]
    fn test_retry_state_limit() {
        let mut state = RetryState::new(2, Box::new(ConstantDelay { value: 1.0 })).unwrap();
        assert!(!state.exhausted());
        assert_eq!(state.begin_attempt(), 1);
        assert!(!state.exhausted());
        assert_eq!(state.begin_attempt(), 2);
        assert!(state.exhausted());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = RetryState::new(0, Box::new(ConstantDelay { value: 1.0 })).unwrap_err();
        assert_eq!(err, ProgramError::InvalidRetryLimit(0));
    }
}
