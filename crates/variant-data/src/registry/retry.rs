//! Per-request retry state machine.
//!
//! ```text
//! NotStarted -> Attempting(1) -+-> Succeeded
//!                              +-> FailedPermanent
//!                              +-> CircuitBlocked
//!                              +-> Backoff(n) -> Attempting(n+1) -> ...
//!                              +-> FailedExhausted   (n == max_attempts)
//! ```
//!
//! Transitions are driven only by the classification of each attempt; the
//! machine never looks at payloads or status codes itself.

use std::time::Duration;

use log::debug;

/// Backoff parameters for one provider.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following `attempt` (1-based).
    ///
    /// `base_delay * factor^(attempt-1)`, capped at `max_delay`, with a
    /// `Retry-After` hint acting as a floor.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.backoff_factor.max(1.0).powi(exponent);
        let backoff = Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()));
        match retry_after {
            Some(hint) => backoff.max(hint),
            None => backoff,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestState {
    NotStarted,
    Attempting(u32),
    Backoff(u32),
    Succeeded,
    FailedPermanent,
    FailedExhausted,
    CircuitBlocked,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::FailedPermanent | Self::FailedExhausted | Self::CircuitBlocked
        )
    }
}

/// Classification of a single attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AttemptClass {
    Success,
    Retryable {
        retry_after: Option<Duration>,
        rate_limited: bool,
    },
    Permanent,
    CircuitOpen,
}

/// What the caller should do next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    Attempt(u32),
    Wait(Duration),
    Finish(RequestState),
}

pub struct RetryMachine {
    policy: RetryPolicy,
    idempotent: bool,
    state: RequestState,
}

impl RetryMachine {
    /// Non-idempotent requests are only repeated after an explicit 429.
    pub fn new(policy: RetryPolicy, idempotent: bool) -> Self {
        Self {
            policy,
            idempotent,
            state: RequestState::NotStarted,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn begin(&mut self) -> Step {
        match self.state {
            RequestState::NotStarted => {
                self.state = RequestState::Attempting(1);
                Step::Attempt(1)
            }
            other => self.unexpected("begin", other),
        }
    }

    pub fn observe(&mut self, class: AttemptClass) -> Step {
        let attempt = match self.state {
            RequestState::Attempting(n) => n,
            other => return self.unexpected("observe", other),
        };

        match class {
            AttemptClass::Success => self.finish(RequestState::Succeeded),
            AttemptClass::Permanent => self.finish(RequestState::FailedPermanent),
            AttemptClass::CircuitOpen => self.finish(RequestState::CircuitBlocked),
            AttemptClass::Retryable {
                retry_after,
                rate_limited,
            } => {
                let may_repeat = self.idempotent || rate_limited;
                if !may_repeat || attempt >= self.policy.max_attempts.max(1) {
                    return self.finish(RequestState::FailedExhausted);
                }
                self.state = RequestState::Backoff(attempt);
                Step::Wait(self.policy.delay_for(attempt, retry_after))
            }
        }
    }

    /// Leave backoff and start the next attempt.
    pub fn resume(&mut self) -> Step {
        match self.state {
            RequestState::Backoff(n) => {
                self.state = RequestState::Attempting(n + 1);
                Step::Attempt(n + 1)
            }
            other => self.unexpected("resume", other),
        }
    }

    fn finish(&mut self, state: RequestState) -> Step {
        self.state = state;
        Step::Finish(state)
    }

    fn unexpected(&mut self, event: &str, state: RequestState) -> Step {
        debug!("Retry machine: ignoring '{}' in state {:?}", event, state);
        if state.is_terminal() {
            Step::Finish(state)
        } else {
            self.finish(RequestState::FailedExhausted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(3),
        }
    }

    const RETRYABLE: AttemptClass = AttemptClass::Retryable {
        retry_after: None,
        rate_limited: false,
    };

    #[test]
    fn test_exponential_delay_with_cap() {
        let p = policy(10);
        assert_eq!(p.delay_for(1, None), Duration::from_millis(500));
        assert_eq!(p.delay_for(2, None), Duration::from_secs(1));
        assert_eq!(p.delay_for(3, None), Duration::from_secs(2));
        assert_eq!(p.delay_for(4, None), Duration::from_secs(3));
        assert_eq!(p.delay_for(30, None), Duration::from_secs(3));
    }

    #[test]
    fn test_retry_after_is_a_floor() {
        let p = policy(10);
        assert_eq!(
            p.delay_for(1, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            p.delay_for(3, Some(Duration::from_millis(100))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_success_on_first_attempt() {
        let mut m = RetryMachine::new(policy(3), true);
        assert_eq!(m.begin(), Step::Attempt(1));
        assert_eq!(
            m.observe(AttemptClass::Success),
            Step::Finish(RequestState::Succeeded)
        );
    }

    #[test]
    fn test_retries_until_exhausted() {
        let mut m = RetryMachine::new(policy(3), true);
        m.begin();
        assert_eq!(m.observe(RETRYABLE), Step::Wait(Duration::from_millis(500)));
        assert_eq!(m.state(), RequestState::Backoff(1));
        assert_eq!(m.resume(), Step::Attempt(2));
        assert_eq!(m.observe(RETRYABLE), Step::Wait(Duration::from_secs(1)));
        assert_eq!(m.resume(), Step::Attempt(3));
        assert_eq!(
            m.observe(RETRYABLE),
            Step::Finish(RequestState::FailedExhausted)
        );
    }

    #[test]
    fn test_recovery_after_transient_failure() {
        let mut m = RetryMachine::new(policy(3), true);
        m.begin();
        m.observe(RETRYABLE);
        m.resume();
        assert_eq!(
            m.observe(AttemptClass::Success),
            Step::Finish(RequestState::Succeeded)
        );
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let mut m = RetryMachine::new(policy(3), true);
        m.begin();
        assert_eq!(
            m.observe(AttemptClass::Permanent),
            Step::Finish(RequestState::FailedPermanent)
        );
    }

    #[test]
    fn test_circuit_open_blocks() {
        let mut m = RetryMachine::new(policy(3), true);
        m.begin();
        assert_eq!(
            m.observe(AttemptClass::CircuitOpen),
            Step::Finish(RequestState::CircuitBlocked)
        );
    }

    #[test]
    fn test_non_idempotent_only_retries_rate_limits() {
        let mut m = RetryMachine::new(policy(3), false);
        m.begin();
        assert_eq!(
            m.observe(RETRYABLE),
            Step::Finish(RequestState::FailedExhausted)
        );

        let mut m = RetryMachine::new(policy(3), false);
        m.begin();
        let step = m.observe(AttemptClass::Retryable {
            retry_after: Some(Duration::from_secs(2)),
            rate_limited: true,
        });
        assert_eq!(step, Step::Wait(Duration::from_secs(2)));
    }

    #[test]
    fn test_out_of_order_events_end_the_request() {
        let mut m = RetryMachine::new(policy(3), true);
        assert_eq!(m.resume(), Step::Finish(RequestState::FailedExhausted));
        assert_eq!(m.begin(), Step::Finish(RequestState::FailedExhausted));
    }
}
