use std::time::Duration;

/// Shared reconnect/backoff configuration used by stream transports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Whether failures schedule automatic reconnection at all.
    pub enabled: bool,
    /// Delay before the first reconnection attempt.
    pub base_delay: Duration,
    /// Upper bound for the exponential delay.
    pub max_delay: Duration,
    /// Number of automatic attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.base_delay.is_zero() {
            return Err("Reconnect base delay must be > 0".to_string());
        }
        if self.max_delay.is_zero() {
            return Err("Max reconnect delay must be > 0".to_string());
        }
        if self.max_delay < self.base_delay {
            return Err("Max reconnect delay must be >= reconnect base delay".to_string());
        }
        Ok(())
    }
}

/// Delay for the given 1-based attempt: `min(base * 2^(attempt-1), max)`.
pub fn calculate_backoff(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}

/// Outcome of reporting a failure to [`ReconnectState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnect after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// The attempt budget ran out on this failure. Reported once.
    Exhausted,
    /// Reconnection is disabled or was stopped.
    Stopped,
}

/// Per-client reconnection bookkeeping.
#[derive(Clone, Debug)]
pub struct ReconnectState {
    config: ReconnectConfig,
    attempt: u32,
    base_delay: Duration,
    current_delay: Duration,
    should_reconnect: bool,
}

impl ReconnectState {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt: 0,
            base_delay: config.base_delay,
            current_delay: config.base_delay,
            should_reconnect: config.enabled,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    /// Record a qualifying failure and decide what happens next.
    pub fn on_failure(&mut self) -> ReconnectDecision {
        if !self.should_reconnect {
            return ReconnectDecision::Stopped;
        }
        if self.attempt >= self.config.max_attempts {
            self.should_reconnect = false;
            return ReconnectDecision::Exhausted;
        }

        self.attempt += 1;
        self.current_delay = calculate_backoff(self.base_delay, self.config.max_delay, self.attempt);
        ReconnectDecision::Retry {
            attempt: self.attempt,
            delay: self.current_delay,
        }
    }

    /// A connection opened successfully.
    pub fn on_open(&mut self) {
        self.attempt = 0;
        self.current_delay = self.base_delay;
    }

    /// Server-directed base delay (SSE `retry:`); applies from the next failure.
    pub fn override_base_delay(&mut self, delay: Duration) {
        self.base_delay = delay;
    }

    /// Forget attempts and any server override.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.base_delay = self.config.base_delay;
        self.current_delay = self.base_delay;
    }

    /// The caller disconnected; no failure may schedule a reconnect.
    pub fn stop(&mut self) {
        self.should_reconnect = false;
    }

    /// An explicit `connect()` re-arms recovery, subject to configuration.
    ///
    /// Attempts restart from zero if recovery had been stopped or exhausted.
    pub fn resume(&mut self) {
        if !self.should_reconnect {
            self.attempt = 0;
            self.current_delay = self.base_delay;
        }
        self.should_reconnect = self.config.enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            enabled: true,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts,
        }
    }

    fn delays(state: &mut ReconnectState, n: usize) -> Vec<u64> {
        (0..n)
            .map(|_| match state.on_failure() {
                ReconnectDecision::Retry { delay, .. } => delay.as_millis() as u64,
                other => panic!("unexpected decision: {other:?}"),
            })
            .collect()
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let mut state = ReconnectState::new(config(10));
        assert_eq!(
            delays(&mut state, 8),
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
    }

    #[test]
    fn open_resets_sequence() {
        let mut state = ReconnectState::new(config(10));
        delays(&mut state, 3);
        state.on_open();
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.current_delay(), Duration::from_millis(1000));
        assert_eq!(delays(&mut state, 2), vec![1000, 2000]);
    }

    #[test]
    fn exhausted_is_reported_once() {
        let mut state = ReconnectState::new(config(2));
        assert_eq!(delays(&mut state, 2), vec![1000, 2000]);
        assert_eq!(state.on_failure(), ReconnectDecision::Exhausted);
        assert!(!state.should_reconnect());
        assert_eq!(state.on_failure(), ReconnectDecision::Stopped);
        assert_eq!(state.on_failure(), ReconnectDecision::Stopped);
    }

    #[test]
    fn server_override_applies_to_next_failure_and_survives_open() {
        let mut state = ReconnectState::new(config(10));
        assert_eq!(delays(&mut state, 1), vec![1000]);
        state.override_base_delay(Duration::from_millis(5000));
        assert_eq!(delays(&mut state, 1), vec![10_000]);
        state.on_open();
        assert_eq!(state.current_delay(), Duration::from_millis(5000));
        assert_eq!(delays(&mut state, 1), vec![5000]);
        state.reset();
        assert_eq!(state.base_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn stop_and_resume() {
        let mut state = ReconnectState::new(config(3));
        state.stop();
        assert_eq!(state.on_failure(), ReconnectDecision::Stopped);
        state.resume();
        assert!(matches!(state.on_failure(), ReconnectDecision::Retry { attempt: 1, .. }));
    }

    #[test]
    fn resume_after_exhaustion_starts_over() {
        let mut state = ReconnectState::new(config(1));
        assert_eq!(delays(&mut state, 1), vec![1000]);
        assert_eq!(state.on_failure(), ReconnectDecision::Exhausted);
        state.resume();
        assert_eq!(state.attempt(), 0);
        assert_eq!(delays(&mut state, 1), vec![1000]);
    }

    #[test]
    fn disabled_config_never_retries() {
        let mut state = ReconnectState::new(ReconnectConfig {
            enabled: false,
            ..config(3)
        });
        state.resume();
        assert_eq!(state.on_failure(), ReconnectDecision::Stopped);
    }

    #[test]
    fn zero_attempts_exhausts_immediately() {
        let mut state = ReconnectState::new(config(0));
        assert_eq!(state.on_failure(), ReconnectDecision::Exhausted);
    }

    #[test]
    fn calculate_backoff_saturates() {
        let max = Duration::from_secs(30);
        assert_eq!(calculate_backoff(Duration::from_secs(1), max, 1), Duration::from_secs(1));
        assert_eq!(calculate_backoff(Duration::from_secs(1), max, 64), max);
        assert_eq!(calculate_backoff(Duration::MAX, max, 3), max);
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let bad = ReconnectConfig {
            max_delay: Duration::from_millis(10),
            ..config(3)
        };
        assert_eq!(
            bad.validate().expect_err("should fail"),
            "Max reconnect delay must be >= reconnect base delay"
        );
        assert!(config(3).validate().is_ok());
    }
}
