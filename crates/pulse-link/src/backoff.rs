use std::time::Duration;

/// Reconnection schedule for one service.
///
/// The first `fast_attempts` retries wait `fast_delay`; retry `n` after that
/// waits `backoff_base * 2^(n - fast_attempts)`. After `max_attempts`
/// consecutive failures no further retry is scheduled until the counter is
/// reset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub fast_attempts: u32,
    pub fast_delay: Duration,
    pub backoff_base: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            fast_attempts: 3,
            fast_delay: Duration::from_secs(1),
            backoff_base: Duration::from_secs(1),
        }
    }
}

// 2^16 * base is already far past any useful delay.
const MAX_EXPONENT: u32 = 16;

impl ReconnectPolicy {
    /// Whether retry number `attempt` (1-based) may be scheduled.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= self.fast_attempts {
            return self.fast_delay;
        }
        let exponent = (attempt - self.fast_attempts).min(MAX_EXPONENT);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }
}
