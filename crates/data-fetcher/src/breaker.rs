use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker position for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_probe_out: bool,
}

/// Consecutive-failure circuit breaker with a cooldown window.
///
/// After `threshold` consecutive failures the breaker opens for
/// `cooldown`; while open, calls skip the source without an attempt.
/// Once the cooldown elapses a single probe is let through (half-open);
/// its success closes the breaker, its failure re-opens it.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        CircuitBreaker {
            threshold,
            cooldown,
            inner: Mutex::new(BreakerInner {
                consecutive_failures: 0,
                opened_at: None,
                half_open_probe_out: false,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.opened_at {
            None => BreakerState::Closed,
            Some(at) if at.elapsed() >= self.cooldown => BreakerState::HalfOpen,
            Some(_) => BreakerState::Open,
        }
    }

    /// Whether a call may proceed right now. In half-open state only the
    /// first caller gets through until its verdict arrives.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.opened_at {
            None => true,
            Some(at) if at.elapsed() >= self.cooldown => {
                if inner.half_open_probe_out {
                    false
                } else {
                    inner.half_open_probe_out = true;
                    true
                }
            }
            Some(_) => false,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.half_open_probe_out = false;
    }

    /// Release an acquired slot without a verdict (unsupported-market
    /// answers neither count as failures nor clear a failure streak).
    pub fn record_neutral(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.half_open_probe_out = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.consecutive_failures += 1;
        inner.half_open_probe_out = false;
        if inner.consecutive_failures >= self.threshold {
            inner.opened_at = Some(Instant::now());
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        CircuitBreaker::new(3, Duration::from_secs(600))
    }
}
