use std::time::{Duration, Instant};

use dashmap::DashMap;

struct FailureRecord {
    count: u32,
    first_failure: Instant,
    locked_until: Option<Instant>,
}

/// Per-client login failure tracker with automatic lockout: after
/// `max_failures` within `window`, the client is locked for `lockout`.
pub struct BruteForceGuard {
    failures: DashMap<String, FailureRecord>,
    max_failures: u32,
    window: Duration,
    lockout: Duration,
}

impl BruteForceGuard {
    pub fn new(max_failures: u32, window: Duration, lockout: Duration) -> Self {
        BruteForceGuard { failures: DashMap::new(), max_failures, window, lockout }
    }

    pub fn is_locked(&self, client: &str) -> bool {
        let Some(record) = self.failures.get(client) else {
            return false;
        };
        record
            .locked_until
            .is_some_and(|until| Instant::now() < until)
    }

    pub fn record_failure(&self, client: &str) {
        let now = Instant::now();
        let mut entry = self.failures.entry(client.to_string()).or_insert(FailureRecord {
            count: 0,
            first_failure: now,
            locked_until: None,
        });
        let record = entry.value_mut();

        if now.duration_since(record.first_failure) > self.window {
            record.count = 0;
            record.first_failure = now;
            record.locked_until = None;
        }

        record.count += 1;
        if record.count >= self.max_failures {
            record.locked_until = Some(now + self.lockout);
            tracing::warn!("login lockout for {client} after {} failures", record.count);
        }
    }

    pub fn record_success(&self, client: &str) {
        self.failures.remove(client);
    }
}

impl Default for BruteForceGuard {
    fn default() -> Self {
        BruteForceGuard::new(5, Duration::from_secs(300), Duration::from_secs(900))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_after_threshold() {
        let guard = BruteForceGuard::new(3, Duration::from_secs(60), Duration::from_secs(60));
        assert!(!guard.is_locked("1.2.3.4"));
        guard.record_failure("1.2.3.4");
        guard.record_failure("1.2.3.4");
        assert!(!guard.is_locked("1.2.3.4"));
        guard.record_failure("1.2.3.4");
        assert!(guard.is_locked("1.2.3.4"));
        // Other clients unaffected.
        assert!(!guard.is_locked("5.6.7.8"));
    }

    #[test]
    fn success_clears_history() {
        let guard = BruteForceGuard::new(3, Duration::from_secs(60), Duration::from_secs(60));
        guard.record_failure("a");
        guard.record_failure("a");
        guard.record_success("a");
        guard.record_failure("a");
        assert!(!guard.is_locked("a"));
    }

    #[test]
    fn lockout_expires() {
        let guard = BruteForceGuard::new(1, Duration::from_secs(60), Duration::from_millis(10));
        guard.record_failure("a");
        assert!(guard.is_locked("a"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!guard.is_locked("a"));
    }
}
