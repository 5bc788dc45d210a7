use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Round-robin API key pool with per-key cooldown.
///
/// A key hit with 429 sits out `cooldown`; rotation continues over the
/// remaining keys. When every key is cooling the pool yields nothing and
/// the provider is treated as failed for this call.
pub struct KeyPool {
    inner: Mutex<PoolInner>,
    cooldown: Duration,
}

struct PoolInner {
    keys: Vec<KeySlot>,
    next: usize,
}

struct KeySlot {
    key: String,
    cooling_until: Option<Instant>,
}

impl KeyPool {
    pub fn new(keys: Vec<String>, cooldown: Duration) -> Self {
        KeyPool {
            inner: Mutex::new(PoolInner {
                keys: keys.into_iter().map(|key| KeySlot { key, cooling_until: None }).collect(),
                next: 0,
            }),
            cooldown,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("key pool lock poisoned").keys.is_empty()
    }

    /// Next usable key, round robin, skipping cooling keys.
    /// Returns (index, key).
    pub fn acquire(&self) -> Option<(usize, String)> {
        let mut inner = self.inner.lock().expect("key pool lock poisoned");
        let n = inner.keys.len();
        if n == 0 {
            return None;
        }
        let now = Instant::now();
        for offset in 0..n {
            let idx = (inner.next + offset) % n;
            let usable = match inner.keys[idx].cooling_until {
                Some(until) => now >= until,
                None => true,
            };
            if usable {
                inner.keys[idx].cooling_until = None;
                inner.next = (idx + 1) % n;
                return Some((idx, inner.keys[idx].key.clone()));
            }
        }
        None
    }

    /// Park a key after a 429 / quota response.
    pub fn cool_down(&self, index: usize) {
        let mut inner = self.inner.lock().expect("key pool lock poisoned");
        if let Some(slot) = inner.keys.get_mut(index) {
            slot.cooling_until = Some(Instant::now() + self.cooldown);
        }
    }

    /// Number of keys currently usable.
    pub fn available(&self) -> usize {
        let inner = self.inner.lock().expect("key pool lock poisoned");
        let now = Instant::now();
        inner
            .keys
            .iter()
            .filter(|slot| slot.cooling_until.is_none_or(|until| now >= until))
            .count()
    }
}
