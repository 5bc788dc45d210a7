use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;

/// Key pool with shuffled rotation and per-key cooldown.
///
/// The iteration order is reshuffled whenever the pool wraps, spreading
/// load across keys instead of always hammering the first one.
pub struct ShuffledKeyPool {
    inner: Mutex<Inner>,
    cooldown: Duration,
}

struct Inner {
    keys: Vec<Slot>,
    order: Vec<usize>,
    cursor: usize,
}

struct Slot {
    key: String,
    cooling_until: Option<Instant>,
}

impl ShuffledKeyPool {
    pub fn new(keys: Vec<String>, cooldown: Duration) -> Self {
        let order: Vec<usize> = (0..keys.len()).collect();
        ShuffledKeyPool {
            inner: Mutex::new(Inner {
                keys: keys.into_iter().map(|key| Slot { key, cooling_until: None }).collect(),
                order,
                cursor: 0,
            }),
            cooldown,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("key pool lock poisoned").keys.is_empty()
    }

    pub fn available(&self) -> usize {
        let inner = self.inner.lock().expect("key pool lock poisoned");
        let now = Instant::now();
        inner
            .keys
            .iter()
            .filter(|s| s.cooling_until.is_none_or(|until| now >= until))
            .count()
    }

    /// Next usable key in shuffled order, or None when all are cooling.
    pub fn acquire(&self) -> Option<(usize, String)> {
        let mut inner = self.inner.lock().expect("key pool lock poisoned");
        let n = inner.keys.len();
        if n == 0 {
            return None;
        }
        let now = Instant::now();
        for _ in 0..n {
            if inner.cursor >= inner.order.len() {
                inner.cursor = 0;
                let mut order = std::mem::take(&mut inner.order);
                order.shuffle(&mut rand::rng());
                inner.order = order;
            }
            let idx = inner.order[inner.cursor];
            inner.cursor += 1;
            let usable = inner.keys[idx].cooling_until.is_none_or(|until| now >= until);
            if usable {
                inner.keys[idx].cooling_until = None;
                return Some((idx, inner.keys[idx].key.clone()));
            }
        }
        None
    }

    pub fn cool_down(&self, index: usize) {
        let mut inner = self.inner.lock().expect("key pool lock poisoned");
        if let Some(slot) = inner.keys.get_mut(index) {
            slot.cooling_until = Some(Instant::now() + self.cooldown);
        }
    }
}
