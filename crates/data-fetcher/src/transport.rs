use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::FetchError;

/// Sliding-window rate limiter: at most `max_requests` per `window`.
#[derive(Clone)]
pub struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        RateLimiter { timestamps: Arc::new(Mutex::new(VecDeque::new())), max_requests, window }
    }

    pub async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }
            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }
            let wait_until = *ts.front().expect("non-empty when full") + self.window;
            let sleep_for = wait_until.duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tokio::time::sleep(sleep_for).await;
        }
    }
}

/// Build the shared vendor HTTP client: 10 s timeout, browser-ish UA so
/// public quote endpoints don't reject the default reqwest agent.
pub fn vendor_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
        )
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// GET a URL with one rate-limited retry on 429/5xx before giving up.
pub async fn get_with_retry(
    client: &reqwest::Client,
    limiter: &RateLimiter,
    source_name: &'static str,
    url: &str,
) -> Result<String, FetchError> {
    for attempt in 0..2u32 {
        limiter.acquire().await;
        let response = client.get(url).send().await.map_err(|e| FetchError::Transport {
            source_name,
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return response.text().await.map_err(|e| FetchError::Transport {
                source_name,
                message: e.to_string(),
            });
        }

        let retryable = status.as_u16() == 429 || status.is_server_error();
        if retryable && attempt == 0 {
            tracing::warn!("{source_name}: HTTP {status}, retrying once");
            tokio::time::sleep(Duration::from_secs(2)).await;
            continue;
        }
        return Err(FetchError::Transport {
            source_name,
            message: format!("HTTP {status}"),
        });
    }
    unreachable!("loop returns on every path")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limiter_delays_over_budget_calls() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        // Third call must wait for the window to roll.
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
