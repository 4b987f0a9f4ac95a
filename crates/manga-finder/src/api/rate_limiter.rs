//! Client-side rate limiter.
//!
//! Enforces both per-second and per-minute request budgets. Shared between
//! clones of the client, so state lives behind an async mutex.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct LimiterState {
    last_request: Option<Instant>,
    recent_requests: VecDeque<Instant>,
}

/// Rate limiter with dual constraints (per-second and per-minute)
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    max_per_minute: usize,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(max_per_second: f64, max_per_minute: u32) -> Self {
        let min_interval = if max_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / max_per_second)
        } else {
            Duration::ZERO
        };

        Self {
            min_interval,
            max_per_minute: max_per_minute.max(1) as usize,
            state: Mutex::new(LimiterState {
                last_request: None,
                recent_requests: VecDeque::with_capacity(max_per_minute as usize),
            }),
        }
    }

    /// Wait until a request can be made, respecting both rate limits.
    ///
    /// Callers queue on the mutex, so concurrent requests are spaced out in
    /// arrival order.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        while let Some(&oldest) = state.recent_requests.front() {
            if now.duration_since(oldest) >= WINDOW {
                state.recent_requests.pop_front();
            } else {
                break;
            }
        }

        if state.recent_requests.len() >= self.max_per_minute {
            if let Some(&oldest) = state.recent_requests.front() {
                let wait_time = WINDOW.saturating_sub(now.duration_since(oldest));
                tracing::debug!(
                    wait_ms = wait_time.as_millis() as u64,
                    "Rate limit: waiting for per-minute limit"
                );
                sleep(wait_time).await;
                state.recent_requests.pop_front();
            }
        }

        if let Some(last) = state.last_request {
            let elapsed = Instant::now().duration_since(last);
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!(
                    wait_ms = wait_time.as_millis() as u64,
                    "Rate limit: waiting for per-second limit"
                );
                sleep(wait_time).await;
            }
        }

        let request_time = Instant::now();
        state.last_request = Some(request_time);
        state.recent_requests.push_back(request_time);
    }

    /// Get the current number of requests in the last minute
    pub async fn current_minute_count(&self) -> usize {
        let state = self.state.lock().await;
        let now = Instant::now();
        state
            .recent_requests
            .iter()
            .filter(|&&t| now.duration_since(t) < WINDOW)
            .count()
    }
}
