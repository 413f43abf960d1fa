use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::AppError;

#[derive(Debug)]
struct RateWindow {
    started_at: Instant,
    count: u64,
}

/// Fixed-window limiter shared by every request passing through a route group.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    limit: u64,
    period: Duration,
    window: Arc<Mutex<RateWindow>>,
}

impl RateLimitState {
    /// A `limit` of zero disables limiting.
    pub fn new(limit: u64, period: Duration) -> Self {
        Self {
            limit,
            period,
            window: Arc::new(Mutex::new(RateWindow {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }

    pub fn per_minute(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn try_acquire(&self) -> bool {
        if self.limit == 0 {
            return true;
        }

        let mut window = self.window.lock();
        let now = Instant::now();

        if now.duration_since(window.started_at) >= self.period {
            window.started_at = now;
            window.count = 0;
        }

        if window.count < self.limit {
            window.count += 1;
            true
        } else {
            false
        }
    }
}

pub async fn enforce_rate_limit(
    State(state): State<Arc<RateLimitState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if state.try_acquire() {
        Ok(next.run(request).await)
    } else {
        warn!(path = %request.uri().path(), "AI request rate exceeded");
        Err(AppError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many AI requests, please try again shortly",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_after_the_limit_within_a_window() {
        let state = RateLimitState::new(2, Duration::from_secs(60));
        assert!(state.try_acquire());
        assert!(state.try_acquire());
        assert!(!state.try_acquire());
    }

    #[test]
    fn window_resets_after_the_period() {
        let state = RateLimitState::new(1, Duration::from_millis(10));
        assert!(state.try_acquire());
        assert!(!state.try_acquire());
        std::thread::sleep(Duration::from_millis(20));
        assert!(state.try_acquire());
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let state = RateLimitState::per_minute(0);
        assert!((0..1000).all(|_| state.try_acquire()));
    }
}
