//! Fixed-window rate limiting primitives and HTTP header helpers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Request, header::RETRY_AFTER};
use axum::middleware::Next;
use axum::response::Response;
use axum::extract::State;

use crate::http::admission::client_ip;
use crate::http::constants::{
    HEADER_RATE_LIMIT_LIMIT, HEADER_RATE_LIMIT_REMAINING, HEADER_RATE_LIMIT_RESET,
};
use crate::http::errors::ApiError;
use crate::state::ApiState;

/// Per-key counter inside one window.
pub(crate) struct FixedWindow {
    pub(crate) count: u32,
    pub(crate) reset_at: Instant,
}

impl FixedWindow {
    pub(crate) const fn starting_at(reset_at: Instant) -> Self {
        Self { count: 0, reset_at }
    }

    pub(crate) fn reset(&mut self, reset_at: Instant) {
        self.count = 0;
        self.reset_at = reset_at;
    }
}

/// Snapshot returned for an admitted request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateSnapshot {
    pub(crate) limit: u32,
    pub(crate) remaining: u32,
    pub(crate) reset_after: Duration,
}

/// Rejection carrying the data for `Retry-After`.
#[derive(Debug)]
pub(crate) struct RateLimitExceeded {
    pub(crate) limit: u32,
    pub(crate) retry_after: Duration,
}

/// Fixed-window limiter middleware keyed by client IP; `/health` is exempt.
pub(crate) async fn rate_limit(
    State(state): State<Arc<ApiState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let key = client_ip(&req, state.config.trust_proxy)
        .map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
    match state.check_rate_limit(&key, Instant::now()) {
        Ok(snapshot) => {
            let mut response = next.run(req).await;
            insert_rate_limit_headers(response.headers_mut(), &snapshot);
            Ok(response)
        }
        Err(exceeded) => {
            state.metrics.inc_rate_limit_throttled();
            state.metrics.inc_admission_rejected("rate_limit");
            Err(ApiError::too_many_requests("Too many requests")
                .with_retry_after(exceeded.limit, exceeded.retry_after))
        }
    }
}

pub(crate) fn insert_rate_limit_headers(headers: &mut HeaderMap, snapshot: &RateSnapshot) {
    if let Ok(value) = HeaderValue::from_str(&snapshot.limit.to_string()) {
        headers.insert(HEADER_RATE_LIMIT_LIMIT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&snapshot.remaining.to_string()) {
        headers.insert(HEADER_RATE_LIMIT_REMAINING, value);
    }
    if let Ok(value) = HeaderValue::from_str(&whole_seconds(snapshot.reset_after).to_string()) {
        headers.insert(HEADER_RATE_LIMIT_RESET, value);
    }
}

pub(crate) fn insert_retry_after_headers(
    headers: &mut HeaderMap,
    limit: u32,
    retry_after: Duration,
) {
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert(HEADER_RATE_LIMIT_LIMIT, value);
    }
    if let Ok(value) = HeaderValue::from_str("0") {
        headers.insert(HEADER_RATE_LIMIT_REMAINING, value);
    }
    let seconds = whole_seconds(retry_after).to_string();
    if let Ok(value) = HeaderValue::from_str(&seconds) {
        headers.insert(RETRY_AFTER, value.clone());
        headers.insert(HEADER_RATE_LIMIT_RESET, value);
    }
}

fn whole_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if secs == 0 && duration.subsec_nanos() > 0 {
        1
    } else {
        secs.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_seconds_round_up_to_at_least_one() {
        assert_eq!(whole_seconds(Duration::from_millis(20)), 1);
        assert_eq!(whole_seconds(Duration::from_secs(0)), 1);
        assert_eq!(whole_seconds(Duration::from_secs(42)), 42);
    }

    #[test]
    fn headers_are_populated_for_admitted_requests() {
        let mut headers = HeaderMap::new();
        insert_rate_limit_headers(
            &mut headers,
            &RateSnapshot {
                limit: 120,
                remaining: 119,
                reset_after: Duration::from_secs(60),
            },
        );
        assert_eq!(headers[HEADER_RATE_LIMIT_LIMIT], "120");
        assert_eq!(headers[HEADER_RATE_LIMIT_REMAINING], "119");
        assert_eq!(headers[HEADER_RATE_LIMIT_RESET], "60");
    }

    #[test]
    fn rejections_carry_retry_after() {
        let mut headers = HeaderMap::new();
        insert_retry_after_headers(&mut headers, 120, Duration::from_secs(17));
        assert_eq!(headers[RETRY_AFTER], "17");
        assert_eq!(headers[HEADER_RATE_LIMIT_REMAINING], "0");
    }
}
