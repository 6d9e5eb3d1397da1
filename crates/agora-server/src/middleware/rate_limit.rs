//! Governor-based rate limiting for the login and register endpoints.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde_json::json;

use crate::context::AppContext;

/// A shared rate limiter instance.
pub type SharedLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const FALLBACK_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(30) {
    Some(n) => n,
    None => unreachable!(),
};

/// Create a rate limiter with the given requests-per-minute quota. Zero falls
/// back to 30.
pub fn create_limiter(requests_per_minute: u32) -> SharedLimiter {
    let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(FALLBACK_PER_MINUTE));
    Arc::new(RateLimiter::direct(quota))
}

/// Rate limiting middleware. Returns 429 Too Many Requests when exceeded.
pub async fn auth_rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    if ctx.auth_limiter.check().is_err() {
        tracing::warn!(path = %request.uri().path(), "Auth rate limit exceeded");
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(json!({
                "error": "Too many requests, slow down",
                "code": "rate_limited",
            })),
        )
            .into_response());
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_allows_quota_then_blocks() {
        let limiter = create_limiter(2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn zero_quota_falls_back() {
        let limiter = create_limiter(0);
        for _ in 0..30 {
            assert!(limiter.check().is_ok());
        }
        assert!(limiter.check().is_err());
    }
}
