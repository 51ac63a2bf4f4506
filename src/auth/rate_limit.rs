use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::AppState;

/// Auth endpoints: requests per window per IP + path.
const MAX_REQUESTS: u32 = 5;
const WINDOW_SECS: u64 = 60;

/// Integration token refresh: one attempt per user per cooldown.
pub const TOKEN_REFRESH_COOLDOWN_SECS: u64 = 30;

/// In-memory rate limit state, keyed by caller. Lost on restart and not
/// shared between instances.
#[derive(Clone, Default)]
pub struct RateLimitState {
    entries: Arc<Mutex<HashMap<String, RateLimitEntry>>>,
}

struct RateLimitEntry {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the key is rate limited. Returns Ok(remaining) or Err(retry_after).
    pub async fn check(&self, key: &str) -> Result<u32, Duration> {
        self.check_with_limits(key, MAX_REQUESTS, WINDOW_SECS).await
    }

    pub async fn check_with_limits(
        &self,
        key: &str,
        max_requests: u32,
        window_secs: u64,
    ) -> Result<u32, Duration> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(window_secs);

        let entry = entries.entry(key.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
            window,
        });

        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
            entry.window = window;
        }

        if entry.count >= max_requests {
            let retry_after = window.saturating_sub(now.duration_since(entry.window_start));
            return Err(retry_after);
        }

        entry.count += 1;
        Ok(max_requests - entry.count)
    }

    /// Single-attempt cooldown: the first call passes, any call within
    /// `cooldown_secs` of it is rejected.
    pub async fn check_cooldown(&self, key: &str, cooldown_secs: u64) -> Result<(), Duration> {
        self.check_with_limits(key, 1, cooldown_secs).await.map(|_| ())
    }

    /// Drop entries whose window has long passed.
    pub async fn cleanup(&self) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.window_start) < entry.window * 2);
    }
}

pub fn spawn_cleanup_worker(limiter: RateLimitState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    });
}

/// Rate limiting middleware for auth endpoints
pub async fn rate_limit_auth(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = addr.ip().to_string();
    let path = req.uri().path().to_string();

    // Rate limit key: IP + path (so /login and /register have separate limits)
    let key = format!("{}:{}", ip, path);

    match state.rate_limiter.check(&key).await {
        Ok(remaining) => {
            tracing::debug!(ip = %ip, path = %path, remaining = remaining, "Rate limit check passed");
            Ok(next.run(req).await)
        }
        Err(retry_after) => {
            tracing::warn!(
                ip = %ip,
                path = %path,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            Err(AppError::RateLimited)
        }
    }
}

/// Cooldown on user-initiated integration token refresh. Must run inside
/// `require_auth` so the caller is known.
pub async fn rate_limit_token_refresh(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = req
        .extensions()
        .get::<AuthUser>()
        .map(|u| u.id)
        .ok_or(AppError::Unauthorized)?;

    let key = format!("token_refresh:{}", user_id);
    match state
        .rate_limiter
        .check_cooldown(&key, TOKEN_REFRESH_COOLDOWN_SECS)
        .await
    {
        Ok(()) => Ok(next.run(req).await),
        Err(retry_after) => {
            tracing::warn!(
                user_id = %user_id,
                retry_after_secs = retry_after.as_secs(),
                "Token refresh cooldown active"
            );
            Err(AppError::RateLimited)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::StatusCode,
        middleware::{self, Next},
        routing::post,
        Router,
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_rate_limit_allows_under_limit() {
        let limiter = RateLimitState::new();

        for i in 0..MAX_REQUESTS {
            let result = limiter.check("test_key").await;
            assert!(result.is_ok(), "Request {} should be allowed", i + 1);
        }
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_over_limit() {
        let limiter = RateLimitState::new();

        for _ in 0..MAX_REQUESTS {
            let _ = limiter.check("test_key").await;
        }

        assert!(limiter.check("test_key").await.is_err());
    }

    #[tokio::test]
    async fn test_different_keys_have_separate_limits() {
        let limiter = RateLimitState::new();

        for _ in 0..MAX_REQUESTS {
            let _ = limiter.check("key1").await;
        }

        assert!(limiter.check("key2").await.is_ok());
    }

    #[tokio::test]
    async fn test_cooldown_blocks_second_attempt() {
        let limiter = RateLimitState::new();
        assert!(limiter.check_cooldown("token_refresh:u1", 30).await.is_ok());

        let retry_after = limiter
            .check_cooldown("token_refresh:u1", 30)
            .await
            .unwrap_err();
        assert!(retry_after <= Duration::from_secs(30));
        assert!(retry_after > Duration::from_secs(25));

        assert!(limiter.check_cooldown("token_refresh:u2", 30).await.is_ok());
    }

    #[tokio::test]
    async fn test_cooldown_expires() {
        let limiter = RateLimitState::new();
        assert!(limiter.check_cooldown("k", 1).await.is_ok());
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.check_cooldown("k", 1).await.is_ok());
    }

    async fn fake_auth(mut req: Request, next: Next) -> Response {
        let user_id = req
            .headers()
            .get("x-test-user")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .unwrap_or_default();
        req.extensions_mut().insert(AuthUser {
            id: user_id,
            email: "test@example.com".into(),
        });
        next.run(req).await
    }

    fn refresh_app(state: AppState) -> Router {
        Router::new()
            .route("/api/tokens/refresh", post(|| async { "refreshed" }))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_token_refresh,
            ))
            .layer(middleware::from_fn(fake_auth))
            .with_state(state)
    }

    fn refresh_request(user_id: Uuid) -> Request {
        Request::builder()
            .method("POST")
            .uri("/api/tokens/refresh")
            .header("x-test-user", user_id.to_string())
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_refresh_within_cooldown_is_429() {
        let state = AppState::for_tests();
        let user_id = Uuid::new_v4();

        let first = refresh_app(state.clone())
            .oneshot(refresh_request(user_id))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = refresh_app(state.clone())
            .oneshot(refresh_request(user_id))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        let other_user = refresh_app(state)
            .oneshot(refresh_request(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(other_user.status(), StatusCode::OK);
    }
}
