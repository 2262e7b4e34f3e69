use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};

use crate::auth::identity::bearer_token;
use crate::auth::jwt::JwtManager;
use crate::error::ApiError;
use crate::shared::state::AppState;

pub type KeyedRateLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

/// Per-caller sliding-window limiter applied across the API. Counters are
/// keyed by the validated token subject when a bearer token is present,
/// otherwise by peer IP, and are shared across concurrent requests.
pub struct AuthRateLimiter {
    limiter: KeyedRateLimiter,
}

impl AuthRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        const DEFAULT_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(60) {
            Some(v) => v,
            None => unreachable!(),
        };
        let quota =
            Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(DEFAULT_PER_MINUTE));
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    pub fn check(&self, key: &str) -> bool {
        self.limiter.check_key(&key.to_string()).is_ok()
    }
}

impl Default for AuthRateLimiter {
    fn default() -> Self {
        Self::new(60)
    }
}

/// A bearer token identifies the caller by its validated subject, so every
/// user gets a bucket of their own. Unauthenticated (or unverifiable)
/// traffic is keyed by peer IP.
pub fn caller_key(jwt: &JwtManager, headers: &HeaderMap, addr: SocketAddr) -> String {
    bearer_token(headers)
        .and_then(|token| jwt.validate_token(token).ok())
        .map(|claims| format!("user:{}", claims.sub))
        .unwrap_or_else(|| addr.ip().to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = caller_key(&state.jwt, request.headers(), addr);
    if !state.auth_limiter.check(&key) {
        return ApiError::RateLimited.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    #[test]
    fn sixty_first_request_in_window_is_rejected() {
        let limiter = AuthRateLimiter::new(60);
        for _ in 0..60 {
            assert!(limiter.check("caller"));
        }
        assert!(!limiter.check("caller"));
    }

    #[test]
    fn callers_are_limited_independently() {
        let limiter = AuthRateLimiter::new(60);
        for _ in 0..60 {
            assert!(limiter.check("first"));
        }
        assert!(!limiter.check("first"));
        assert!(limiter.check("second"));
    }

    #[test]
    fn zero_config_falls_back_to_default_quota() {
        let limiter = AuthRateLimiter::new(0);
        assert!(limiter.check("caller"));
    }

    fn manager() -> JwtManager {
        JwtManager::from_secret("rate-limit-test-secret-key-long-enough").unwrap()
    }

    fn bearer_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn test_user(name: &str) -> crate::shared::models::User {
        crate::shared::models::User {
            id: uuid::Uuid::new_v4(),
            username: name.into(),
            email: format!("{name}@example.com"),
            password_hash: "x".into(),
            role: "user".into(),
            is_superuser: false,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn distinct_tokens_get_distinct_keys() {
        let jwt = manager();
        let first = test_user("first");
        let second = test_user("second");
        let token_a = jwt.generate_token_pair(&first).unwrap().access_token;
        let token_b = jwt.generate_token_pair(&second).unwrap().access_token;
        let addr: SocketAddr = "10.1.2.3:443".parse().unwrap();

        let key_a = caller_key(&jwt, &bearer_headers(&token_a), addr);
        let key_b = caller_key(&jwt, &bearer_headers(&token_b), addr);
        assert_eq!(key_a, format!("user:{}", first.id));
        assert_eq!(key_b, format!("user:{}", second.id));
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn same_user_keys_identically_from_any_address() {
        let jwt = manager();
        let user = test_user("roamer");
        let token = jwt.generate_token_pair(&user).unwrap().access_token;
        let headers = bearer_headers(&token);

        let here = caller_key(&jwt, &headers, "10.0.0.1:1000".parse().unwrap());
        let there = caller_key(&jwt, &headers, "192.168.9.9:2000".parse().unwrap());
        assert_eq!(here, there);
    }

    #[test]
    fn unverifiable_token_falls_back_to_peer_address() {
        let jwt = manager();
        let addr: SocketAddr = "10.1.2.3:443".parse().unwrap();

        let key = caller_key(&jwt, &bearer_headers("not-a-real-token"), addr);
        assert_eq!(key, "10.1.2.3");

        assert_eq!(caller_key(&jwt, &HeaderMap::new(), addr), "10.1.2.3");
    }
}
