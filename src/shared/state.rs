use crate::auth::jwt::JwtManager;
use crate::security::rate_limiter::AuthRateLimiter;
use crate::shared::utils::DbPool;

pub struct AppState {
    pub conn: DbPool,
    pub jwt: JwtManager,
    pub auth_limiter: AuthRateLimiter,
}

impl AppState {
    pub fn new(conn: DbPool, jwt: JwtManager, auth_limiter: AuthRateLimiter) -> Self {
        Self {
            conn,
            jwt,
            auth_limiter,
        }
    }
}
