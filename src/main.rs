use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ticketd::auth::jwt::{JwtConfig, JwtManager};
use ticketd::bootstrap::ensure_seed_accounts;
use ticketd::config::AppConfig;
use ticketd::security::rate_limiter::AuthRateLimiter;
use ticketd::server;
use ticketd::shared::state::AppState;
use ticketd::shared::utils::create_conn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;

    let pool = create_conn(&config.database)?;
    ensure_seed_accounts(&pool)?;

    let jwt_config = JwtConfig {
        access_token_expiry_minutes: config.auth.access_token_expiry_minutes,
        refresh_token_expiry_days: config.auth.refresh_token_expiry_days,
        ..JwtConfig::default()
    };
    let jwt = JwtManager::new(jwt_config, &config.auth.jwt_secret)?;

    let state = Arc::new(AppState::new(pool, jwt, AuthRateLimiter::default()));
    server::run(&config.server, state).await
}
