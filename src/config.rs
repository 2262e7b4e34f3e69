use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let port = match env::var("TICKETD_PORT") {
            Ok(value) => value.parse().context("TICKETD_PORT is not a valid port")?,
            Err(_) => 8080,
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://ticketd:@localhost:5432/ticketd".to_string()),
            max_connections: match env::var("DATABASE_MAX_CONNECTIONS") {
                Ok(value) => value
                    .parse()
                    .context("DATABASE_MAX_CONNECTIONS is not a number")?,
                Err(_) => 10,
            },
        };

        let auth = AuthConfig {
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                tracing::warn!(
                    "JWT_SECRET not set, using default development secret - DO NOT USE IN PRODUCTION"
                );
                "dev-secret-key-change-in-production-minimum-32-chars".to_string()
            }),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        };

        Ok(Self {
            server: ServerConfig { port },
            database,
            auth,
        })
    }
}
