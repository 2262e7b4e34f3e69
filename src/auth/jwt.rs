use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::models::User;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub leeway_seconds: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuer: "ticketd".into(),
            audience: "ticketd-api".into(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            leeway_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Claims {
    pub fn new(
        user_id: Uuid,
        issuer: &str,
        audience: &str,
        token_type: TokenType,
        expiry: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            exp: expiry.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: token_type.as_str().to_string(),
            username: None,
            role: None,
        }
    }

    pub fn with_username(mut self, username: String) -> Self {
        self.username = Some(username);
        self
    }

    pub fn with_role(mut self, role: String) -> Self {
        self.role = Some(role);
        self
    }

    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|e| anyhow!("Invalid user ID in claims: {e}"))
    }

    pub fn is_access_token(&self) -> bool {
        self.token_type == TokenType::Access.as_str()
    }

    pub fn is_refresh_token(&self) -> bool {
        self.token_type == TokenType::Refresh.as_str()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(config: JwtConfig, secret: &str) -> Result<Self> {
        if secret.len() < 32 {
            return Err(anyhow!("JWT secret must be at least 32 characters"));
        }
        Ok(Self {
            config,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    pub fn from_secret(secret: &str) -> Result<Self> {
        Self::new(JwtConfig::default(), secret)
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode token: {e}"))
    }

    /// Issues an access/refresh pair carrying the user's name and role so
    /// downstream consumers can identify the caller without a lookup.
    pub fn generate_token_pair(&self, user: &User) -> Result<TokenPair> {
        let now = Utc::now();
        let access_expiry = now + Duration::minutes(self.config.access_token_expiry_minutes);
        let refresh_expiry = now + Duration::days(self.config.refresh_token_expiry_days);

        let access_claims = Claims::new(
            user.id,
            &self.config.issuer,
            &self.config.audience,
            TokenType::Access,
            access_expiry,
        )
        .with_username(user.username.clone())
        .with_role(user.role.clone());

        let refresh_claims = Claims::new(
            user.id,
            &self.config.issuer,
            &self.config.audience,
            TokenType::Refresh,
            refresh_expiry,
        );

        Ok(TokenPair {
            access_token: self.encode_claims(&access_claims)?,
            refresh_token: self.encode_claims(&refresh_claims)?,
            token_type: "Bearer".into(),
            expires_in: self.config.access_token_expiry_minutes * 60,
            refresh_expires_in: self.config.refresh_token_expiry_days * 24 * 60 * 60,
        })
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.leeway = self.config.leeway_seconds;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| anyhow!("Token validation failed: {e}"))
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        let claims = self.validate_token(token)?;
        if !claims.is_access_token() {
            return Err(anyhow!("Expected an access token"));
        }
        Ok(claims)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims> {
        let claims = self.validate_token(token)?;
        if !claims.is_refresh_token() {
            return Err(anyhow!("Expected a refresh token"));
        }
        Ok(claims)
    }

    /// Exchanges a valid refresh token for a fresh access token.
    pub fn refresh_access_token(&self, refresh_token: &str, user: &User) -> Result<String> {
        let claims = self.validate_refresh_token(refresh_token)?;
        if claims.user_id()? != user.id {
            return Err(anyhow!("Refresh token does not belong to this user"));
        }

        let expiry = Utc::now() + Duration::minutes(self.config.access_token_expiry_minutes);
        let access_claims = Claims::new(
            user.id,
            &self.config.issuer,
            &self.config.audience,
            TokenType::Access,
            expiry,
        )
        .with_username(user.username.clone())
        .with_role(user.role.clone());

        self.encode_claims(&access_claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const TEST_SECRET: &str = "unit-test-secret-key-that-is-long-enough";

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "user1".into(),
            email: "user1@example.com".into(),
            password_hash: "x".into(),
            role: "user".into(),
            is_superuser: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn short_secret_is_rejected() {
        assert!(JwtManager::from_secret("too-short").is_err());
    }

    #[test]
    fn token_pair_round_trips() {
        let manager = JwtManager::from_secret(TEST_SECRET).unwrap();
        let user = test_user();
        let pair = manager.generate_token_pair(&user).unwrap();

        let claims = manager.validate_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);
        assert_eq!(claims.username.as_deref(), Some("user1"));
        assert_eq!(claims.role.as_deref(), Some("user"));

        let refresh = manager.validate_refresh_token(&pair.refresh_token).unwrap();
        assert_eq!(refresh.user_id().unwrap(), user.id);
    }

    #[test]
    fn refresh_token_is_not_accepted_as_access() {
        let manager = JwtManager::from_secret(TEST_SECRET).unwrap();
        let pair = manager.generate_token_pair(&test_user()).unwrap();

        assert!(manager.validate_access_token(&pair.refresh_token).is_err());
        assert!(manager.validate_refresh_token(&pair.access_token).is_err());
    }

    #[test]
    fn tampered_token_fails_validation() {
        let manager = JwtManager::from_secret(TEST_SECRET).unwrap();
        let other = JwtManager::from_secret("another-secret-key-also-long-enough!!").unwrap();
        let pair = manager.generate_token_pair(&test_user()).unwrap();

        assert!(other.validate_access_token(&pair.access_token).is_err());
    }

    #[test]
    fn refresh_flow_issues_usable_access_token() {
        let manager = JwtManager::from_secret(TEST_SECRET).unwrap();
        let user = test_user();
        let pair = manager.generate_token_pair(&user).unwrap();

        let access = manager
            .refresh_access_token(&pair.refresh_token, &user)
            .unwrap();
        let claims = manager.validate_access_token(&access).unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);
    }

    #[test]
    fn refresh_for_wrong_user_is_rejected() {
        let manager = JwtManager::from_secret(TEST_SECRET).unwrap();
        let pair = manager.generate_token_pair(&test_user()).unwrap();
        let other = test_user();

        assert!(manager
            .refresh_access_token(&pair.refresh_token, &other)
            .is_err());
    }
}
