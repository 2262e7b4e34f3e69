pub mod identity;
pub mod jwt;
pub mod password;

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ValidationErrors};
use crate::shared::extract::ApiJson;
use crate::shared::models::{Role, User};
use crate::shared::schema::users;
use crate::shared::state::AppState;

use identity::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub username: String,
    pub email: String,
    pub role: String,
    pub access: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh: String,
}

/// Field checks that need no database access. Uniqueness is checked against
/// the store afterwards.
fn validate_registration(req: &RegisterRequest) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    if req.username.trim().is_empty() {
        errors.add("username", "This field may not be blank");
    }
    if req.email.trim().is_empty() || !req.email.contains('@') {
        errors.add("email", "Enter a valid email address");
    }
    if req.password.is_empty() {
        errors.add("password", "This field may not be blank");
    }
    if let Some(role) = req.role.as_deref() {
        if Role::parse(role).is_none() {
            errors.add("role", "Must be one of: user, agent, admin");
        }
    }
    errors
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    validate_registration(&req).into_result()?;

    let role = req.role.as_deref().unwrap_or("user");
    let mut conn = state.conn.get()?;

    let mut errors = ValidationErrors::new();
    let username_taken: i64 = users::table
        .filter(users::username.eq(&req.username))
        .count()
        .get_result(&mut conn)?;
    if username_taken > 0 {
        errors.add("username", "A user with that username already exists");
    }
    let email_taken: i64 = users::table
        .filter(users::email.eq(&req.email))
        .count()
        .get_result(&mut conn)?;
    if email_taken > 0 {
        errors.add("email", "A user with that email already exists");
    }
    errors.into_result()?;

    let user = User {
        id: Uuid::new_v4(),
        username: req.username,
        email: req.email,
        password_hash: password::hash_password(&req.password)?,
        role: role.to_string(),
        is_superuser: false,
        created_at: Utc::now(),
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)?;

    info!("registered user {} with role {}", user.username, user.role);

    let pair = state.jwt.generate_token_pair(&user)?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            username: user.username,
            email: user.email,
            role: user.role,
            access: pair.access_token,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = state.conn.get()?;

    let user = users::table
        .filter(users::username.eq(&req.username))
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::Authentication("Invalid credentials".into()))?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::Authentication("Invalid credentials".into()));
    }

    let pair = state.jwt.generate_token_pair(&user)?;
    Ok(Json(json!({
        "refresh": pair.refresh_token,
        "access": pair.access_token,
        "user": {
            "username": user.username,
            "role": user.role,
            "is_superuser": user.is_superuser,
        },
    })))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let claims = state
        .jwt
        .validate_refresh_token(&req.refresh)
        .map_err(|_| ApiError::Authentication("Invalid or expired refresh token".into()))?;
    let user_id = claims
        .user_id()
        .map_err(|_| ApiError::Authentication("Invalid or expired refresh token".into()))?;

    let mut conn = state.conn.get()?;
    let user = users::table
        .find(user_id)
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::Authentication("Invalid or expired refresh token".into()))?;

    let access = state
        .jwt
        .refresh_access_token(&req.refresh, &user)
        .map_err(|_| ApiError::Authentication("Invalid or expired refresh token".into()))?;
    Ok(Json(json!({ "access": access })))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<serde_json::Value> {
    Json(json!({
        "username": user.username,
        "email": user.email,
        "role": user.role,
        "is_superuser": user.is_superuser,
    }))
}

/// The open, rate-limited entry points. `/me` is registered with the
/// authenticated routes in the server module.
pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}
