use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use diesel::prelude::*;

use crate::error::ApiError;
use crate::shared::models::User;
use crate::shared::schema::users;
use crate::shared::state::AppState;

/// The authenticated actor behind a request, resolved fresh from the store
/// on every request so role changes take effect immediately.
pub struct CurrentUser(pub User);

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            ApiError::Authentication("Authentication credentials were not provided".into())
        })?;

        let claims = state
            .jwt
            .validate_access_token(token)
            .map_err(|_| ApiError::Authentication("Invalid or expired token".into()))?;
        let user_id = claims
            .user_id()
            .map_err(|_| ApiError::Authentication("Invalid or expired token".into()))?;

        let mut conn = state.conn.get()?;
        let user = users::table
            .find(user_id)
            .first::<User>(&mut conn)
            .optional()?
            .ok_or_else(|| ApiError::Authentication("Invalid or expired token".into()))?;

        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn missing_or_malformed_header_yields_none() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
