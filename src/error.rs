use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::error;

/// Field-keyed validation messages, rendered as the `message` object of the
/// error envelope the same way DRF-style field errors look on the wire.
#[derive(Debug, Default)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        json!(self.0)
    }

    /// Ok when no field failed, otherwise the 400 error carrying the map.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.into_value()))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation error")]
    Validation(Value),
    #[error("{0}")]
    Authentication(String),
    #[error("Forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("rate limit exceeded")]
    RateLimited,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(Value::String(message.into()))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `message` payload of the envelope: a plain string for most
    /// variants, a field-error map for field validation failures.
    pub fn envelope(&self) -> Value {
        let code = self.status_code().as_u16();
        let message = match self {
            Self::Validation(value) => value.clone(),
            Self::Authentication(message) => Value::String(message.clone()),
            Self::Forbidden => Value::String("Forbidden".to_string()),
            Self::NotFound(entity) => Value::String(format!("{entity} not found")),
            Self::RateLimited => {
                Value::String("Too many requests, please try again later".to_string())
            }
            Self::Internal(_) => Value::String("Internal server error".to_string()),
        };
        json!({"error": {"message": message, "code": code}})
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref cause) = self {
            error!("internal error: {cause:#}");
        }
        (self.status_code(), Json(self.envelope())).into_response()
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => Self::NotFound("Resource"),
            other => Self::Internal(anyhow::Error::new(other).context("database error")),
        }
    }
}

impl From<diesel::r2d2::PoolError> for ApiError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::Internal(anyhow::Error::new(err).context("connection pool error"))
    }
}
