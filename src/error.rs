use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{Constraint, StoreError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification every error collapses into at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Unauthenticated,
    Forbidden,
    ReuseDetected,
    Timeout,
    RateLimited,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::ReuseDetected => "reuse_detected",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Internal => "internal",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthenticated | ErrorKind::ReuseDetected => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("A tenant with this domain already exists")]
    TenantExists,

    #[error("A user with this email already exists in the tenant")]
    EmailExists,

    #[error("A role with this name already exists in the tenant")]
    RoleNameExists,

    #[error("Role is still assigned to users")]
    RoleInUse,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Tenant identifier is required")]
    MissingTenant,

    #[error("{0}")]
    Unauthenticated(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has been revoked")]
    Revoked,

    #[error("Token has already been used")]
    AlreadyUsed,

    /// Carries the token owner so the event can be attributed.
    #[error("Refresh token reuse detected. All sessions revoked.")]
    ReuseDetected {
        user_id: Uuid,
        tenant_id: Option<Uuid>,
    },

    #[error("{0}")]
    Forbidden(String),

    #[error("Call exceeded its deadline")]
    Timeout,

    #[error("{0}")]
    RateLimited(String),

    #[error("Internal error: {0}")]
    Internal(#[source] BoxError),
}

impl AppError {
    pub fn internal(err: impl Into<BoxError>) -> Self {
        AppError::Internal(err.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) | AppError::MissingTenant => ErrorKind::Validation,
            AppError::TenantExists
            | AppError::EmailExists
            | AppError::RoleNameExists
            | AppError::RoleInUse
            | AppError::AlreadyUsed => ErrorKind::Conflict,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Unauthenticated(_)
            | AppError::TokenExpired
            | AppError::InvalidSignature
            | AppError::Revoked => ErrorKind::Unauthenticated,
            AppError::ReuseDetected { .. } => ErrorKind::ReuseDetected,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::Timeout => ErrorKind::Timeout,
            AppError::RateLimited(_) => ErrorKind::RateLimited,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = match &self {
            AppError::Internal(cause) => {
                tracing::error!("Internal error: {cause}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({ "error": message, "kind": kind });
        (kind.status(), axum::Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(Constraint::TenantDomain) => AppError::TenantExists,
            StoreError::Conflict(Constraint::UserEmail) => AppError::EmailExists,
            StoreError::Conflict(Constraint::RoleName) => AppError::RoleNameExists,
            StoreError::Conflict(Constraint::Other(name)) => {
                AppError::internal(format!("unexpected unique violation on {name}"))
            }
            StoreError::NotFound => AppError::NotFound("Record"),
            StoreError::InUse => AppError::RoleInUse,
            StoreError::InvalidReference => {
                AppError::Validation("Referenced role does not belong to the tenant".to_string())
            }
            StoreError::Database(e) => AppError::internal(e),
            StoreError::Backend(msg) => AppError::internal(msg),
        }
    }
}
