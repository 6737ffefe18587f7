pub mod audit;
pub mod auth;
pub mod invitations;
pub mod roles;
pub mod tenant;
pub mod users;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::error::AppError;
use crate::state::SharedState;

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

// Handlers extract fallibly and unwrap inside the gate, so a malformed
// request is still authenticated and audited before it is refused.

pub(crate) fn body<T>(extracted: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    extracted
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

pub(crate) fn path<T>(extracted: Result<Path<T>, PathRejection>) -> Result<T, AppError> {
    extracted
        .map(|Path(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

pub(crate) fn query<T>(extracted: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    extracted
        .map(|Query(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Auth
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/register-tenant", post(auth::register_tenant))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/password-reset", post(auth::request_password_reset))
        .route(
            "/api/v1/auth/password-reset/redeem",
            post(auth::redeem_password_reset),
        )
        .route("/api/v1/auth/change-password", post(auth::change_password))
        // Invitations
        .route("/api/v1/invitations", post(invitations::create))
        .route("/api/v1/invitations/redeem", post(invitations::redeem))
        // Tenant
        .route(
            "/api/v1/tenant",
            get(tenant::get_tenant)
                .put(tenant::update_tenant)
                .delete(tenant::delete_tenant),
        )
        // Roles
        .route("/api/v1/roles", get(roles::list).post(roles::create))
        .route(
            "/api/v1/roles/{id}",
            get(roles::get).put(roles::update).delete(roles::delete),
        )
        // Users
        .route("/api/v1/users", get(users::list))
        .route(
            "/api/v1/users/{id}",
            get(users::get).put(users::update).delete(users::delete),
        )
        // Audit
        .route("/api/v1/audit", get(audit::list))
}
