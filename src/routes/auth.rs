use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::Deserialize;

use crate::auth::CallMetadata;
use crate::error::AppError;
use crate::gate::operation;
use crate::routes::{MessageResponse, body};
use crate::service::identity::{
    ChangePassword, Credentials, RedeemPasswordReset, RegisterTenant, RegisterUser,
};
use crate::state::SharedState;
use crate::token::Tokens;

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

pub async fn register(
    State(state): State<SharedState>,
    meta: CallMetadata,
    req: Result<Json<RegisterUser>, JsonRejection>,
) -> Result<Json<Tokens>, AppError> {
    let identity = state.identity.clone();
    let req = body(req);
    let tokens = state
        .gate
        .call(operation::REGISTER_STANDALONE_USER, meta, move |_| async move {
            identity.register_standalone_user(req?).await
        })
        .await?;
    Ok(Json(tokens))
}

pub async fn register_tenant(
    State(state): State<SharedState>,
    meta: CallMetadata,
    req: Result<Json<RegisterTenant>, JsonRejection>,
) -> Result<Json<Tokens>, AppError> {
    let identity = state.identity.clone();
    let req = body(req);
    let tokens = state
        .gate
        .call(operation::REGISTER_TENANT_WITH_OWNER, meta, move |_| async move {
            identity.register_tenant_with_owner(req?).await
        })
        .await?;
    Ok(Json(tokens))
}

pub async fn login(
    State(state): State<SharedState>,
    meta: CallMetadata,
    req: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<Tokens>, AppError> {
    let identity = state.identity.clone();
    let req = body(req);
    let tokens = state
        .gate
        .call(operation::LOGIN, meta, move |ctx| async move {
            identity.login(ctx.tenant_id(), req?).await
        })
        .await?;
    Ok(Json(tokens))
}

pub async fn refresh(
    State(state): State<SharedState>,
    meta: CallMetadata,
    req: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<Tokens>, AppError> {
    let identity = state.identity.clone();
    let req = body(req);
    let tokens = state
        .gate
        .call(operation::REFRESH_SESSION, meta, move |_| async move {
            let req = req?;
            identity.refresh_session(&req.refresh_token).await
        })
        .await?;
    Ok(Json(tokens))
}

pub async fn logout(
    State(state): State<SharedState>,
    meta: CallMetadata,
    req: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let identity = state.identity.clone();
    let req = body(req);
    state
        .gate
        .call(operation::LOGOUT, meta, move |_| async move {
            let req = req?;
            identity.logout(&req.refresh_token).await
        })
        .await?;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

pub async fn request_password_reset(
    State(state): State<SharedState>,
    meta: CallMetadata,
    req: Result<Json<PasswordResetRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let identity = state.identity.clone();
    let req = body(req);
    state
        .gate
        .call(operation::REQUEST_PASSWORD_RESET, meta, move |ctx| async move {
            let tenant_id = ctx.tenant_id().ok_or(AppError::MissingTenant)?;
            let req = req?;
            identity.request_password_reset(tenant_id, &req.email).await
        })
        .await?;
    // Same answer whether or not the account exists
    Ok(Json(MessageResponse::new(
        "If that email is registered, a reset token has been sent.",
    )))
}

pub async fn redeem_password_reset(
    State(state): State<SharedState>,
    meta: CallMetadata,
    req: Result<Json<RedeemPasswordReset>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let identity = state.identity.clone();
    let req = body(req);
    state
        .gate
        .call(operation::REDEEM_PASSWORD_RESET, meta, move |_| async move {
            identity.redeem_password_reset(req?).await
        })
        .await?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

pub async fn change_password(
    State(state): State<SharedState>,
    meta: CallMetadata,
    req: Result<Json<ChangePassword>, JsonRejection>,
) -> Result<Json<Tokens>, AppError> {
    let identity = state.identity.clone();
    let req = body(req);
    let tokens = state
        .gate
        .call(operation::CHANGE_PASSWORD, meta, move |ctx| async move {
            identity.change_password(ctx.identity()?, req?).await
        })
        .await?;
    Ok(Json(tokens))
}
