use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;

use crate::auth::CallMetadata;
use crate::error::AppError;
use crate::gate::operation;
use crate::models::{Tenant, TenantPatch};
use crate::routes::{MessageResponse, body};
use crate::state::SharedState;

pub async fn get_tenant(
    State(state): State<SharedState>,
    meta: CallMetadata,
) -> Result<Json<Tenant>, AppError> {
    let directory = state.directory.clone();
    let tenant = state
        .gate
        .call(operation::GET_TENANT, meta, move |ctx| async move {
            directory.get_tenant(&ctx).await
        })
        .await?;
    Ok(Json(tenant))
}

pub async fn update_tenant(
    State(state): State<SharedState>,
    meta: CallMetadata,
    patch: Result<Json<TenantPatch>, JsonRejection>,
) -> Result<Json<Tenant>, AppError> {
    let directory = state.directory.clone();
    let patch = body(patch);
    let tenant = state
        .gate
        .call(operation::UPDATE_TENANT, meta, move |ctx| async move {
            directory.update_tenant(&ctx, patch?).await
        })
        .await?;
    Ok(Json(tenant))
}

pub async fn delete_tenant(
    State(state): State<SharedState>,
    meta: CallMetadata,
) -> Result<Json<MessageResponse>, AppError> {
    let directory = state.directory.clone();
    state
        .gate
        .call(operation::DELETE_TENANT, meta, move |ctx| async move {
            directory.delete_tenant(&ctx).await
        })
        .await?;
    Ok(Json(MessageResponse::new("Deleted")))
}
