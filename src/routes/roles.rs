use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use uuid::Uuid;

use crate::auth::CallMetadata;
use crate::error::AppError;
use crate::gate::operation;
use crate::models::{Role, RolePatch};
use crate::routes::{MessageResponse, body, path};
use crate::service::directory::CreateRole;
use crate::state::SharedState;

pub async fn list(
    State(state): State<SharedState>,
    meta: CallMetadata,
) -> Result<Json<Vec<Role>>, AppError> {
    let directory = state.directory.clone();
    let roles = state
        .gate
        .call(operation::LIST_ROLES, meta, move |ctx| async move {
            directory.list_roles(&ctx).await
        })
        .await?;
    Ok(Json(roles))
}

pub async fn get(
    State(state): State<SharedState>,
    meta: CallMetadata,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Role>, AppError> {
    let directory = state.directory.clone();
    let id = path(id);
    let role = state
        .gate
        .call(operation::GET_ROLE, meta, move |ctx| async move {
            directory.get_role(&ctx, id?).await
        })
        .await?;
    Ok(Json(role))
}

pub async fn create(
    State(state): State<SharedState>,
    meta: CallMetadata,
    req: Result<Json<CreateRole>, JsonRejection>,
) -> Result<Json<Role>, AppError> {
    let directory = state.directory.clone();
    let req = body(req);
    let role = state
        .gate
        .call(operation::CREATE_ROLE, meta, move |ctx| async move {
            directory.create_role(&ctx, req?).await
        })
        .await?;
    Ok(Json(role))
}

pub async fn update(
    State(state): State<SharedState>,
    meta: CallMetadata,
    id: Result<Path<Uuid>, PathRejection>,
    patch: Result<Json<RolePatch>, JsonRejection>,
) -> Result<Json<Role>, AppError> {
    let directory = state.directory.clone();
    let (id, patch) = (path(id), body(patch));
    let role = state
        .gate
        .call(operation::UPDATE_ROLE, meta, move |ctx| async move {
            directory.update_role(&ctx, id?, patch?).await
        })
        .await?;
    Ok(Json(role))
}

pub async fn delete(
    State(state): State<SharedState>,
    meta: CallMetadata,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let directory = state.directory.clone();
    let id = path(id);
    state
        .gate
        .call(operation::DELETE_ROLE, meta, move |ctx| async move {
            directory.delete_role(&ctx, id?).await
        })
        .await?;
    Ok(Json(MessageResponse::new("Deleted")))
}
