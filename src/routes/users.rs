use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use uuid::Uuid;

use crate::auth::CallMetadata;
use crate::error::AppError;
use crate::gate::operation;
use crate::models::{User, UserPatch};
use crate::routes::{MessageResponse, body, path};
use crate::state::SharedState;

pub async fn list(
    State(state): State<SharedState>,
    meta: CallMetadata,
) -> Result<Json<Vec<User>>, AppError> {
    let directory = state.directory.clone();
    let users = state
        .gate
        .call(operation::LIST_USERS, meta, move |ctx| async move {
            directory.list_users(&ctx).await
        })
        .await?;
    Ok(Json(users))
}

pub async fn get(
    State(state): State<SharedState>,
    meta: CallMetadata,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<User>, AppError> {
    let directory = state.directory.clone();
    let id = path(id);
    let user = state
        .gate
        .call(operation::GET_USER, meta, move |ctx| async move {
            directory.get_user(&ctx, id?).await
        })
        .await?;
    Ok(Json(user))
}

pub async fn update(
    State(state): State<SharedState>,
    meta: CallMetadata,
    id: Result<Path<Uuid>, PathRejection>,
    patch: Result<Json<UserPatch>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let directory = state.directory.clone();
    let (id, patch) = (path(id), body(patch));
    let user = state
        .gate
        .call(operation::UPDATE_USER, meta, move |ctx| async move {
            directory.update_user(&ctx, id?, patch?).await
        })
        .await?;
    Ok(Json(user))
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
        .call(operation::DELETE_USER, meta, move |ctx| async move {
            directory.delete_user(&ctx, id?).await
        })
        .await?;
    Ok(Json(MessageResponse::new("Deleted")))
}
