use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;

use crate::auth::CallMetadata;
use crate::error::AppError;
use crate::gate::operation;
use crate::routes::body;
use crate::service::identity::{CreateInvitation, InvitationIssued, RedeemInvitation};
use crate::state::SharedState;
use crate::token::Tokens;

pub async fn create(
    State(state): State<SharedState>,
    meta: CallMetadata,
    req: Result<Json<CreateInvitation>, JsonRejection>,
) -> Result<Json<InvitationIssued>, AppError> {
    let identity = state.identity.clone();
    let req = body(req);
    let issued = state
        .gate
        .call(operation::CREATE_INVITATION, meta, move |ctx| async move {
            identity.create_invitation(&ctx, req?).await
        })
        .await?;
    Ok(Json(issued))
}

pub async fn redeem(
    State(state): State<SharedState>,
    meta: CallMetadata,
    req: Result<Json<RedeemInvitation>, JsonRejection>,
) -> Result<Json<Tokens>, AppError> {
    let identity = state.identity.clone();
    let req = body(req);
    let tokens = state
        .gate
        .call(operation::REDEEM_INVITATION, meta, move |_| async move {
            identity.redeem_invitation(req?).await
        })
        .await?;
    Ok(Json(tokens))
}
