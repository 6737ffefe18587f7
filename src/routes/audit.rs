use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};

use crate::auth::CallMetadata;
use crate::error::AppError;
use crate::gate::operation;
use crate::models::AuditLog;
use crate::routes::query;
use crate::service::directory::Page;
use crate::state::SharedState;

pub async fn list(
    State(state): State<SharedState>,
    meta: CallMetadata,
    page: Result<Query<Page>, QueryRejection>,
) -> Result<Json<Vec<AuditLog>>, AppError> {
    let directory = state.directory.clone();
    let page = query(page);
    let events = state
        .gate
        .call(operation::LIST_AUDIT, meta, move |ctx| async move {
            directory.list_audit(&ctx, page?).await
        })
        .await?;
    Ok(Json(events))
}
