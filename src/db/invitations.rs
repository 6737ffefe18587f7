use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{Invitation, NewInvitation, TokenStatus};

pub async fn create<'e, E: PgExecutor<'e>>(
    executor: E,
    input: &NewInvitation,
) -> Result<Invitation, sqlx::Error> {
    sqlx::query_as::<_, Invitation>(
        "INSERT INTO invitations (id, tenant_id, role_id, email, token_hash, status, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(input.tenant_id)
    .bind(input.role_id)
    .bind(&input.email)
    .bind(&input.token_hash)
    .bind(TokenStatus::Pending)
    .bind(input.expires_at)
    .fetch_one(executor)
    .await
}

pub async fn find_by_hash<'e, E: PgExecutor<'e>>(
    executor: E,
    token_hash: &str,
) -> Result<Option<Invitation>, sqlx::Error> {
    sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE token_hash = $1")
        .bind(token_hash)
        .fetch_optional(executor)
        .await
}

pub async fn consume<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE invitations SET status = $2
         WHERE id = $1 AND status = $3 AND expires_at > now()",
    )
    .bind(id)
    .bind(TokenStatus::Used)
    .bind(TokenStatus::Pending)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_expired<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE invitations SET status = $2 WHERE id = $1 AND status = $3")
        .bind(id)
        .bind(TokenStatus::Expired)
        .bind(TokenStatus::Pending)
        .execute(executor)
        .await?;
    Ok(())
}
