use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{NewRefreshToken, RefreshToken};

pub async fn create<'e, E: PgExecutor<'e>>(
    executor: E,
    input: &NewRefreshToken,
) -> Result<RefreshToken, sqlx::Error> {
    create_with_id(executor, Uuid::now_v7(), input).await
}

pub async fn find_by_hash<'e, E: PgExecutor<'e>>(
    executor: E,
    token_hash: &str,
) -> Result<Option<RefreshToken>, sqlx::Error> {
    sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE token_hash = $1")
        .bind(token_hash)
        .fetch_optional(executor)
        .await
}

/// Revoke a live token, recording its successor. Returns false if it was
/// already revoked.
pub async fn revoke_for_rotation<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    successor: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked = true, replaced_by = $2
         WHERE id = $1 AND revoked = false",
    )
    .bind(id)
    .bind(successor)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn create_with_id<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    input: &NewRefreshToken,
) -> Result<RefreshToken, sqlx::Error> {
    sqlx::query_as::<_, RefreshToken>(
        "INSERT INTO refresh_tokens (id, user_id, family_id, token_hash, expires_at)
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(id)
    .bind(input.user_id)
    .bind(input.family_id)
    .bind(&input.token_hash)
    .bind(input.expires_at)
    .fetch_one(executor)
    .await
}

pub async fn revoke_family<'e, E: PgExecutor<'e>>(
    executor: E,
    family_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked = true WHERE family_id = $1 AND revoked = false",
    )
    .bind(family_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn revoke_all_for_user<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked = true WHERE user_id = $1 AND revoked = false",
    )
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn revoke_all_for_tenant<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked = true
         WHERE revoked = false
           AND user_id IN (SELECT id FROM users WHERE tenant_id = $1)",
    )
    .bind(tenant_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
