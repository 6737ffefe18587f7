use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{NewPasswordReset, PasswordReset, TokenStatus};

pub async fn expire_pending_for_user<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE password_resets SET status = $2 WHERE user_id = $1 AND status = $3",
    )
    .bind(user_id)
    .bind(TokenStatus::Expired)
    .bind(TokenStatus::Pending)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn create<'e, E: PgExecutor<'e>>(
    executor: E,
    input: &NewPasswordReset,
) -> Result<PasswordReset, sqlx::Error> {
    sqlx::query_as::<_, PasswordReset>(
        "INSERT INTO password_resets (id, user_id, token_hash, status, expires_at)
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(input.user_id)
    .bind(&input.token_hash)
    .bind(TokenStatus::Pending)
    .bind(input.expires_at)
    .fetch_one(executor)
    .await
}

pub async fn find_by_hash<'e, E: PgExecutor<'e>>(
    executor: E,
    token_hash: &str,
) -> Result<Option<PasswordReset>, sqlx::Error> {
    sqlx::query_as::<_, PasswordReset>("SELECT * FROM password_resets WHERE token_hash = $1")
        .bind(token_hash)
        .fetch_optional(executor)
        .await
}

/// Flip a pending, unexpired reset to used and return its user.
pub async fn consume<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        "UPDATE password_resets SET status = $2
         WHERE id = $1 AND status = $3 AND expires_at > now()
         RETURNING user_id",
    )
    .bind(id)
    .bind(TokenStatus::Used)
    .bind(TokenStatus::Pending)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|(user_id,)| user_id))
}

pub async fn mark_expired<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE password_resets SET status = $2 WHERE id = $1 AND status = $3")
        .bind(id)
        .bind(TokenStatus::Expired)
        .bind(TokenStatus::Pending)
        .execute(executor)
        .await?;
    Ok(())
}
