use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{NewUser, User, UserPatch};

pub async fn create<'e, E: PgExecutor<'e>>(
    executor: E,
    input: &NewUser,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (id, tenant_id, role_id, email, password_hash, full_name, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(input.tenant_id)
    .bind(input.role_id)
    .bind(&input.email)
    .bind(&input.password_hash)
    .bind(&input.full_name)
    .bind(input.status)
    .fetch_one(executor)
    .await
}

pub async fn find_by_id<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Lock the user row until the transaction ends.
pub async fn lock<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<bool, sqlx::Error> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row.is_some())
}

pub async fn set_password<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    password_hash: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(executor)
            .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn find_by_email<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE tenant_id = $1 AND email = $2")
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(executor)
        .await
}

pub async fn find_by_email_any<'e, E: PgExecutor<'e>>(
    executor: E,
    email: &str,
) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_all(executor)
        .await
}

pub async fn list_by_tenant<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE tenant_id = $1 ORDER BY created_at DESC",
    )
    .bind(tenant_id)
    .fetch_all(executor)
    .await
}

pub async fn update<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
    patch: &UserPatch,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "UPDATE users SET
             full_name = COALESCE($3, full_name),
             email = COALESCE($4, email),
             role_id = COALESCE($5, role_id),
             status = COALESCE($6, status),
             password_hash = COALESCE($7, password_hash),
             last_login_at = COALESCE($8, last_login_at),
             updated_at = now()
         WHERE tenant_id = $1 AND id = $2 RETURNING *",
    )
    .bind(tenant_id)
    .bind(id)
    .bind(patch.full_name.as_set())
    .bind(patch.email.as_set())
    .bind(patch.role_id.as_set().copied())
    .bind(patch.status.as_set().copied())
    .bind(patch.password_hash.as_set())
    .bind(patch.last_login_at.as_set().copied())
    .fetch_optional(executor)
    .await
}

pub async fn delete<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE tenant_id = $1 AND id = $2")
        .bind(tenant_id)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_by_role<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    role_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE tenant_id = $1 AND role_id = $2")
        .bind(tenant_id)
        .bind(role_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
