use sqlx::PgExecutor;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{NewRole, Role, RolePatch};

pub async fn create<'e, E: PgExecutor<'e>>(
    executor: E,
    input: &NewRole,
) -> Result<Role, sqlx::Error> {
    sqlx::query_as::<_, Role>(
        "INSERT INTO roles (id, tenant_id, name, permissions)
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(input.tenant_id)
    .bind(&input.name)
    .bind(Json(&input.permissions))
    .fetch_one(executor)
    .await
}

pub async fn find_by_id<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Option<Role>, sqlx::Error> {
    sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE tenant_id = $1 AND id = $2")
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn find_by_name<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    name: &str,
) -> Result<Option<Role>, sqlx::Error> {
    sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE tenant_id = $1 AND name = $2")
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(executor)
        .await
}

pub async fn list<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
) -> Result<Vec<Role>, sqlx::Error> {
    sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE tenant_id = $1 ORDER BY created_at")
        .bind(tenant_id)
        .fetch_all(executor)
        .await
}

pub async fn update<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
    patch: &RolePatch,
) -> Result<Option<Role>, sqlx::Error> {
    sqlx::query_as::<_, Role>(
        "UPDATE roles SET
             name = COALESCE($3, name),
             permissions = COALESCE($4, permissions)
         WHERE tenant_id = $1 AND id = $2 RETURNING *",
    )
    .bind(tenant_id)
    .bind(id)
    .bind(patch.name.as_set())
    .bind(patch.permissions.as_set().map(Json))
    .fetch_optional(executor)
    .await
}

/// Lock the role row so assignments cannot change until the transaction ends.
pub async fn lock<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<bool, sqlx::Error> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM roles WHERE tenant_id = $1 AND id = $2 FOR UPDATE")
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(executor)
            .await?;
    Ok(row.is_some())
}

pub async fn count_assignments<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE tenant_id = $1 AND role_id = $2")
            .bind(tenant_id)
            .bind(id)
            .fetch_one(executor)
            .await?;
    Ok(row.0)
}

pub async fn delete<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM roles WHERE tenant_id = $1 AND id = $2")
        .bind(tenant_id)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
