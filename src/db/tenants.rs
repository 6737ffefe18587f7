use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{NewTenant, Tenant, TenantPatch, TenantStatus};

pub async fn create<'e, E: PgExecutor<'e>>(
    executor: E,
    input: &NewTenant,
) -> Result<Tenant, sqlx::Error> {
    sqlx::query_as::<_, Tenant>(
        "INSERT INTO tenants (id, name, domain, status)
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&input.name)
    .bind(&input.domain)
    .bind(TenantStatus::Active)
    .fetch_one(executor)
    .await
}

pub async fn find_by_id<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<Tenant>, sqlx::Error> {
    sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn find_by_domain<'e, E: PgExecutor<'e>>(
    executor: E,
    domain: &str,
) -> Result<Option<Tenant>, sqlx::Error> {
    sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE domain = $1")
        .bind(domain)
        .fetch_optional(executor)
        .await
}

/// Absent patch fields bind as NULL and keep the stored value.
pub async fn update<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    patch: &TenantPatch,
) -> Result<Option<Tenant>, sqlx::Error> {
    sqlx::query_as::<_, Tenant>(
        "UPDATE tenants SET
             name = COALESCE($2, name),
             domain = COALESCE($3, domain),
             status = COALESCE($4, status),
             updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(patch.name.as_set())
    .bind(patch.domain.as_set())
    .bind(patch.status.as_set().copied())
    .fetch_optional(executor)
    .await
}
