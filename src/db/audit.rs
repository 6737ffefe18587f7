use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{AuditLog, NewAuditLog};

pub async fn append<'e, E: PgExecutor<'e>>(
    executor: E,
    event: &NewAuditLog,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_logs (id, user_id, tenant_id, action, outcome, ip_address, user_agent)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(Uuid::now_v7())
    .bind(event.user_id)
    .bind(event.tenant_id)
    .bind(&event.action)
    .bind(event.outcome.to_string())
    .bind(&event.ip_address)
    .bind(&event.user_agent)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditLog>, sqlx::Error> {
    sqlx::query_as::<_, AuditLog>(
        "SELECT * FROM audit_logs WHERE tenant_id = $1
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(tenant_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await
}
