use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{
    self, AuditLogRepository, InvitationRepository, PasswordResetRepository, Provisioned,
    RefreshTokenRepository, RoleRepository, StoreError, StoreResult, TenantProvisioner,
    TenantProvisioning, TenantRepository, UserRepository,
};
use crate::models::{
    AuditLog, Invitation, NewAuditLog, NewInvitation, NewPasswordReset, NewRefreshToken, NewRole,
    NewTenant, NewUser, PasswordReset, RefreshToken, Role, RolePatch, RotateOutcome, Tenant,
    TenantPatch, User, UserPatch, UserStatus,
};

/// Postgres-backed store. Multi-row writes run in one transaction; a dropped
/// transaction rolls back.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for PgStore {
    async fn create(&self, input: NewTenant) -> StoreResult<Tenant> {
        Ok(db::tenants::create(&self.pool, &input).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Tenant>> {
        Ok(db::tenants::find_by_id(&self.pool, id).await?)
    }

    async fn find_by_domain(&self, domain: &str) -> StoreResult<Option<Tenant>> {
        Ok(db::tenants::find_by_domain(&self.pool, domain).await?)
    }

    async fn update(&self, id: Uuid, patch: &TenantPatch) -> StoreResult<Tenant> {
        db::tenants::update(&self.pool, id, patch)
            .await?
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl RoleRepository for PgStore {
    async fn create(&self, input: NewRole) -> StoreResult<Role> {
        Ok(db::roles::create(&self.pool, &input).await?)
    }

    async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Role>> {
        Ok(db::roles::find_by_id(&self.pool, tenant_id, id).await?)
    }

    async fn find_by_name(&self, tenant_id: Uuid, name: &str) -> StoreResult<Option<Role>> {
        Ok(db::roles::find_by_name(&self.pool, tenant_id, name).await?)
    }

    async fn list(&self, tenant_id: Uuid) -> StoreResult<Vec<Role>> {
        Ok(db::roles::list(&self.pool, tenant_id).await?)
    }

    async fn update(&self, tenant_id: Uuid, id: Uuid, patch: &RolePatch) -> StoreResult<Role> {
        db::roles::update(&self.pool, tenant_id, id, patch)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid, cascade: bool) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        if !db::roles::lock(&mut *tx, tenant_id, id).await? {
            return Err(StoreError::NotFound);
        }

        let assigned = db::roles::count_assignments(&mut *tx, tenant_id, id).await?;
        if assigned > 0 {
            if !cascade {
                return Err(StoreError::InUse);
            }
            // refresh tokens follow their users via ON DELETE CASCADE
            db::users::delete_by_role(&mut *tx, tenant_id, id).await?;
        }

        db::roles::delete(&mut *tx, tenant_id, id)
            .await
            .map_err(|e| match StoreError::from(e) {
                StoreError::InvalidReference => StoreError::InUse,
                other => other,
            })?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create(&self, input: NewUser) -> StoreResult<User> {
        Ok(db::users::create(&self.pool, &input).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(db::users::find_by_id(&self.pool, id).await?)
    }

    async fn find_by_email(&self, tenant_id: Uuid, email: &str) -> StoreResult<Option<User>> {
        Ok(db::users::find_by_email(&self.pool, tenant_id, email).await?)
    }

    async fn find_by_email_any(&self, email: &str) -> StoreResult<Vec<User>> {
        Ok(db::users::find_by_email_any(&self.pool, email).await?)
    }

    async fn list(&self, tenant_id: Uuid) -> StoreResult<Vec<User>> {
        Ok(db::users::list_by_tenant(&self.pool, tenant_id).await?)
    }

    async fn update(&self, tenant_id: Uuid, id: Uuid, patch: &UserPatch) -> StoreResult<User> {
        db::users::update(&self.pool, tenant_id, id, patch)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<()> {
        match db::users::delete(&self.pool, tenant_id, id).await? {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RefreshTokenRepository for PgStore {
    async fn create(&self, input: NewRefreshToken) -> StoreResult<RefreshToken> {
        Ok(db::refresh_tokens::create(&self.pool, &input).await?)
    }

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        Ok(db::refresh_tokens::find_by_hash(&self.pool, token_hash).await?)
    }

    async fn rotate(&self, old_id: Uuid, next: NewRefreshToken) -> StoreResult<RotateOutcome> {
        let mut tx = self.pool.begin().await?;
        let successor_id = Uuid::now_v7();

        if !db::refresh_tokens::revoke_for_rotation(&mut *tx, old_id, successor_id).await? {
            // nothing written yet; dropping the transaction rolls back
            return Ok(RotateOutcome::Stale);
        }

        let token = db::refresh_tokens::create_with_id(&mut *tx, successor_id, &next).await?;
        tx.commit().await?;
        Ok(RotateOutcome::Rotated(token))
    }

    async fn revoke_family(&self, family_id: Uuid) -> StoreResult<u64> {
        Ok(db::refresh_tokens::revoke_family(&self.pool, family_id).await?)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        Ok(db::refresh_tokens::revoke_all_for_user(&self.pool, user_id).await?)
    }

    async fn revoke_all_for_tenant(&self, tenant_id: Uuid) -> StoreResult<u64> {
        Ok(db::refresh_tokens::revoke_all_for_tenant(&self.pool, tenant_id).await?)
    }
}

#[async_trait]
impl PasswordResetRepository for PgStore {
    async fn replace_pending(&self, input: NewPasswordReset) -> StoreResult<PasswordReset> {
        let mut tx = self.pool.begin().await?;
        // serializes concurrent requests for the same user
        if !db::users::lock(&mut *tx, input.user_id).await? {
            return Err(StoreError::InvalidReference);
        }
        db::password_resets::expire_pending_for_user(&mut *tx, input.user_id).await?;
        let reset = db::password_resets::create(&mut *tx, &input).await?;
        tx.commit().await?;
        Ok(reset)
    }

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<PasswordReset>> {
        Ok(db::password_resets::find_by_hash(&self.pool, token_hash).await?)
    }

    async fn consume(&self, id: Uuid) -> StoreResult<bool> {
        Ok(db::password_resets::consume(&self.pool, id).await?.is_some())
    }

    async fn redeem(&self, id: Uuid, password_hash: &str) -> StoreResult<Option<Uuid>> {
        let mut tx = self.pool.begin().await?;
        let Some(user_id) = db::password_resets::consume(&mut *tx, id).await? else {
            return Ok(None);
        };
        if !db::users::set_password(&mut *tx, user_id, password_hash).await? {
            return Err(StoreError::NotFound);
        }
        db::refresh_tokens::revoke_all_for_user(&mut *tx, user_id).await?;
        tx.commit().await?;
        Ok(Some(user_id))
    }

    async fn mark_expired(&self, id: Uuid) -> StoreResult<()> {
        Ok(db::password_resets::mark_expired(&self.pool, id).await?)
    }
}

#[async_trait]
impl InvitationRepository for PgStore {
    async fn create(&self, input: NewInvitation) -> StoreResult<Invitation> {
        Ok(db::invitations::create(&self.pool, &input).await?)
    }

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<Invitation>> {
        Ok(db::invitations::find_by_hash(&self.pool, token_hash).await?)
    }

    async fn consume(&self, id: Uuid) -> StoreResult<bool> {
        Ok(db::invitations::consume(&self.pool, id).await?)
    }

    async fn accept(&self, id: Uuid, user: NewUser) -> StoreResult<Option<User>> {
        let mut tx = self.pool.begin().await?;
        if !db::invitations::consume(&mut *tx, id).await? {
            return Ok(None);
        }
        // a failed insert drops the transaction and the invitation stays pending
        let user = db::users::create(&mut *tx, &user).await?;
        tx.commit().await?;
        Ok(Some(user))
    }

    async fn mark_expired(&self, id: Uuid) -> StoreResult<()> {
        Ok(db::invitations::mark_expired(&self.pool, id).await?)
    }
}

#[async_trait]
impl AuditLogRepository for PgStore {
    async fn append(&self, event: NewAuditLog) -> StoreResult<()> {
        Ok(db::audit::append(&self.pool, &event).await?)
    }

    async fn list(&self, tenant_id: Uuid, limit: i64, offset: i64) -> StoreResult<Vec<AuditLog>> {
        Ok(db::audit::list(&self.pool, tenant_id, limit, offset).await?)
    }
}

#[async_trait]
impl TenantProvisioner for PgStore {
    async fn provision(&self, input: TenantProvisioning) -> StoreResult<Provisioned> {
        let mut tx = self.pool.begin().await?;

        let tenant = db::tenants::create(&mut *tx, &input.tenant).await?;
        let role = db::roles::create(
            &mut *tx,
            &NewRole {
                tenant_id: tenant.id,
                name: input.role_name,
                permissions: input.permissions,
            },
        )
        .await?;
        let user = db::users::create(
            &mut *tx,
            &NewUser {
                tenant_id: tenant.id,
                role_id: role.id,
                email: input.owner_email,
                password_hash: input.owner_password_hash,
                full_name: input.owner_full_name,
                status: UserStatus::Active,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(Provisioned { tenant, role, user })
    }
}
