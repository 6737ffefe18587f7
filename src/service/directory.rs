use serde::Deserialize;
use uuid::Uuid;

use crate::authz::{Capability, GrantScope, PermissionSet, ResourceRef};
use crate::config::RoleDeletePolicy;
use crate::db::Repositories;
use crate::error::AppError;
use crate::gate::CallContext;
use crate::models::{
    AuditLog, NewRole, Patch, Role, RolePatch, Tenant, TenantPatch, TenantStatus, User, UserPatch,
    UserStatus,
};
use crate::service::validate;
use crate::token::TokenEngine;

#[derive(Debug, Deserialize)]
pub struct CreateRole {
    pub name: String,
    #[serde(default)]
    pub permissions: PermissionSet,
}

#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// Tenant, role and user administration, plus the audit trail. Every method
/// runs behind the gate and re-checks the grant against the concrete
/// resource it touches.
#[derive(Clone)]
pub struct DirectoryService {
    repos: Repositories,
    tokens: TokenEngine,
    role_delete: RoleDeletePolicy,
}

impl DirectoryService {
    pub fn new(repos: Repositories, tokens: TokenEngine, role_delete: RoleDeletePolicy) -> Self {
        Self {
            repos,
            tokens,
            role_delete,
        }
    }

    // ── Tenant ──────────────────────────────────────────────────────

    pub async fn get_tenant(&self, ctx: &CallContext) -> Result<Tenant, AppError> {
        let tenant_id = require(ctx, Capability::TenantRead).await?;
        self.repos
            .tenants
            .find_by_id(tenant_id)
            .await?
            .ok_or(AppError::NotFound("Tenant"))
    }

    pub async fn update_tenant(
        &self,
        ctx: &CallContext,
        mut patch: TenantPatch,
    ) -> Result<Tenant, AppError> {
        let tenant_id = require(ctx, Capability::TenantUpdate).await?;
        patch.domain = patch.domain.map(|d| d.trim().to_lowercase());
        patch.validate()?;

        let tenant = self.repos.tenants.update(tenant_id, &patch).await?;
        if patch.status.is_set() && !tenant.is_active() {
            let revoked = self.tokens.revoke_all_for_tenant(tenant_id).await?;
            tracing::info!(tenant_id = %tenant_id, revoked, "Tenant deactivated");
        }
        Ok(tenant)
    }

    /// Soft delete: the row stays with status `deleted`, sessions end.
    pub async fn delete_tenant(&self, ctx: &CallContext) -> Result<(), AppError> {
        let tenant_id = require(ctx, Capability::TenantDelete).await?;
        let patch = TenantPatch {
            status: Patch::Set(TenantStatus::Deleted),
            ..TenantPatch::default()
        };
        self.repos.tenants.update(tenant_id, &patch).await?;
        let revoked = self.tokens.revoke_all_for_tenant(tenant_id).await?;
        tracing::info!(tenant_id = %tenant_id, revoked, "Tenant deleted");
        Ok(())
    }

    // ── Roles ───────────────────────────────────────────────────────

    pub async fn list_roles(&self, ctx: &CallContext) -> Result<Vec<Role>, AppError> {
        let tenant_id = require(ctx, Capability::RoleRead).await?;
        Ok(self.repos.roles.list(tenant_id).await?)
    }

    pub async fn get_role(&self, ctx: &CallContext, id: Uuid) -> Result<Role, AppError> {
        let tenant_id = require(ctx, Capability::RoleRead).await?;
        self.repos
            .roles
            .find_by_id(tenant_id, id)
            .await?
            .ok_or(AppError::NotFound("Role"))
    }

    pub async fn create_role(&self, ctx: &CallContext, req: CreateRole) -> Result<Role, AppError> {
        let tenant_id = require(ctx, Capability::RoleWrite).await?;
        let name = req.name.trim().to_string();
        validate::role_name(&name)?;
        req.permissions.validate()?;
        self.require_grantable(ctx, &req.permissions).await?;

        Ok(self
            .repos
            .roles
            .create(NewRole {
                tenant_id,
                name,
                permissions: req.permissions,
            })
            .await?)
    }

    pub async fn update_role(
        &self,
        ctx: &CallContext,
        id: Uuid,
        mut patch: RolePatch,
    ) -> Result<Role, AppError> {
        let tenant_id = require(ctx, Capability::RoleWrite).await?;
        patch.name = patch.name.map(|n| n.trim().to_string());
        patch.validate()?;

        // both the grants being replaced and their replacement must be within reach
        let role = self
            .repos
            .roles
            .find_by_id(tenant_id, id)
            .await?
            .ok_or(AppError::NotFound("Role"))?;
        self.require_grantable(ctx, &role.permissions).await?;
        if let Some(permissions) = patch.permissions.as_set() {
            self.require_grantable(ctx, permissions).await?;
        }
        Ok(self.repos.roles.update(tenant_id, id, &patch).await?)
    }

    pub async fn delete_role(&self, ctx: &CallContext, id: Uuid) -> Result<(), AppError> {
        let tenant_id = require(ctx, Capability::RoleDelete).await?;
        if let Some(role) = self.repos.roles.find_by_id(tenant_id, id).await? {
            self.require_grantable(ctx, &role.permissions).await?;
        }
        let cascade = self.role_delete == RoleDeletePolicy::Cascade;
        self.repos
            .roles
            .delete(tenant_id, id, cascade)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::NotFound(_) => AppError::NotFound("Role"),
                other => other,
            })
    }

    // ── Users ───────────────────────────────────────────────────────

    /// Tenant-wide readers see everyone; `own` readers see themselves.
    pub async fn list_users(&self, ctx: &CallContext) -> Result<Vec<User>, AppError> {
        let identity = ctx.identity()?;
        match ctx.authz.scope(&identity, Capability::UserRead).await {
            Some(GrantScope::Tenant) => Ok(self.repos.users.list(identity.tenant_id).await?),
            Some(GrantScope::Own) => Ok(self
                .repos
                .users
                .find_by_id(identity.user_id)
                .await?
                .into_iter()
                .collect()),
            None => Err(AppError::Forbidden(format!(
                "Missing capability {}",
                Capability::UserRead
            ))),
        }
    }

    pub async fn get_user(&self, ctx: &CallContext, id: Uuid) -> Result<User, AppError> {
        let identity = ctx.identity()?;
        let user = self.user_in_tenant(identity.tenant_id, id).await?;
        ctx.authz
            .require(&identity, Capability::UserRead, &owned_by(&user))
            .await?;
        Ok(user)
    }

    /// Role and status changes need a tenant-wide grant; `own` grants cover
    /// profile fields only.
    pub async fn update_user(
        &self,
        ctx: &CallContext,
        id: Uuid,
        mut patch: UserPatch,
    ) -> Result<User, AppError> {
        let identity = ctx.identity()?;
        patch.email = patch.email.map(|e| validate::normalize_email(&e));
        patch.full_name = patch.full_name.map(|n| n.trim().to_string());
        patch.validate()?;

        let user = self.user_in_tenant(identity.tenant_id, id).await?;
        ctx.authz
            .require(&identity, Capability::UserWrite, &owned_by(&user))
            .await?;
        if patch.is_privileged() {
            ctx.authz
                .require(&identity, Capability::UserWrite, &ResourceRef::tenant(user.tenant_id))
                .await?;
        }
        if let Some(role_id) = patch.role_id.as_set() {
            // the user's current grants and the assigned ones must both be within reach
            for role_id in [user.role_id, *role_id] {
                let role = self
                    .repos
                    .roles
                    .find_by_id(user.tenant_id, role_id)
                    .await?
                    .ok_or(AppError::NotFound("Role"))?;
                self.require_grantable(ctx, &role.permissions).await?;
            }
        }

        let updated = self.repos.users.update(user.tenant_id, user.id, &patch).await?;
        if patch.status.is_set() && updated.status != UserStatus::Active {
            self.tokens.revoke_all(updated.id).await?;
        }
        Ok(updated)
    }

    pub async fn delete_user(&self, ctx: &CallContext, id: Uuid) -> Result<(), AppError> {
        let identity = ctx.identity()?;
        let user = self.user_in_tenant(identity.tenant_id, id).await?;
        ctx.authz
            .require(&identity, Capability::UserDelete, &owned_by(&user))
            .await?;
        self.repos.users.delete(user.tenant_id, user.id).await?;
        tracing::info!(user_id = %user.id, deleted_by = %identity.user_id, "User deleted");
        Ok(())
    }

    // ── Audit ───────────────────────────────────────────────────────

    pub async fn list_audit(&self, ctx: &CallContext, page: Page) -> Result<Vec<AuditLog>, AppError> {
        let tenant_id = require(ctx, Capability::AuditRead).await?;
        let limit = page.limit.clamp(1, 200);
        let offset = page.offset.max(0);
        Ok(self.repos.audit.list(tenant_id, limit, offset).await?)
    }

    async fn require_grantable(
        &self,
        ctx: &CallContext,
        permissions: &PermissionSet,
    ) -> Result<(), AppError> {
        ctx.authz
            .require_grantable(&ctx.identity()?, permissions)
            .await
    }

    /// Users of other tenants look exactly like missing ones.
    async fn user_in_tenant(&self, tenant_id: Uuid, id: Uuid) -> Result<User, AppError> {
        self.repos
            .users
            .find_by_id(id)
            .await?
            .filter(|user| user.tenant_id == tenant_id)
            .ok_or(AppError::NotFound("User"))
    }
}

/// Tenant-wide check of `capability` on the caller's own tenant.
async fn require(ctx: &CallContext, capability: Capability) -> Result<Uuid, AppError> {
    let identity = ctx.identity()?;
    ctx.authz
        .require(&identity, capability, &ResourceRef::tenant(identity.tenant_id))
        .await?;
    Ok(identity.tenant_id)
}

fn owned_by(user: &User) -> ResourceRef {
    ResourceRef::owned(user.tenant_id, user.id)
}
