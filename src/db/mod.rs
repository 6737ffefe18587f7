//! Storage seam.
//!
//! Every trait method is a single atomic unit: implementations must not let a
//! concurrent caller observe a half-applied method. The core relies on that
//! for refresh rotation, single-use redemption and tenant provisioning.

pub mod audit;
pub mod invitations;
pub mod memory;
pub mod password_resets;
pub mod postgres;
pub mod refresh_tokens;
pub mod roles;
pub mod tenants;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::authz::PermissionSet;
use crate::models::{
    AuditLog, Invitation, NewAuditLog, NewInvitation, NewPasswordReset, NewRefreshToken, NewRole,
    NewTenant, NewUser, PasswordReset, RefreshToken, Role, RolePatch, RotateOutcome, Tenant,
    TenantPatch, User, UserPatch,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Uniqueness constraints the schema enforces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    TenantDomain,
    UserEmail,
    RoleName,
    Other(String),
}

impl Constraint {
    pub fn from_name(name: &str) -> Self {
        match name {
            "tenants_domain_key" => Constraint::TenantDomain,
            "users_email_key" => Constraint::UserEmail,
            "roles_tenant_id_name_key" => Constraint::RoleName,
            other => Constraint::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0:?}")]
    Conflict(Constraint),
    #[error("row not found")]
    NotFound,
    #[error("row is still referenced")]
    InUse,
    #[error("foreign reference crosses tenants or does not exist")]
    InvalidReference,
    #[error(transparent)]
    Database(sqlx::Error),
    #[error("{0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                let name = db_err.constraint().unwrap_or_default();
                return StoreError::Conflict(Constraint::from_name(name));
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::InvalidReference;
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn create(&self, input: NewTenant) -> StoreResult<Tenant>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Tenant>>;
    async fn find_by_domain(&self, domain: &str) -> StoreResult<Option<Tenant>>;
    async fn update(&self, id: Uuid, patch: &TenantPatch) -> StoreResult<Tenant>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn create(&self, input: NewRole) -> StoreResult<Role>;
    async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Role>>;
    async fn find_by_name(&self, tenant_id: Uuid, name: &str) -> StoreResult<Option<Role>>;
    async fn list(&self, tenant_id: Uuid) -> StoreResult<Vec<Role>>;
    async fn update(&self, tenant_id: Uuid, id: Uuid, patch: &RolePatch) -> StoreResult<Role>;
    /// Delete a role. Without `cascade` a role still assigned to users fails
    /// with `InUse`; with it, those users go too.
    async fn delete(&self, tenant_id: Uuid, id: Uuid, cascade: bool) -> StoreResult<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, input: NewUser) -> StoreResult<User>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_by_email(&self, tenant_id: Uuid, email: &str) -> StoreResult<Option<User>>;
    /// Every user with this email, across tenants.
    async fn find_by_email_any(&self, email: &str) -> StoreResult<Vec<User>>;
    async fn list(&self, tenant_id: Uuid) -> StoreResult<Vec<User>>;
    async fn update(&self, tenant_id: Uuid, id: Uuid, patch: &UserPatch) -> StoreResult<User>;
    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn create(&self, input: NewRefreshToken) -> StoreResult<RefreshToken>;
    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>>;
    /// Revoke `old_id` (only if still live) and insert its successor.
    async fn rotate(&self, old_id: Uuid, next: NewRefreshToken) -> StoreResult<RotateOutcome>;
    async fn revoke_family(&self, family_id: Uuid) -> StoreResult<u64>;
    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64>;
    async fn revoke_all_for_tenant(&self, tenant_id: Uuid) -> StoreResult<u64>;
}

#[async_trait]
pub trait PasswordResetRepository: Send + Sync {
    /// Expire any pending reset for the user and insert the new one.
    async fn replace_pending(&self, input: NewPasswordReset) -> StoreResult<PasswordReset>;
    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<PasswordReset>>;
    /// pending → used, only if still pending and unexpired. Returns whether it flipped.
    async fn consume(&self, id: Uuid) -> StoreResult<bool>;
    /// Consume the reset, store the new password hash and revoke every
    /// refresh token of its user, as one unit. `None` when the reset was no
    /// longer pending; nothing is written then.
    async fn redeem(&self, id: Uuid, password_hash: &str) -> StoreResult<Option<Uuid>>;
    async fn mark_expired(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait InvitationRepository: Send + Sync {
    async fn create(&self, input: NewInvitation) -> StoreResult<Invitation>;
    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<Invitation>>;
    async fn consume(&self, id: Uuid) -> StoreResult<bool>;
    /// Consume the invitation and insert its user together. `None` when the
    /// invitation was no longer pending. A failed insert leaves it pending.
    async fn accept(&self, id: Uuid, user: NewUser) -> StoreResult<Option<User>>;
    async fn mark_expired(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(&self, event: NewAuditLog) -> StoreResult<()>;
    async fn list(&self, tenant_id: Uuid, limit: i64, offset: i64) -> StoreResult<Vec<AuditLog>>;
}

/// Input for creating a tenant, its owner role and owner user together.
#[derive(Debug, Clone)]
pub struct TenantProvisioning {
    pub tenant: NewTenant,
    pub role_name: String,
    pub permissions: PermissionSet,
    pub owner_email: String,
    pub owner_password_hash: String,
    pub owner_full_name: String,
}

#[derive(Debug, Clone)]
pub struct Provisioned {
    pub tenant: Tenant,
    pub role: Role,
    pub user: User,
}

#[async_trait]
pub trait TenantProvisioner: Send + Sync {
    /// All three rows commit together or none does.
    async fn provision(&self, input: TenantProvisioning) -> StoreResult<Provisioned>;
}

/// The repositories the core works against.
#[derive(Clone)]
pub struct Repositories {
    pub tenants: Arc<dyn TenantRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub users: Arc<dyn UserRepository>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
    pub password_resets: Arc<dyn PasswordResetRepository>,
    pub invitations: Arc<dyn InvitationRepository>,
    pub audit: Arc<dyn AuditLogRepository>,
    pub provisioner: Arc<dyn TenantProvisioner>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self::from_store(Arc::new(PgStore::new(pool)))
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }

    /// Bundle a store that implements every repository.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: TenantRepository
            + RoleRepository
            + UserRepository
            + RefreshTokenRepository
            + PasswordResetRepository
            + InvitationRepository
            + AuditLogRepository
            + TenantProvisioner
            + 'static,
    {
        Self {
            tenants: store.clone(),
            roles: store.clone(),
            users: store.clone(),
            refresh_tokens: store.clone(),
            password_resets: store.clone(),
            invitations: store.clone(),
            audit: store.clone(),
            provisioner: store,
        }
    }
}
