//! Role → permission resolution and capability checks.
//!
//! Tenant isolation is checked before any grant is consulted, and every
//! failure path (unknown capability, missing role, storage error) denies.

pub mod permission;

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::auth::Identity;
use crate::db::RoleRepository;
use crate::error::AppError;

pub use permission::{Capability, Grant, GrantScope, PermissionSet};

/// The tenant a resource lives in and, for user-owned resources, its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRef {
    pub tenant_id: Uuid,
    pub owner_id: Option<Uuid>,
}

impl ResourceRef {
    pub fn tenant(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            owner_id: None,
        }
    }

    pub fn owned(tenant_id: Uuid, owner_id: Uuid) -> Self {
        Self {
            tenant_id,
            owner_id: Some(owner_id),
        }
    }
}

/// Built once per call; the role cache never outlives it.
pub struct AuthorizationResolver {
    roles: Arc<dyn RoleRepository>,
    cache: DashMap<(Uuid, Uuid), PermissionSet>,
}

impl AuthorizationResolver {
    pub fn new(roles: Arc<dyn RoleRepository>) -> Self {
        Self {
            roles,
            cache: DashMap::new(),
        }
    }

    pub async fn resolve(&self, tenant_id: Uuid, role_id: Uuid) -> Result<PermissionSet, AppError> {
        if let Some(cached) = self.cache.get(&(tenant_id, role_id)) {
            return Ok(cached.clone());
        }

        let role = self
            .roles
            .find_by_id(tenant_id, role_id)
            .await?
            .ok_or(AppError::NotFound("Role"))?;
        self.cache.insert((tenant_id, role_id), role.permissions.clone());
        Ok(role.permissions)
    }

    /// Check a capability by name. Names the engine does not know are denied.
    pub async fn check(&self, identity: &Identity, capability: &str, resource: &ResourceRef) -> bool {
        match capability.parse::<Capability>() {
            Ok(capability) => self.allows(identity, capability, resource).await,
            Err(()) => false,
        }
    }

    pub async fn allows(
        &self,
        identity: &Identity,
        capability: Capability,
        resource: &ResourceRef,
    ) -> bool {
        if identity.tenant_id != resource.tenant_id {
            return false;
        }

        match self.scope(identity, capability).await {
            Some(GrantScope::Tenant) => true,
            Some(GrantScope::Own) => resource.owner_id == Some(identity.user_id),
            None => false,
        }
    }

    /// Effective scope of `capability` for the identity's role, within its
    /// own tenant.
    pub async fn scope(&self, identity: &Identity, capability: Capability) -> Option<GrantScope> {
        match self.resolve(identity.tenant_id, identity.role_id).await {
            Ok(permissions) => permissions.scope_for(capability),
            Err(e) => {
                tracing::warn!(
                    role_id = %identity.role_id,
                    capability = %capability,
                    "Denying: role could not be resolved: {e}"
                );
                None
            }
        }
    }

    pub async fn require(
        &self,
        identity: &Identity,
        capability: Capability,
        resource: &ResourceRef,
    ) -> Result<(), AppError> {
        if self.allows(identity, capability, resource).await {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("Missing capability {capability}")))
        }
    }

    /// A caller may only hand out grants it holds itself.
    pub async fn require_grantable(
        &self,
        identity: &Identity,
        conferred: &PermissionSet,
    ) -> Result<(), AppError> {
        let held = match self.resolve(identity.tenant_id, identity.role_id).await {
            Ok(held) => held,
            Err(e) => {
                tracing::warn!(
                    role_id = %identity.role_id,
                    "Denying grant: role could not be resolved: {e}"
                );
                return Err(AppError::Forbidden("Role could not be resolved".to_string()));
            }
        };
        if conferred.is_within(&held) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Cannot grant permissions beyond your own".to_string(),
            ))
        }
    }
}
