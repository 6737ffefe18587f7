use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::PermissionSet;
use crate::error::AppError;
use crate::models::Patch;

/// Name of the role created for a tenant's first user.
pub const OWNER_ROLE: &str = "owner";
/// Name of the role standalone users receive in the shared tenant.
pub const MEMBER_ROLE: &str = "member";

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    #[sqlx(json)]
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub tenant_id: Uuid,
    pub name: String,
    pub permissions: PermissionSet,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RolePatch {
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub permissions: Patch<PermissionSet>,
}

impl RolePatch {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.name.is_set() && !self.permissions.is_set() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }
        if let Some(name) = self.name.as_set() {
            crate::service::validate::role_name(name)?;
        }
        if let Some(permissions) = self.permissions.as_set() {
            permissions.validate()?;
        }
        Ok(())
    }
}
