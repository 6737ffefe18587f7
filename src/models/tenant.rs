use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Patch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Deleted,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub domain: String,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub domain: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantPatch {
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub domain: Patch<String>,
    #[serde(default)]
    pub status: Patch<TenantStatus>,
}

impl TenantPatch {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.name.is_set() && !self.domain.is_set() && !self.status.is_set() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }
        if let Some(name) = self.name.as_set() {
            if name.trim().is_empty() {
                return Err(AppError::Validation("Tenant name cannot be empty".to_string()));
            }
        }
        if let Some(domain) = self.domain.as_set() {
            crate::service::validate::domain(domain)?;
        }
        if self.status.as_set() == Some(&TenantStatus::Deleted) {
            return Err(AppError::Validation(
                "Use tenant deletion to mark a tenant deleted".to_string(),
            ));
        }
        Ok(())
    }
}
