use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Patch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Invited,
    Suspended,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub role_id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub tenant_id: Uuid,
    pub role_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub status: UserStatus,
}

/// Partial user update. `password_hash` and `last_login_at` are set by the
/// core only and never read from request bodies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub full_name: Patch<String>,
    #[serde(default)]
    pub email: Patch<String>,
    #[serde(default)]
    pub role_id: Patch<Uuid>,
    #[serde(default)]
    pub status: Patch<UserStatus>,
    #[serde(skip)]
    pub password_hash: Patch<String>,
    #[serde(skip)]
    pub last_login_at: Patch<DateTime<Utc>>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        !(self.full_name.is_set()
            || self.email.is_set()
            || self.role_id.is_set()
            || self.status.is_set()
            || self.password_hash.is_set()
            || self.last_login_at.is_set())
    }

    /// Whether the patch touches fields only a tenant-wide grant may change.
    pub fn is_privileged(&self) -> bool {
        self.role_id.is_set() || self.status.is_set()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.is_empty() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }
        if let Some(name) = self.full_name.as_set() {
            if name.trim().is_empty() {
                return Err(AppError::Validation("Full name cannot be empty".to_string()));
            }
        }
        if let Some(email) = self.email.as_set() {
            crate::service::validate::email(email)?;
        }
        Ok(())
    }
}
