use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Lineage shared by every token rotated from one login.
    pub family_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub revoked: bool,
    /// Set when the token was revoked by rotation.
    pub replaced_by: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Revoked because a successor was issued, as opposed to logout.
    pub fn was_rotated(&self) -> bool {
        self.revoked && self.replaced_by.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub family_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum RotateOutcome {
    Rotated(RefreshToken),
    /// The old token was no longer live when the rotation committed.
    Stale,
}
