use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub action: String,
    pub outcome: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub action: String,
    pub outcome: AuditOutcome,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// How a gated call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    /// Stopped by the gate before reaching the handler, or cut off by the deadline.
    Rejected(ErrorKind),
    /// The handler ran and returned an error (or faulted).
    Failed(ErrorKind),
    /// Refresh-token replay; kept apart for security monitoring.
    ReuseDetected,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Rejected(kind) => write!(f, "rejected:{}", kind.as_str()),
            AuditOutcome::Failed(kind) => write!(f, "failed:{}", kind.as_str()),
            AuditOutcome::ReuseDetected => write!(f, "reuse_detected"),
        }
    }
}
