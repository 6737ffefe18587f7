use std::sync::Arc;

use async_trait::async_trait;

use crate::db::AuditLogRepository;
use crate::models::{AuditOutcome, NewAuditLog};

/// Receives the one audit event every gated call produces.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn emit(&self, event: NewAuditLog);
}

/// Appends events to the audit log repository. A failed write is logged and
/// never fails the call it describes.
pub struct RepositoryAuditSink {
    repo: Arc<dyn AuditLogRepository>,
}

impl RepositoryAuditSink {
    pub fn new(repo: Arc<dyn AuditLogRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl AuditSink for RepositoryAuditSink {
    async fn emit(&self, event: NewAuditLog) {
        let actor = event
            .user_id
            .map_or_else(|| "anonymous".to_string(), |id| id.to_string());

        match event.outcome {
            AuditOutcome::ReuseDetected => tracing::warn!(
                action = %event.action,
                actor = %actor,
                origin = event.ip_address.as_deref().unwrap_or("-"),
                "Refresh token reuse"
            ),
            outcome => tracing::info!(
                action = %event.action,
                actor = %actor,
                outcome = %outcome,
                "Call audited"
            ),
        }

        if let Err(e) = self.repo.append(event).await {
            tracing::error!("Failed to log audit event: {e}");
        }
    }
}
