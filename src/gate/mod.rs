//! Request gate: every RPC goes through `Gate::call`.
//!
//! Extract → authenticate → bind identity → authorize → dispatch, then
//! exactly one audit event. The pipeline runs as its own task so the audit
//! event is written even if the caller goes away mid-call.

pub mod operation;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::auth::Identity;
use crate::auth::extractor::{CallMetadata, Presented};
use crate::authz::AuthorizationResolver;
use crate::db::RoleRepository;
use crate::error::AppError;
use crate::middleware::audit::AuditSink;
use crate::models::{AuditOutcome, NewAuditLog};
use crate::token::TokenEngine;

pub use operation::{Access, Operation};

/// What a handler receives once the gate admits a call.
pub struct CallContext {
    identity: Option<Identity>,
    tenant_id: Option<Uuid>,
    pub authz: Arc<AuthorizationResolver>,
}

impl CallContext {
    /// The authenticated caller. Always present for `Access::Authenticated`.
    pub fn identity(&self) -> Result<Identity, AppError> {
        self.identity
            .ok_or_else(|| AppError::Unauthenticated("Authentication required".to_string()))
    }

    /// The caller's tenant, else the tenant named in metadata.
    pub fn tenant_id(&self) -> Option<Uuid> {
        self.tenant_id
    }
}

#[derive(Clone)]
pub struct Gate {
    tokens: TokenEngine,
    roles: Arc<dyn RoleRepository>,
    audit: Arc<dyn AuditSink>,
    call_timeout: Duration,
}

impl Gate {
    pub fn new(
        tokens: TokenEngine,
        roles: Arc<dyn RoleRepository>,
        audit: Arc<dyn AuditSink>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            tokens,
            roles,
            audit,
            call_timeout,
        }
    }

    pub async fn call<T, F, Fut>(
        &self,
        op: Operation,
        meta: CallMetadata,
        handler: F,
    ) -> Result<T, AppError>
    where
        F: FnOnce(CallContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
        T: Send + 'static,
    {
        let gate = self.clone();
        tokio::spawn(async move { gate.run(op, meta, handler).await })
            .await
            .map_err(|e| AppError::internal(format!("Gate task failed: {e}")))?
    }

    async fn run<T, F, Fut>(self, op: Operation, meta: CallMetadata, handler: F) -> Result<T, AppError>
    where
        F: FnOnce(CallContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
        T: Send + 'static,
    {
        let (actor, tenant_id, outcome, result) = match self.admit(op, &meta).await {
            Err(e) => {
                let tenant_id = match meta.tenant {
                    Presented::Valid(id) => Some(id),
                    _ => None,
                };
                (None, tenant_id, AuditOutcome::Rejected(e.kind()), Err(e))
            }
            Ok(ctx) => {
                let actor = ctx.identity.map(|identity| identity.user_id);
                let tenant_id = ctx.tenant_id;
                let (outcome, result) = self.dispatch(op, ctx, handler).await;
                // refresh calls are anonymous; reuse is charged to the token's owner
                let (actor, tenant_id) = match &result {
                    Err(AppError::ReuseDetected {
                        user_id,
                        tenant_id: owner_tenant,
                    }) => (Some(*user_id), owner_tenant.or(tenant_id)),
                    _ => (actor, tenant_id),
                };
                (actor, tenant_id, outcome, result)
            }
        };

        self.audit
            .emit(NewAuditLog {
                user_id: actor,
                tenant_id,
                action: op.name.to_string(),
                outcome,
                ip_address: meta.origin,
                user_agent: meta.user_agent,
            })
            .await;

        result
    }

    async fn admit(&self, op: Operation, meta: &CallMetadata) -> Result<CallContext, AppError> {
        let tenant_hint = match meta.tenant {
            Presented::Valid(id) => Some(id),
            Presented::Malformed => {
                return Err(AppError::Validation("Invalid tenant identifier".to_string()));
            }
            Presented::Absent if op.tenant_scoped => return Err(AppError::MissingTenant),
            Presented::Absent => None,
        };

        let identity = match &meta.bearer {
            Presented::Valid(token) => Some(self.tokens.validate_access(token)?),
            Presented::Malformed => {
                return Err(AppError::Unauthenticated(
                    "Malformed authorization header".to_string(),
                ));
            }
            Presented::Absent => None,
        };
        if op.access == Access::Authenticated && identity.is_none() {
            return Err(AppError::Unauthenticated("Missing bearer token".to_string()));
        }

        if let (Some(identity), Some(tenant)) = (identity, tenant_hint) {
            if identity.tenant_id != tenant {
                return Err(AppError::Forbidden("Cross-tenant access denied".to_string()));
            }
        }

        let authz = Arc::new(AuthorizationResolver::new(self.roles.clone()));
        if let Some(capability) = op.capability {
            let identity = identity
                .ok_or_else(|| AppError::Unauthenticated("Authentication required".to_string()))?;
            // any scope admits here; handlers narrow `own` grants per resource
            if authz.scope(&identity, capability).await.is_none() {
                return Err(AppError::Forbidden(format!("Missing capability {capability}")));
            }
        }

        Ok(CallContext {
            identity,
            tenant_id: identity.map(|identity| identity.tenant_id).or(tenant_hint),
            authz,
        })
    }

    async fn dispatch<T, F, Fut>(
        &self,
        op: Operation,
        ctx: CallContext,
        handler: F,
    ) -> (AuditOutcome, Result<T, AppError>)
    where
        F: FnOnce(CallContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
        T: Send + 'static,
    {
        let mut task = tokio::spawn(handler(ctx));

        match tokio::time::timeout(self.call_timeout, &mut task).await {
            Err(_) => {
                task.abort();
                tracing::warn!(operation = op.name, "Call exceeded its deadline");
                (AuditOutcome::Rejected(AppError::Timeout.kind()), Err(AppError::Timeout))
            }
            Ok(Err(join_err)) => {
                tracing::error!(operation = op.name, "Handler faulted: {join_err}");
                let err = AppError::internal(format!("Handler faulted: {join_err}"));
                (AuditOutcome::Failed(err.kind()), Err(err))
            }
            Ok(Ok(Ok(value))) => (AuditOutcome::Success, Ok(value)),
            Ok(Ok(Err(e @ AppError::ReuseDetected { .. }))) => (AuditOutcome::ReuseDetected, Err(e)),
            Ok(Ok(Err(e))) => (AuditOutcome::Failed(e.kind()), Err(e)),
        }
    }
}
