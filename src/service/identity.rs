use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{CredentialHasher, Identity};
use crate::authz::PermissionSet;
use crate::config::StandaloneTenantPolicy;
use crate::db::{Repositories, TenantProvisioning};
use crate::error::AppError;
use crate::gate::CallContext;
use crate::models::role::{MEMBER_ROLE, OWNER_ROLE};
use crate::models::{NewRole, NewTenant, NewUser, Patch, User, UserPatch, UserStatus};
use crate::notify::{Notice, Notifier};
use crate::rate_limit::LoginRateLimiter;
use crate::service::validate;
use crate::token::{SingleUseKind, SingleUseSubject, TokenEngine, Tokens};

#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterTenant {
    pub company_name: String,
    pub domain: String,
    pub owner_email: String,
    pub owner_password: String,
    pub owner_full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct RedeemPasswordReset {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvitation {
    pub email: String,
    pub role_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RedeemInvitation {
    pub token: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Serialize)]
pub struct InvitationIssued {
    pub tenant_id: Uuid,
    pub role_id: Uuid,
    pub email: String,
}

/// Registration, login and credential flows.
#[derive(Clone)]
pub struct IdentityService {
    repos: Repositories,
    tokens: TokenEngine,
    hasher: Arc<dyn CredentialHasher>,
    notifier: Arc<dyn Notifier>,
    login_limiter: Arc<LoginRateLimiter>,
    standalone: StandaloneTenantPolicy,
}

impl IdentityService {
    pub fn new(
        repos: Repositories,
        tokens: TokenEngine,
        hasher: Arc<dyn CredentialHasher>,
        notifier: Arc<dyn Notifier>,
        standalone: StandaloneTenantPolicy,
    ) -> Self {
        Self {
            repos,
            tokens,
            hasher,
            notifier,
            login_limiter: Arc::new(LoginRateLimiter::new()),
            standalone,
        }
    }

    pub async fn register_standalone_user(&self, req: RegisterUser) -> Result<Tokens, AppError> {
        validate::required("Full name", &req.full_name)?;
        validate::email(&req.email)?;
        validate::password(&req.password)?;
        let email = validate::normalize_email(&req.email);

        let password_hash = self.hasher.hash(&req.password)?;

        let user = match &self.standalone {
            StandaloneTenantPolicy::Shared { domain } => {
                let (tenant_id, role_id) = self.shared_tenant(domain).await?;
                self.repos
                    .users
                    .create(NewUser {
                        tenant_id,
                        role_id,
                        email,
                        password_hash,
                        full_name: req.full_name.trim().to_string(),
                        status: UserStatus::Active,
                    })
                    .await?
            }
            StandaloneTenantPolicy::Personal => {
                let full_name = req.full_name.trim().to_string();
                self.repos
                    .provisioner
                    .provision(TenantProvisioning {
                        tenant: NewTenant {
                            name: format!("{full_name}'s Workspace"),
                            domain: format!("{}.workspace.local", Uuid::now_v7().simple()),
                        },
                        role_name: OWNER_ROLE.to_string(),
                        permissions: PermissionSet::full_access(),
                        owner_email: email,
                        owner_password_hash: password_hash,
                        owner_full_name: full_name,
                    })
                    .await?
                    .user
            }
        };

        tracing::info!(user_id = %user.id, tenant_id = %user.tenant_id, "User registered");
        self.tokens.issue(identity_of(&user)).await
    }

    /// Tenant, owner role and owner user commit together or not at all.
    pub async fn register_tenant_with_owner(&self, req: RegisterTenant) -> Result<Tokens, AppError> {
        validate::required("Company name", &req.company_name)?;
        validate::required("Owner full name", &req.owner_full_name)?;
        let domain = req.domain.trim().to_lowercase();
        validate::domain(&domain)?;
        validate::email(&req.owner_email)?;
        validate::password(&req.owner_password)?;

        if self.repos.tenants.find_by_domain(&domain).await?.is_some() {
            return Err(AppError::TenantExists);
        }

        let owner_password_hash = self.hasher.hash(&req.owner_password)?;

        let provisioned = self
            .repos
            .provisioner
            .provision(TenantProvisioning {
                tenant: NewTenant {
                    name: req.company_name.trim().to_string(),
                    domain,
                },
                role_name: OWNER_ROLE.to_string(),
                permissions: PermissionSet::full_access(),
                owner_email: validate::normalize_email(&req.owner_email),
                owner_password_hash,
                owner_full_name: req.owner_full_name.trim().to_string(),
            })
            .await?;

        tracing::info!(
            tenant_id = %provisioned.tenant.id,
            user_id = %provisioned.user.id,
            "Tenant registered"
        );
        self.tokens.issue(identity_of(&provisioned.user)).await
    }

    /// `tenant_id` narrows the lookup; without it the email must be unique
    /// across tenants.
    pub async fn login(&self, tenant_id: Option<Uuid>, req: Credentials) -> Result<Tokens, AppError> {
        validate::required("Email", &req.email)?;
        validate::required("Password", &req.password)?;
        let email = validate::normalize_email(&req.email);

        if let Err(retry_after) = self.login_limiter.check(&email) {
            return Err(AppError::RateLimited(format!(
                "Too many login attempts. Try again in {retry_after} seconds."
            )));
        }

        let user = match tenant_id {
            Some(tenant_id) => self.repos.users.find_by_email(tenant_id, &email).await?,
            None => {
                let mut matches = self.repos.users.find_by_email_any(&email).await?;
                if matches.len() > 1 {
                    return Err(AppError::MissingTenant);
                }
                matches.pop()
            }
        };
        let user = user.ok_or_else(invalid_credentials)?;

        if !self.hasher.verify(&req.password, &user.password_hash)? {
            self.login_limiter.record_failure(&email);
            return Err(invalid_credentials());
        }

        if user.status != UserStatus::Active {
            return Err(AppError::Unauthenticated("Account is not active".to_string()));
        }
        let tenant = self
            .repos
            .tenants
            .find_by_id(user.tenant_id)
            .await?
            .ok_or(AppError::NotFound("Tenant"))?;
        if !tenant.is_active() {
            return Err(AppError::Unauthenticated("Tenant is not active".to_string()));
        }

        self.login_limiter.reset(&email);
        self.repos
            .users
            .update(
                user.tenant_id,
                user.id,
                &UserPatch {
                    last_login_at: Patch::Set(Utc::now()),
                    ..UserPatch::default()
                },
            )
            .await?;

        self.tokens.issue(identity_of(&user)).await
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Tokens, AppError> {
        validate::required("Refresh token", refresh_token)?;
        self.tokens.refresh(refresh_token).await
    }

    /// Revoke the presented session. Unknown tokens succeed silently.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        validate::required("Refresh token", refresh_token)?;
        self.tokens.revoke(refresh_token).await
    }

    /// Replace the password, end every session, and start a new one.
    pub async fn change_password(
        &self,
        identity: Identity,
        req: ChangePassword,
    ) -> Result<Tokens, AppError> {
        validate::password(&req.new_password)?;

        let user = self.user_of(&identity).await?;
        if !self.hasher.verify(&req.current_password, &user.password_hash)? {
            return Err(AppError::Unauthenticated(
                "Current password is incorrect".to_string(),
            ));
        }

        self.set_password(&user, &req.new_password).await?;
        self.tokens.issue(identity_of(&user)).await
    }

    /// Issue a reset token if the account exists. The caller learns nothing
    /// either way.
    pub async fn request_password_reset(&self, tenant_id: Uuid, email: &str) -> Result<(), AppError> {
        validate::email(email)?;
        let email = validate::normalize_email(email);

        let Some(user) = self.repos.users.find_by_email(tenant_id, &email).await? else {
            return Ok(());
        };
        if user.status != UserStatus::Active {
            return Ok(());
        }

        let token = self
            .tokens
            .issue_single_use(SingleUseSubject::PasswordReset { user_id: user.id }, None)
            .await?;
        self.notifier
            .deliver(Notice::PasswordReset {
                user_id: user.id,
                email: user.email,
                token,
            })
            .await;
        Ok(())
    }

    /// The new password and the reset's consumption commit together, so a
    /// failed write leaves the token redeemable.
    pub async fn redeem_password_reset(&self, req: RedeemPasswordReset) -> Result<(), AppError> {
        validate::required("Token", &req.token)?;
        validate::password(&req.new_password)?;

        let claim = self
            .tokens
            .claim_single_use(SingleUseKind::PasswordReset, &req.token)
            .await?;
        let password_hash = self.hasher.hash(&req.new_password)?;
        let user_id = self
            .tokens
            .complete_password_reset(claim, &password_hash)
            .await?;

        tracing::info!(user_id = %user_id, "Password reset redeemed");
        Ok(())
    }

    /// The target role's grants must be within the inviter's own.
    pub async fn create_invitation(
        &self,
        ctx: &CallContext,
        req: CreateInvitation,
    ) -> Result<InvitationIssued, AppError> {
        validate::email(&req.email)?;
        let email = validate::normalize_email(&req.email);
        let identity = ctx.identity()?;
        let tenant_id = identity.tenant_id;

        let role = self
            .repos
            .roles
            .find_by_id(tenant_id, req.role_id)
            .await?
            .ok_or(AppError::NotFound("Role"))?;
        ctx.authz
            .require_grantable(&identity, &role.permissions)
            .await?;
        if self.repos.users.find_by_email(tenant_id, &email).await?.is_some() {
            return Err(AppError::EmailExists);
        }

        let token = self
            .tokens
            .issue_single_use(
                SingleUseSubject::Invitation {
                    tenant_id,
                    role_id: req.role_id,
                    email: email.clone(),
                },
                None,
            )
            .await?;
        self.notifier
            .deliver(Notice::Invitation {
                tenant_id,
                email: email.clone(),
                token,
            })
            .await;

        Ok(InvitationIssued {
            tenant_id,
            role_id: req.role_id,
            email,
        })
    }

    /// The user insert and the invitation's consumption commit together.
    pub async fn redeem_invitation(&self, req: RedeemInvitation) -> Result<Tokens, AppError> {
        validate::required("Token", &req.token)?;
        validate::required("Full name", &req.full_name)?;
        validate::password(&req.password)?;

        let claim = self
            .tokens
            .claim_single_use(SingleUseKind::Invitation, &req.token)
            .await?;
        let SingleUseSubject::Invitation {
            tenant_id,
            role_id,
            email,
        } = claim.subject.clone()
        else {
            return Err(AppError::NotFound("Token"));
        };

        let tenant = self
            .repos
            .tenants
            .find_by_id(tenant_id)
            .await?
            .ok_or(AppError::NotFound("Tenant"))?;
        if !tenant.is_active() {
            return Err(AppError::Forbidden("Tenant is not active".to_string()));
        }

        let password_hash = self.hasher.hash(&req.password)?;
        let user = self
            .tokens
            .complete_invitation(
                claim,
                NewUser {
                    tenant_id,
                    role_id,
                    email,
                    password_hash,
                    full_name: req.full_name.trim().to_string(),
                    status: UserStatus::Active,
                },
            )
            .await?;

        tracing::info!(user_id = %user.id, tenant_id = %tenant_id, "Invitation redeemed");
        self.tokens.issue(identity_of(&user)).await
    }

    async fn user_of(&self, identity: &Identity) -> Result<User, AppError> {
        self.repos
            .users
            .find_by_id(identity.user_id)
            .await?
            .filter(|user| user.tenant_id == identity.tenant_id)
            .ok_or_else(|| AppError::Unauthenticated("User not found".to_string()))
    }

    async fn set_password(&self, user: &User, password: &str) -> Result<(), AppError> {
        let password_hash = self.hasher.hash(password)?;
        self.repos
            .users
            .update(
                user.tenant_id,
                user.id,
                &UserPatch {
                    password_hash: Patch::Set(password_hash),
                    ..UserPatch::default()
                },
            )
            .await?;
        self.tokens.revoke_all(user.id).await?;
        Ok(())
    }

    /// The shared tenant and its member role, created on first use.
    async fn shared_tenant(&self, domain: &str) -> Result<(Uuid, Uuid), AppError> {
        let tenant = match self.repos.tenants.find_by_domain(domain).await? {
            Some(tenant) => tenant,
            None => match self
                .repos
                .tenants
                .create(NewTenant {
                    name: "Shared".to_string(),
                    domain: domain.to_string(),
                })
                .await
            {
                Ok(tenant) => tenant,
                // lost the creation race; use the winner's row
                Err(crate::db::StoreError::Conflict(_)) => self
                    .repos
                    .tenants
                    .find_by_domain(domain)
                    .await?
                    .ok_or(AppError::NotFound("Tenant"))?,
                Err(e) => return Err(e.into()),
            },
        };

        let role = match self.repos.roles.find_by_name(tenant.id, MEMBER_ROLE).await? {
            Some(role) => role,
            None => match self
                .repos
                .roles
                .create(NewRole {
                    tenant_id: tenant.id,
                    name: MEMBER_ROLE.to_string(),
                    permissions: PermissionSet::member(),
                })
                .await
            {
                Ok(role) => role,
                Err(crate::db::StoreError::Conflict(_)) => self
                    .repos
                    .roles
                    .find_by_name(tenant.id, MEMBER_ROLE)
                    .await?
                    .ok_or(AppError::NotFound("Role"))?,
                Err(e) => return Err(e.into()),
            },
        };

        Ok((tenant.id, role.id))
    }
}

fn identity_of(user: &User) -> Identity {
    Identity {
        user_id: user.id,
        tenant_id: user.tenant_id,
        role_id: user.role_id,
    }
}

fn invalid_credentials() -> AppError {
    AppError::Unauthenticated("Invalid email or password".to_string())
}
