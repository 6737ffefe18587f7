//! Token engine: signed access tokens, rotating refresh tokens and
//! single-use reset/invitation tokens.
//!
//! Plaintext secrets leave this module exactly once, in the value returned
//! to the caller. Storage only ever sees `hash_secret` output.

pub mod secret;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::Identity;
use crate::auth::jwt::{self, Claims};
use crate::db::{
    InvitationRepository, PasswordResetRepository, RefreshTokenRepository, Repositories,
    UserRepository,
};
use crate::error::AppError;
use crate::models::{
    NewInvitation, NewPasswordReset, NewRefreshToken, NewUser, RefreshToken, RotateOutcome,
    TokenStatus, User, UserStatus,
};

use self::secret::{generate_secret, hash_secret, verify_secret};

/// Signing material and lifetimes, supplied at construction.
#[derive(Clone)]
pub struct TokenSettings {
    pub signing_secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub single_use_ttl: Duration,
    pub invitation_ttl: Duration,
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("signing_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("single_use_ttl", &self.single_use_ttl)
            .field("invitation_ttl", &self.invitation_ttl)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleUseKind {
    PasswordReset,
    Invitation,
}

/// What a single-use token is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleUseSubject {
    PasswordReset {
        user_id: Uuid,
    },
    Invitation {
        tenant_id: Uuid,
        role_id: Uuid,
        email: String,
    },
}

impl SingleUseSubject {
    pub fn kind(&self) -> SingleUseKind {
        match self {
            SingleUseSubject::PasswordReset { .. } => SingleUseKind::PasswordReset,
            SingleUseSubject::Invitation { .. } => SingleUseKind::Invitation,
        }
    }
}

/// Row state of a single-use token at lookup time.
struct SingleUseRow {
    id: Uuid,
    token_hash: String,
    status: TokenStatus,
    expires_at: DateTime<Utc>,
    subject: SingleUseSubject,
}

/// A presented single-use token that checked out but is not consumed yet.
/// Consumption happens in one of the `complete_*` calls, together with the
/// write the token authorizes.
#[derive(Debug, Clone)]
pub struct SingleUseClaim {
    id: Uuid,
    expires_at: DateTime<Utc>,
    pub subject: SingleUseSubject,
}

impl SingleUseClaim {
    /// Why the conditional flip found nothing pending.
    fn lost(&self) -> AppError {
        if self.expires_at <= Utc::now() {
            AppError::TokenExpired
        } else {
            AppError::AlreadyUsed
        }
    }
}

#[derive(Clone)]
pub struct TokenEngine {
    settings: Arc<TokenSettings>,
    refresh_tokens: Arc<dyn RefreshTokenRepository>,
    password_resets: Arc<dyn PasswordResetRepository>,
    invitations: Arc<dyn InvitationRepository>,
    users: Arc<dyn UserRepository>,
}

impl TokenEngine {
    pub fn new(settings: TokenSettings, repos: &Repositories) -> Self {
        Self {
            settings: Arc::new(settings),
            refresh_tokens: repos.refresh_tokens.clone(),
            password_resets: repos.password_resets.clone(),
            invitations: repos.invitations.clone(),
            users: repos.users.clone(),
        }
    }

    /// Mint an access token and start a new session family.
    pub async fn issue(&self, identity: Identity) -> Result<Tokens, AppError> {
        let refresh_token = generate_secret();
        self.refresh_tokens
            .create(self.new_refresh(identity.user_id, Uuid::now_v7(), &refresh_token))
            .await?;

        Ok(Tokens {
            access_token: self.access_token(identity)?,
            refresh_token,
            token_type: "Bearer",
            expires_in: self.settings.access_ttl.num_seconds(),
        })
    }

    /// Offline check of signature and expiry.
    pub fn validate_access(&self, token: &str) -> Result<Identity, AppError> {
        jwt::decode_token(token, &self.settings.signing_secret).map(|claims| claims.identity())
    }

    /// Exchange a refresh token for a new pair, rotating it.
    pub async fn refresh(&self, presented: &str) -> Result<Tokens, AppError> {
        let token = self.find_refresh(presented).await?;

        if token.revoked {
            if token.was_rotated() {
                return Err(self.reuse_detected(token.user_id).await);
            }
            return Err(AppError::Revoked);
        }
        if token.expires_at <= Utc::now() {
            return Err(AppError::TokenExpired);
        }

        let user = self
            .users
            .find_by_id(token.user_id)
            .await?
            .ok_or(AppError::Revoked)?;
        if user.status != UserStatus::Active {
            self.refresh_tokens.revoke_family(token.family_id).await?;
            return Err(AppError::Unauthenticated("Account is not active".to_string()));
        }

        let next_secret = generate_secret();
        let next = self.new_refresh(user.id, token.family_id, &next_secret);
        match self.refresh_tokens.rotate(token.id, next).await? {
            RotateOutcome::Rotated(_) => {}
            // lost a race against another rotation of the same token
            RotateOutcome::Stale => return Err(self.reuse_detected(user.id).await),
        }

        let identity = Identity {
            user_id: user.id,
            tenant_id: user.tenant_id,
            role_id: user.role_id,
        };
        Ok(Tokens {
            access_token: self.access_token(identity)?,
            refresh_token: next_secret,
            token_type: "Bearer",
            expires_in: self.settings.access_ttl.num_seconds(),
        })
    }

    /// Revoke the session family of `presented`. Unknown tokens are ignored.
    pub async fn revoke(&self, presented: &str) -> Result<(), AppError> {
        match self.find_refresh(presented).await {
            Ok(token) => {
                self.refresh_tokens.revoke_family(token.family_id).await?;
                Ok(())
            }
            Err(AppError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        Ok(self.refresh_tokens.revoke_all_for_user(user_id).await?)
    }

    pub async fn revoke_all_for_tenant(&self, tenant_id: Uuid) -> Result<u64, AppError> {
        Ok(self.refresh_tokens.revoke_all_for_tenant(tenant_id).await?)
    }

    /// Store a pending single-use token and return its plaintext. A new
    /// password reset supersedes any pending one for the same user.
    pub async fn issue_single_use(
        &self,
        subject: SingleUseSubject,
        ttl: Option<Duration>,
    ) -> Result<String, AppError> {
        let ttl = ttl.unwrap_or(match subject.kind() {
            SingleUseKind::PasswordReset => self.settings.single_use_ttl,
            SingleUseKind::Invitation => self.settings.invitation_ttl,
        });
        let secret = generate_secret();
        let token_hash = hash_secret(&secret);
        let expires_at = Utc::now() + ttl;

        match subject {
            SingleUseSubject::PasswordReset { user_id } => {
                self.password_resets
                    .replace_pending(NewPasswordReset {
                        user_id,
                        token_hash,
                        expires_at,
                    })
                    .await?;
            }
            SingleUseSubject::Invitation {
                tenant_id,
                role_id,
                email,
            } => {
                self.invitations
                    .create(NewInvitation {
                        tenant_id,
                        role_id,
                        email,
                        token_hash,
                        expires_at,
                    })
                    .await?;
            }
        }

        Ok(secret)
    }

    /// Check a presented token without consuming it.
    pub async fn claim_single_use(
        &self,
        kind: SingleUseKind,
        presented: &str,
    ) -> Result<SingleUseClaim, AppError> {
        let row = self
            .find_single_use(kind, presented)
            .await?
            .filter(|row| verify_secret(presented, &row.token_hash))
            .ok_or(AppError::NotFound("Token"))?;

        match row.status {
            TokenStatus::Used => return Err(AppError::AlreadyUsed),
            TokenStatus::Expired => return Err(AppError::TokenExpired),
            TokenStatus::Pending => {}
        }
        if row.expires_at <= Utc::now() {
            self.mark_expired(kind, row.id).await?;
            return Err(AppError::TokenExpired);
        }

        Ok(SingleUseClaim {
            id: row.id,
            expires_at: row.expires_at,
            subject: row.subject,
        })
    }

    /// Redeem at most once. The pending → used flip is a conditional write,
    /// so concurrent redeemers see exactly one success.
    pub async fn redeem_single_use(
        &self,
        kind: SingleUseKind,
        presented: &str,
    ) -> Result<SingleUseSubject, AppError> {
        let claim = self.claim_single_use(kind, presented).await?;
        let flipped = match kind {
            SingleUseKind::PasswordReset => self.password_resets.consume(claim.id).await?,
            SingleUseKind::Invitation => self.invitations.consume(claim.id).await?,
        };
        if !flipped {
            return Err(claim.lost());
        }
        Ok(claim.subject)
    }

    /// Consume a reset claim and install `password_hash` in the same unit.
    /// Every session of the user ends with it.
    pub async fn complete_password_reset(
        &self,
        claim: SingleUseClaim,
        password_hash: &str,
    ) -> Result<Uuid, AppError> {
        if claim.subject.kind() != SingleUseKind::PasswordReset {
            return Err(AppError::NotFound("Token"));
        }
        self.password_resets
            .redeem(claim.id, password_hash)
            .await?
            .ok_or_else(|| claim.lost())
    }

    /// Consume an invitation claim and create its user in the same unit. If
    /// the insert fails the invitation stays redeemable.
    pub async fn complete_invitation(
        &self,
        claim: SingleUseClaim,
        user: NewUser,
    ) -> Result<User, AppError> {
        if claim.subject.kind() != SingleUseKind::Invitation {
            return Err(AppError::NotFound("Token"));
        }
        self.invitations
            .accept(claim.id, user)
            .await?
            .ok_or_else(|| claim.lost())
    }

    fn access_token(&self, identity: Identity) -> Result<String, AppError> {
        let claims = Claims::new(identity, Utc::now(), self.settings.access_ttl);
        jwt::encode_token(&claims, &self.settings.signing_secret)
    }

    fn new_refresh(&self, user_id: Uuid, family_id: Uuid, secret: &str) -> NewRefreshToken {
        NewRefreshToken {
            user_id,
            family_id,
            token_hash: hash_secret(secret),
            expires_at: Utc::now() + self.settings.refresh_ttl,
        }
    }

    async fn find_refresh(&self, presented: &str) -> Result<RefreshToken, AppError> {
        self.refresh_tokens
            .find_by_hash(&hash_secret(presented))
            .await?
            .filter(|token| verify_secret(presented, &token.token_hash))
            .ok_or(AppError::NotFound("Refresh token"))
    }

    /// A rotated token came back: the whole user's session set is burned.
    async fn reuse_detected(&self, user_id: Uuid) -> AppError {
        let revoked = match self.refresh_tokens.revoke_all_for_user(user_id).await {
            Ok(count) => count,
            Err(e) => return AppError::from(e),
        };
        let tenant_id = match self.users.find_by_id(user_id).await {
            Ok(user) => user.map(|user| user.tenant_id),
            Err(e) => return AppError::from(e),
        };
        tracing::warn!(user_id = %user_id, revoked, "Refresh token reuse detected");
        AppError::ReuseDetected { user_id, tenant_id }
    }

    async fn find_single_use(
        &self,
        kind: SingleUseKind,
        presented: &str,
    ) -> Result<Option<SingleUseRow>, AppError> {
        let token_hash = hash_secret(presented);
        let row = match kind {
            SingleUseKind::PasswordReset => self
                .password_resets
                .find_by_hash(&token_hash)
                .await?
                .map(|r| SingleUseRow {
                    id: r.id,
                    token_hash: r.token_hash,
                    status: r.status,
                    expires_at: r.expires_at,
                    subject: SingleUseSubject::PasswordReset { user_id: r.user_id },
                }),
            SingleUseKind::Invitation => self
                .invitations
                .find_by_hash(&token_hash)
                .await?
                .map(|i| SingleUseRow {
                    id: i.id,
                    token_hash: i.token_hash,
                    status: i.status,
                    expires_at: i.expires_at,
                    subject: SingleUseSubject::Invitation {
                        tenant_id: i.tenant_id,
                        role_id: i.role_id,
                        email: i.email,
                    },
                }),
        };
        Ok(row)
    }

    async fn mark_expired(&self, kind: SingleUseKind, id: Uuid) -> Result<(), AppError> {
        match kind {
            SingleUseKind::PasswordReset => self.password_resets.mark_expired(id).await?,
            SingleUseKind::Invitation => self.invitations.mark_expired(id).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::PermissionSet;
    use crate::db::{Provisioned, TenantProvisioning};
    use crate::models::NewTenant;

    fn settings() -> TokenSettings {
        TokenSettings {
            signing_secret: b"token-engine-test-secret-32-bytes!".to_vec(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            single_use_ttl: Duration::hours(1),
            invitation_ttl: Duration::days(7),
        }
    }

    async fn setup() -> (TokenEngine, Repositories, Provisioned) {
        let repos = Repositories::in_memory();
        let provisioned = repos
            .provisioner
            .provision(TenantProvisioning {
                tenant: NewTenant {
                    name: "Acme".to_string(),
                    domain: "acme.com".to_string(),
                },
                role_name: "owner".to_string(),
                permissions: PermissionSet::full_access(),
                owner_email: "alice@acme.com".to_string(),
                owner_password_hash: "unused".to_string(),
                owner_full_name: "Alice".to_string(),
            })
            .await
            .unwrap();
        (TokenEngine::new(settings(), &repos), repos, provisioned)
    }

    fn identity(p: &Provisioned) -> Identity {
        Identity {
            user_id: p.user.id,
            tenant_id: p.tenant.id,
            role_id: p.role.id,
        }
    }

    #[tokio::test]
    async fn issued_access_token_validates_offline() {
        let (engine, _, p) = setup().await;
        let tokens = engine.issue(identity(&p)).await.unwrap();
        assert_eq!(engine.validate_access(&tokens.access_token).unwrap(), identity(&p));
        assert_eq!(tokens.expires_in, 900);
    }

    #[tokio::test]
    async fn only_the_refresh_hash_is_stored() {
        let (engine, repos, p) = setup().await;
        let tokens = engine.issue(identity(&p)).await.unwrap();
        assert!(repos.refresh_tokens.find_by_hash(&tokens.refresh_token).await.unwrap().is_none());
        let stored = repos
            .refresh_tokens
            .find_by_hash(&hash_secret(&tokens.refresh_token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.user_id, p.user.id);
    }

    #[tokio::test]
    async fn replaying_a_rotated_token_burns_every_session() {
        let (engine, _, p) = setup().await;
        let first = engine.issue(identity(&p)).await.unwrap();
        let other_device = engine.issue(identity(&p)).await.unwrap();

        let rotated = engine.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, first.refresh_token);

        let err = engine.refresh(&first.refresh_token).await.unwrap_err();
        let AppError::ReuseDetected { user_id, tenant_id } = err else {
            panic!("expected reuse detection, got {err:?}");
        };
        assert_eq!(user_id, p.user.id);
        assert_eq!(tenant_id, Some(p.tenant.id));

        // the rotated successor and the unrelated device session are gone too
        assert!(engine.refresh(&rotated.refresh_token).await.is_err());
        assert!(engine.refresh(&other_device.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn logged_out_token_is_revoked_not_reuse() {
        let (engine, _, p) = setup().await;
        let tokens = engine.issue(identity(&p)).await.unwrap();
        let other_device = engine.issue(identity(&p)).await.unwrap();

        engine.revoke(&tokens.refresh_token).await.unwrap();
        engine.revoke(&tokens.refresh_token).await.unwrap();
        engine.revoke("never-issued").await.unwrap();

        let err = engine.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Revoked));
        assert!(engine.refresh(&other_device.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_not_found() {
        let (engine, _, _) = setup().await;
        let err = engine.refresh(&generate_secret()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn expired_refresh_token_is_rejected() {
        let (engine, repos, p) = setup().await;
        let secret = generate_secret();
        repos
            .refresh_tokens
            .create(NewRefreshToken {
                user_id: p.user.id,
                family_id: Uuid::now_v7(),
                token_hash: hash_secret(&secret),
                expires_at: Utc::now() - Duration::seconds(1),
            })
            .await
            .unwrap();
        assert!(matches!(engine.refresh(&secret).await, Err(AppError::TokenExpired)));
    }

    #[tokio::test]
    async fn single_use_token_redeems_once() {
        let (engine, _, p) = setup().await;
        let subject = SingleUseSubject::PasswordReset { user_id: p.user.id };
        let token = engine.issue_single_use(subject.clone(), None).await.unwrap();

        let redeemed = engine
            .redeem_single_use(SingleUseKind::PasswordReset, &token)
            .await
            .unwrap();
        assert_eq!(redeemed, subject);

        let again = engine.redeem_single_use(SingleUseKind::PasswordReset, &token).await;
        assert!(matches!(again, Err(AppError::AlreadyUsed)));
    }

    #[tokio::test]
    async fn single_use_kinds_do_not_cross() {
        let (engine, _, p) = setup().await;
        let token = engine
            .issue_single_use(SingleUseSubject::PasswordReset { user_id: p.user.id }, None)
            .await
            .unwrap();
        let result = engine.redeem_single_use(SingleUseKind::Invitation, &token).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn expired_single_use_token_is_rejected() {
        let (engine, _, p) = setup().await;
        let token = engine
            .issue_single_use(
                SingleUseSubject::Invitation {
                    tenant_id: p.tenant.id,
                    role_id: p.role.id,
                    email: "bob@acme.com".to_string(),
                },
                Some(Duration::seconds(-1)),
            )
            .await
            .unwrap();

        for _ in 0..2 {
            let result = engine.redeem_single_use(SingleUseKind::Invitation, &token).await;
            assert!(matches!(result, Err(AppError::TokenExpired)));
        }
    }

    #[tokio::test]
    async fn claim_does_not_consume() {
        let (engine, _, p) = setup().await;
        let token = engine
            .issue_single_use(SingleUseSubject::PasswordReset { user_id: p.user.id }, None)
            .await
            .unwrap();

        let first = engine.claim_single_use(SingleUseKind::PasswordReset, &token).await.unwrap();
        let second = engine.claim_single_use(SingleUseKind::PasswordReset, &token).await.unwrap();

        engine.complete_password_reset(first, "new-hash").await.unwrap();
        let err = engine.complete_password_reset(second, "other-hash").await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyUsed));
    }

    #[tokio::test]
    async fn claim_kind_must_match_completion() {
        let (engine, _, p) = setup().await;
        let token = engine
            .issue_single_use(SingleUseSubject::PasswordReset { user_id: p.user.id }, None)
            .await
            .unwrap();
        let claim = engine.claim_single_use(SingleUseKind::PasswordReset, &token).await.unwrap();

        let err = engine
            .complete_invitation(
                claim,
                NewUser {
                    tenant_id: p.tenant.id,
                    role_id: p.role.id,
                    email: "eve@acme.com".to_string(),
                    password_hash: "hash".to_string(),
                    full_name: "Eve".to_string(),
                    status: UserStatus::Active,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(engine.redeem_single_use(SingleUseKind::PasswordReset, &token).await.is_ok());
    }

    #[tokio::test]
    async fn new_reset_supersedes_the_pending_one() {
        let (engine, _, p) = setup().await;
        let subject = SingleUseSubject::PasswordReset { user_id: p.user.id };
        let old = engine.issue_single_use(subject.clone(), None).await.unwrap();
        let new = engine.issue_single_use(subject, None).await.unwrap();

        let result = engine.redeem_single_use(SingleUseKind::PasswordReset, &old).await;
        assert!(matches!(result, Err(AppError::TokenExpired)));
        assert!(engine.redeem_single_use(SingleUseKind::PasswordReset, &new).await.is_ok());
    }
}
