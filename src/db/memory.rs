use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::db::{
    AuditLogRepository, Constraint, InvitationRepository, PasswordResetRepository, Provisioned,
    RefreshTokenRepository, RoleRepository, StoreError, StoreResult, TenantProvisioner,
    TenantProvisioning, TenantRepository, UserRepository,
};
use crate::models::{
    AuditLog, Invitation, NewAuditLog, NewInvitation, NewPasswordReset, NewRefreshToken, NewRole,
    NewTenant, NewUser, PasswordReset, RefreshToken, Role, RolePatch, RotateOutcome, Tenant,
    TenantPatch, TenantStatus, TokenStatus, User, UserPatch, UserStatus,
};

#[derive(Default)]
struct Tables {
    tenants: HashMap<Uuid, Tenant>,
    roles: HashMap<Uuid, Role>,
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    password_resets: HashMap<Uuid, PasswordReset>,
    invitations: HashMap<Uuid, Invitation>,
    audit: Vec<AuditLog>,
}

impl Tables {
    fn check_tenant(&self, domain: &str, except: Option<Uuid>) -> StoreResult<()> {
        let taken = self
            .tenants
            .values()
            .any(|t| t.domain == domain && Some(t.id) != except);
        if taken {
            return Err(StoreError::Conflict(Constraint::TenantDomain));
        }
        Ok(())
    }

    fn check_role_name(&self, tenant_id: Uuid, name: &str, except: Option<Uuid>) -> StoreResult<()> {
        let taken = self
            .roles
            .values()
            .any(|r| r.tenant_id == tenant_id && r.name == name && Some(r.id) != except);
        if taken {
            return Err(StoreError::Conflict(Constraint::RoleName));
        }
        Ok(())
    }

    fn check_email(&self, tenant_id: Uuid, email: &str, except: Option<Uuid>) -> StoreResult<()> {
        let taken = self
            .users
            .values()
            .any(|u| u.tenant_id == tenant_id && u.email == email && Some(u.id) != except);
        if taken {
            return Err(StoreError::Conflict(Constraint::UserEmail));
        }
        Ok(())
    }

    fn check_role_ref(&self, tenant_id: Uuid, role_id: Uuid) -> StoreResult<()> {
        match self.roles.get(&role_id) {
            Some(role) if role.tenant_id == tenant_id => Ok(()),
            _ => Err(StoreError::InvalidReference),
        }
    }

    fn build_tenant(input: NewTenant) -> Tenant {
        let now = Utc::now();
        Tenant {
            id: Uuid::now_v7(),
            name: input.name,
            domain: input.domain,
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn build_role(input: NewRole) -> Role {
        Role {
            id: Uuid::now_v7(),
            tenant_id: input.tenant_id,
            name: input.name,
            permissions: input.permissions,
            created_at: Utc::now(),
        }
    }

    fn build_user(input: NewUser) -> User {
        let now = Utc::now();
        User {
            id: Uuid::now_v7(),
            tenant_id: input.tenant_id,
            role_id: input.role_id,
            email: input.email,
            password_hash: input.password_hash,
            full_name: input.full_name,
            status: input.status,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    fn build_refresh_token(id: Uuid, input: NewRefreshToken) -> RefreshToken {
        RefreshToken {
            id,
            user_id: input.user_id,
            family_id: input.family_id,
            token_hash: input.token_hash,
            revoked: false,
            replaced_by: None,
            expires_at: input.expires_at,
            created_at: Utc::now(),
        }
    }

    /// Remove users and everything that hangs off them.
    fn remove_users(&mut self, ids: &[Uuid]) {
        for id in ids {
            self.users.remove(id);
        }
        self.refresh_tokens.retain(|_, t| !ids.contains(&t.user_id));
        self.password_resets.retain(|_, r| !ids.contains(&r.user_id));
    }

    fn revoke_where(&mut self, pred: impl Fn(&RefreshToken) -> bool) -> u64 {
        let mut count = 0;
        for token in self.refresh_tokens.values_mut() {
            if !token.revoked && pred(token) {
                token.revoked = true;
                count += 1;
            }
        }
        count
    }
}

/// In-process store. Every repository method runs under one lock, which
/// makes each method atomic with respect to every other.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_next_user_insert: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            fail_next_user_insert: AtomicBool::new(false),
        }
    }

    /// Fault injection: the next user insert (standalone or during
    /// provisioning) fails with a backend error.
    pub fn fail_next_user_insert(&self) {
        self.fail_next_user_insert.store(true, Ordering::SeqCst);
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn user_insert_fault(&self) -> StoreResult<()> {
        if self.fail_next_user_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected user insert failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TenantRepository for MemoryStore {
    async fn create(&self, input: NewTenant) -> StoreResult<Tenant> {
        let mut tables = self.tables();
        tables.check_tenant(&input.domain, None)?;
        let tenant = Tables::build_tenant(input);
        tables.tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Tenant>> {
        Ok(self.tables().tenants.get(&id).cloned())
    }

    async fn find_by_domain(&self, domain: &str) -> StoreResult<Option<Tenant>> {
        Ok(self
            .tables()
            .tenants
            .values()
            .find(|t| t.domain == domain)
            .cloned())
    }

    async fn update(&self, id: Uuid, patch: &TenantPatch) -> StoreResult<Tenant> {
        let mut tables = self.tables();
        if let Some(domain) = patch.domain.as_set() {
            tables.check_tenant(domain, Some(id))?;
        }
        let tenant = tables.tenants.get_mut(&id).ok_or(StoreError::NotFound)?;
        patch.name.clone().apply_to(&mut tenant.name);
        patch.domain.clone().apply_to(&mut tenant.domain);
        patch.status.clone().apply_to(&mut tenant.status);
        tenant.updated_at = Utc::now();
        Ok(tenant.clone())
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn create(&self, input: NewRole) -> StoreResult<Role> {
        let mut tables = self.tables();
        if !tables.tenants.contains_key(&input.tenant_id) {
            return Err(StoreError::InvalidReference);
        }
        tables.check_role_name(input.tenant_id, &input.name, None)?;
        let role = Tables::build_role(input);
        tables.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Role>> {
        Ok(self
            .tables()
            .roles
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_by_name(&self, tenant_id: Uuid, name: &str) -> StoreResult<Option<Role>> {
        Ok(self
            .tables()
            .roles
            .values()
            .find(|r| r.tenant_id == tenant_id && r.name == name)
            .cloned())
    }

    async fn list(&self, tenant_id: Uuid) -> StoreResult<Vec<Role>> {
        let mut roles: Vec<Role> = self
            .tables()
            .roles
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        roles.sort_by_key(|r| r.created_at);
        Ok(roles)
    }

    async fn update(&self, tenant_id: Uuid, id: Uuid, patch: &RolePatch) -> StoreResult<Role> {
        let mut tables = self.tables();
        if let Some(name) = patch.name.as_set() {
            tables.check_role_name(tenant_id, name, Some(id))?;
        }
        let role = tables
            .roles
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .ok_or(StoreError::NotFound)?;
        patch.name.clone().apply_to(&mut role.name);
        patch.permissions.clone().apply_to(&mut role.permissions);
        Ok(role.clone())
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid, cascade: bool) -> StoreResult<()> {
        let mut tables = self.tables();
        match tables.roles.get(&id) {
            Some(role) if role.tenant_id == tenant_id => {}
            _ => return Err(StoreError::NotFound),
        }

        let assigned: Vec<Uuid> = tables
            .users
            .values()
            .filter(|u| u.role_id == id)
            .map(|u| u.id)
            .collect();
        if !assigned.is_empty() {
            if !cascade {
                return Err(StoreError::InUse);
            }
            tables.remove_users(&assigned);
        }

        tables.invitations.retain(|_, i| i.role_id != id);
        tables.roles.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, input: NewUser) -> StoreResult<User> {
        let mut tables = self.tables();
        tables.check_role_ref(input.tenant_id, input.role_id)?;
        tables.check_email(input.tenant_id, &input.email, None)?;
        self.user_insert_fault()?;
        let user = Tables::build_user(input);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables().users.get(&id).cloned())
    }

    async fn find_by_email(&self, tenant_id: Uuid, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables()
            .users
            .values()
            .find(|u| u.tenant_id == tenant_id && u.email == email)
            .cloned())
    }

    async fn find_by_email_any(&self, email: &str) -> StoreResult<Vec<User>> {
        Ok(self
            .tables()
            .users
            .values()
            .filter(|u| u.email == email)
            .cloned()
            .collect())
    }

    async fn list(&self, tenant_id: Uuid) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self
            .tables()
            .users
            .values()
            .filter(|u| u.tenant_id == tenant_id)
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn update(&self, tenant_id: Uuid, id: Uuid, patch: &UserPatch) -> StoreResult<User> {
        let mut tables = self.tables();
        if let Some(email) = patch.email.as_set() {
            tables.check_email(tenant_id, email, Some(id))?;
        }
        if let Some(role_id) = patch.role_id.as_set() {
            tables.check_role_ref(tenant_id, *role_id)?;
        }
        let user = tables
            .users
            .get_mut(&id)
            .filter(|u| u.tenant_id == tenant_id)
            .ok_or(StoreError::NotFound)?;
        patch.full_name.clone().apply_to(&mut user.full_name);
        patch.email.clone().apply_to(&mut user.email);
        patch.role_id.clone().apply_to(&mut user.role_id);
        patch.status.clone().apply_to(&mut user.status);
        patch.password_hash.clone().apply_to(&mut user.password_hash);
        if let Some(at) = patch.last_login_at.as_set() {
            user.last_login_at = Some(*at);
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables();
        match tables.users.get(&id) {
            Some(user) if user.tenant_id == tenant_id => {}
            _ => return Err(StoreError::NotFound),
        }
        tables.remove_users(&[id]);
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryStore {
    async fn create(&self, input: NewRefreshToken) -> StoreResult<RefreshToken> {
        let mut tables = self.tables();
        if !tables.users.contains_key(&input.user_id) {
            return Err(StoreError::InvalidReference);
        }
        let token = Tables::build_refresh_token(Uuid::now_v7(), input);
        tables.refresh_tokens.insert(token.id, token.clone());
        Ok(token)
    }

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        Ok(self
            .tables()
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn rotate(&self, old_id: Uuid, next: NewRefreshToken) -> StoreResult<RotateOutcome> {
        let mut tables = self.tables();
        let successor_id = Uuid::now_v7();

        let old = tables
            .refresh_tokens
            .get_mut(&old_id)
            .ok_or(StoreError::NotFound)?;
        if old.revoked {
            return Ok(RotateOutcome::Stale);
        }
        old.revoked = true;
        old.replaced_by = Some(successor_id);

        let token = Tables::build_refresh_token(successor_id, next);
        tables.refresh_tokens.insert(token.id, token.clone());
        Ok(RotateOutcome::Rotated(token))
    }

    async fn revoke_family(&self, family_id: Uuid) -> StoreResult<u64> {
        Ok(self.tables().revoke_where(|t| t.family_id == family_id))
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        Ok(self.tables().revoke_where(|t| t.user_id == user_id))
    }

    async fn revoke_all_for_tenant(&self, tenant_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables();
        let members: Vec<Uuid> = tables
            .users
            .values()
            .filter(|u| u.tenant_id == tenant_id)
            .map(|u| u.id)
            .collect();
        Ok(tables.revoke_where(|t| members.contains(&t.user_id)))
    }
}

#[async_trait]
impl PasswordResetRepository for MemoryStore {
    async fn replace_pending(&self, input: NewPasswordReset) -> StoreResult<PasswordReset> {
        let mut tables = self.tables();
        if !tables.users.contains_key(&input.user_id) {
            return Err(StoreError::InvalidReference);
        }
        for reset in tables.password_resets.values_mut() {
            if reset.user_id == input.user_id && reset.status == TokenStatus::Pending {
                reset.status = TokenStatus::Expired;
            }
        }
        let reset = PasswordReset {
            id: Uuid::now_v7(),
            user_id: input.user_id,
            token_hash: input.token_hash,
            status: TokenStatus::Pending,
            expires_at: input.expires_at,
            created_at: Utc::now(),
        };
        tables.password_resets.insert(reset.id, reset.clone());
        Ok(reset)
    }

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<PasswordReset>> {
        Ok(self
            .tables()
            .password_resets
            .values()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn consume(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables();
        match tables.password_resets.get_mut(&id) {
            Some(reset) if reset.status == TokenStatus::Pending && reset.expires_at > Utc::now() => {
                reset.status = TokenStatus::Used;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn redeem(&self, id: Uuid, password_hash: &str) -> StoreResult<Option<Uuid>> {
        let mut tables = self.tables();
        let user_id = match tables.password_resets.get(&id) {
            Some(reset) if reset.status == TokenStatus::Pending && reset.expires_at > Utc::now() => {
                reset.user_id
            }
            _ => return Ok(None),
        };

        let user = tables.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        if let Some(reset) = tables.password_resets.get_mut(&id) {
            reset.status = TokenStatus::Used;
        }
        tables.revoke_where(|t| t.user_id == user_id);
        Ok(Some(user_id))
    }

    async fn mark_expired(&self, id: Uuid) -> StoreResult<()> {
        if let Some(reset) = self.tables().password_resets.get_mut(&id) {
            if reset.status == TokenStatus::Pending {
                reset.status = TokenStatus::Expired;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl InvitationRepository for MemoryStore {
    async fn create(&self, input: NewInvitation) -> StoreResult<Invitation> {
        let mut tables = self.tables();
        tables.check_role_ref(input.tenant_id, input.role_id)?;
        let invitation = Invitation {
            id: Uuid::now_v7(),
            tenant_id: input.tenant_id,
            role_id: input.role_id,
            email: input.email,
            token_hash: input.token_hash,
            status: TokenStatus::Pending,
            expires_at: input.expires_at,
            created_at: Utc::now(),
        };
        tables.invitations.insert(invitation.id, invitation.clone());
        Ok(invitation)
    }

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<Invitation>> {
        Ok(self
            .tables()
            .invitations
            .values()
            .find(|i| i.token_hash == token_hash)
            .cloned())
    }

    async fn consume(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables();
        match tables.invitations.get_mut(&id) {
            Some(inv) if inv.status == TokenStatus::Pending && inv.expires_at > Utc::now() => {
                inv.status = TokenStatus::Used;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn accept(&self, id: Uuid, user: NewUser) -> StoreResult<Option<User>> {
        let mut tables = self.tables();
        match tables.invitations.get(&id) {
            Some(inv) if inv.status == TokenStatus::Pending && inv.expires_at > Utc::now() => {}
            _ => return Ok(None),
        }

        // every precondition of the insert is checked before the flip
        tables.check_role_ref(user.tenant_id, user.role_id)?;
        tables.check_email(user.tenant_id, &user.email, None)?;
        self.user_insert_fault()?;

        if let Some(inv) = tables.invitations.get_mut(&id) {
            inv.status = TokenStatus::Used;
        }
        let user = Tables::build_user(user);
        tables.users.insert(user.id, user.clone());
        Ok(Some(user))
    }

    async fn mark_expired(&self, id: Uuid) -> StoreResult<()> {
        if let Some(inv) = self.tables().invitations.get_mut(&id) {
            if inv.status == TokenStatus::Pending {
                inv.status = TokenStatus::Expired;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AuditLogRepository for MemoryStore {
    async fn append(&self, event: NewAuditLog) -> StoreResult<()> {
        self.tables().audit.push(AuditLog {
            id: Uuid::now_v7(),
            user_id: event.user_id,
            tenant_id: event.tenant_id,
            action: event.action,
            outcome: event.outcome.to_string(),
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list(&self, tenant_id: Uuid, limit: i64, offset: i64) -> StoreResult<Vec<AuditLog>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let offset = usize::try_from(offset).unwrap_or(0);
        Ok(self
            .tables()
            .audit
            .iter()
            .rev()
            .filter(|e| e.tenant_id == Some(tenant_id))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TenantProvisioner for MemoryStore {
    async fn provision(&self, input: TenantProvisioning) -> StoreResult<Provisioned> {
        let mut tables = self.tables();

        // stage every row, then commit only if all of them are valid
        tables.check_tenant(&input.tenant.domain, None)?;
        let tenant = Tables::build_tenant(input.tenant);
        let role = Tables::build_role(NewRole {
            tenant_id: tenant.id,
            name: input.role_name,
            permissions: input.permissions,
        });
        self.user_insert_fault()?;
        let user = Tables::build_user(NewUser {
            tenant_id: tenant.id,
            role_id: role.id,
            email: input.owner_email,
            password_hash: input.owner_password_hash,
            full_name: input.owner_full_name,
            status: UserStatus::Active,
        });

        tables.tenants.insert(tenant.id, tenant.clone());
        tables.roles.insert(role.id, role.clone());
        tables.users.insert(user.id, user.clone());
        Ok(Provisioned { tenant, role, user })
    }
}
