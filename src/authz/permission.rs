use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Every capability the engine knows about. Anything else is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Wildcard: every other capability within the role's tenant.
    Admin,
    TenantRead,
    TenantUpdate,
    TenantDelete,
    RoleRead,
    RoleWrite,
    RoleDelete,
    UserRead,
    UserWrite,
    UserDelete,
    InvitationCreate,
    AuditRead,
}

impl Capability {
    pub const ALL: [Capability; 12] = [
        Capability::Admin,
        Capability::TenantRead,
        Capability::TenantUpdate,
        Capability::TenantDelete,
        Capability::RoleRead,
        Capability::RoleWrite,
        Capability::RoleDelete,
        Capability::UserRead,
        Capability::UserWrite,
        Capability::UserDelete,
        Capability::InvitationCreate,
        Capability::AuditRead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Admin => "admin",
            Capability::TenantRead => "tenant:read",
            Capability::TenantUpdate => "tenant:update",
            Capability::TenantDelete => "tenant:delete",
            Capability::RoleRead => "role:read",
            Capability::RoleWrite => "role:write",
            Capability::RoleDelete => "role:delete",
            Capability::UserRead => "user:read",
            Capability::UserWrite => "user:write",
            Capability::UserDelete => "user:delete",
            Capability::InvitationCreate => "invitation:create",
            Capability::AuditRead => "audit:read",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|cap| cap.as_str() == s)
            .ok_or(())
    }
}

/// How far a grant reaches inside the role's tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantScope {
    Tenant,
    /// Only resources owned by the acting user.
    Own,
}

/// A permission value: `true`/`false`, or a scope name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Grant {
    Flag(bool),
    Scope(GrantScope),
}

impl Grant {
    fn scope(self) -> Option<GrantScope> {
        match self {
            Grant::Flag(true) => Some(GrantScope::Tenant),
            Grant::Flag(false) => None,
            Grant::Scope(scope) => Some(scope),
        }
    }
}

/// Capability-name → grant mapping stored on a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeMap<String, Grant>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The owner role's grant set.
    pub fn full_access() -> Self {
        Self::new().with(Capability::Admin, Grant::Flag(true))
    }

    /// Default grants for users in the shared tenant.
    pub fn member() -> Self {
        Self::new()
            .with(Capability::UserRead, Grant::Scope(GrantScope::Own))
            .with(Capability::UserWrite, Grant::Scope(GrantScope::Own))
    }

    pub fn with(mut self, capability: Capability, grant: Grant) -> Self {
        self.0.insert(capability.as_str().to_string(), grant);
        self
    }

    /// Effective scope for `capability`, honoring the `admin` wildcard.
    pub fn scope_for(&self, capability: Capability) -> Option<GrantScope> {
        let admin = self
            .0
            .get(Capability::Admin.as_str())
            .and_then(|grant| grant.scope());
        if admin == Some(GrantScope::Tenant) {
            return Some(GrantScope::Tenant);
        }
        self.0
            .get(capability.as_str())
            .and_then(|grant| grant.scope())
    }

    /// Whether every effective grant here is matched or exceeded by
    /// `holder`. `own` sits between no grant and a tenant-wide one.
    pub fn is_within(&self, holder: &PermissionSet) -> bool {
        Capability::ALL
            .into_iter()
            .all(|cap| reach(self.scope_for(cap)) <= reach(holder.scope_for(cap)))
    }

    /// Reject capability names the engine does not know.
    pub fn validate(&self) -> Result<(), AppError> {
        match self.0.keys().find(|name| name.parse::<Capability>().is_err()) {
            Some(name) => Err(AppError::Validation(format!("Unknown capability: {name}"))),
            None => Ok(()),
        }
    }
}

fn reach(scope: Option<GrantScope>) -> u8 {
    match scope {
        None => 0,
        Some(GrantScope::Own) => 1,
        Some(GrantScope::Tenant) => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_flag_and_scope_values() {
        let set: PermissionSet =
            serde_json::from_str(r#"{"user:read":"own","role:read":true,"audit:read":false}"#)
                .unwrap();
        assert_eq!(set.scope_for(Capability::UserRead), Some(GrantScope::Own));
        assert_eq!(set.scope_for(Capability::RoleRead), Some(GrantScope::Tenant));
        assert_eq!(set.scope_for(Capability::AuditRead), None);
        assert_eq!(set.scope_for(Capability::TenantDelete), None);
    }

    #[test]
    fn admin_grants_everything_known() {
        let set = PermissionSet::full_access();
        for cap in Capability::ALL {
            assert_eq!(set.scope_for(cap), Some(GrantScope::Tenant));
        }
    }

    #[test]
    fn owner_set_matches_stored_shape() {
        let json = serde_json::to_string(&PermissionSet::full_access()).unwrap();
        assert_eq!(json, r#"{"admin":true}"#);
    }

    #[test]
    fn validate_rejects_unknown_names() {
        let set: PermissionSet = serde_json::from_str(r#"{"launch:missiles":true}"#).unwrap();
        assert!(set.validate().is_err());
        assert!(PermissionSet::member().validate().is_ok());
    }

    #[test]
    fn containment_follows_effective_scope() {
        let admin = PermissionSet::full_access();
        let member = PermissionSet::member();
        let editor: PermissionSet =
            serde_json::from_str(r#"{"user:read":true,"user:write":"own","role:read":true}"#)
                .unwrap();

        assert!(member.is_within(&admin));
        assert!(member.is_within(&editor));
        assert!(editor.is_within(&editor));
        assert!(PermissionSet::new().is_within(&member));

        assert!(!admin.is_within(&editor));
        assert!(!editor.is_within(&member));
        let wider = member.clone().with(Capability::UserWrite, Grant::Flag(true));
        assert!(!wider.is_within(&editor));
    }
}
