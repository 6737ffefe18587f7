use crate::authz::Capability;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// No bearer needed; one is still validated if sent.
    Public,
    Authenticated,
}

/// Policy an operation declares to the gate.
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    pub name: &'static str,
    pub access: Access,
    /// Requires the tenant identifier in call metadata.
    pub tenant_scoped: bool,
    pub capability: Option<Capability>,
}

impl Operation {
    pub const fn public(name: &'static str) -> Self {
        Self {
            name,
            access: Access::Public,
            tenant_scoped: false,
            capability: None,
        }
    }

    pub const fn authenticated(name: &'static str) -> Self {
        Self {
            name,
            access: Access::Authenticated,
            tenant_scoped: false,
            capability: None,
        }
    }

    pub const fn tenant_scoped(mut self) -> Self {
        self.tenant_scoped = true;
        self
    }

    /// Authenticated, tenant scoped, and gated on `capability`.
    pub const fn guarded(name: &'static str, capability: Capability) -> Self {
        Self {
            name,
            access: Access::Authenticated,
            tenant_scoped: true,
            capability: Some(capability),
        }
    }
}

pub const REGISTER_STANDALONE_USER: Operation = Operation::public("RegisterStandaloneUser");
pub const REGISTER_TENANT_WITH_OWNER: Operation = Operation::public("RegisterTenantWithOwner");
pub const LOGIN: Operation = Operation::public("Login");
pub const REFRESH_SESSION: Operation = Operation::public("RefreshSession");
pub const LOGOUT: Operation = Operation::public("Logout");
pub const REQUEST_PASSWORD_RESET: Operation =
    Operation::public("RequestPasswordReset").tenant_scoped();
pub const REDEEM_PASSWORD_RESET: Operation = Operation::public("RedeemPasswordReset");
pub const CHANGE_PASSWORD: Operation = Operation::authenticated("ChangePassword");
pub const CREATE_INVITATION: Operation =
    Operation::guarded("CreateInvitation", Capability::InvitationCreate);
pub const REDEEM_INVITATION: Operation = Operation::public("RedeemInvitation");

pub const GET_TENANT: Operation = Operation::guarded("GetTenant", Capability::TenantRead);
pub const UPDATE_TENANT: Operation = Operation::guarded("UpdateTenant", Capability::TenantUpdate);
pub const DELETE_TENANT: Operation = Operation::guarded("DeleteTenant", Capability::TenantDelete);

pub const LIST_ROLES: Operation = Operation::guarded("ListRoles", Capability::RoleRead);
pub const GET_ROLE: Operation = Operation::guarded("GetRole", Capability::RoleRead);
pub const CREATE_ROLE: Operation = Operation::guarded("CreateRole", Capability::RoleWrite);
pub const UPDATE_ROLE: Operation = Operation::guarded("UpdateRole", Capability::RoleWrite);
pub const DELETE_ROLE: Operation = Operation::guarded("DeleteRole", Capability::RoleDelete);

pub const LIST_USERS: Operation = Operation::guarded("ListUsers", Capability::UserRead);
pub const GET_USER: Operation = Operation::guarded("GetUser", Capability::UserRead);
pub const UPDATE_USER: Operation = Operation::guarded("UpdateUser", Capability::UserWrite);
pub const DELETE_USER: Operation = Operation::guarded("DeleteUser", Capability::UserDelete);

pub const LIST_AUDIT: Operation = Operation::guarded("ListAudit", Capability::AuditRead);
