pub mod audit_log;
pub mod invitation;
pub mod password_reset;
pub mod patch;
pub mod refresh_token;
pub mod role;
pub mod tenant;
pub mod user;

pub use audit_log::{AuditLog, AuditOutcome, NewAuditLog};
pub use invitation::{Invitation, NewInvitation};
pub use password_reset::{NewPasswordReset, PasswordReset, TokenStatus};
pub use patch::Patch;
pub use refresh_token::{NewRefreshToken, RefreshToken, RotateOutcome};
pub use role::{NewRole, Role, RolePatch};
pub use tenant::{NewTenant, Tenant, TenantPatch, TenantStatus};
pub use user::{NewUser, User, UserPatch, UserStatus};
