use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who a call acts as. Built only from a verified access token and handed
/// to handlers by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role_id: Uuid,
}
