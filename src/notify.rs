//! Delivery of single-use tokens to their recipients.

use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

/// A token that has to reach a person out of band.
#[derive(Clone, PartialEq, Eq)]
pub enum Notice {
    PasswordReset {
        user_id: Uuid,
        email: String,
        token: String,
    },
    Invitation {
        tenant_id: Uuid,
        email: String,
        token: String,
    },
}

impl fmt::Debug for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::PasswordReset { user_id, email, .. } => f
                .debug_struct("PasswordReset")
                .field("user_id", user_id)
                .field("email", email)
                .field("token", &"<redacted>")
                .finish(),
            Notice::Invitation {
                tenant_id, email, ..
            } => f
                .debug_struct("Invitation")
                .field("tenant_id", tenant_id)
                .field("email", email)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notice: Notice);
}

/// Records that a notice was due. The token itself is never logged.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notice: Notice) {
        match notice {
            Notice::PasswordReset { user_id, .. } => {
                tracing::info!(user_id = %user_id, "Password reset issued");
            }
            Notice::Invitation { tenant_id, .. } => {
                tracing::info!(tenant_id = %tenant_id, "Invitation issued");
            }
        }
    }
}

/// Keeps notices in memory so callers can pick the tokens up.
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent token sent to `email`.
    pub fn latest_token_for(&self, email: &str) -> Option<String> {
        let notices = self.notices.lock().unwrap_or_else(|e| e.into_inner());
        notices.iter().rev().find_map(|notice| match notice {
            Notice::PasswordReset { email: to, token, .. }
            | Notice::Invitation { email: to, token, .. }
                if to == email =>
            {
                Some(token.clone())
            }
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.notices.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Notifier for MemoryOutbox {
    async fn deliver(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notice);
    }
}
