pub mod controller;

use std::fmt;

use serde::Serialize;
use utoipa::ToSchema;

pub use controller::SubscriptionController;

/// An authenticated principal as reported by the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    /// Bearer token for the realtime database, when the provider issued one.
    pub id_token: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into(), email: None, id_token: None }
    }
}

// Keep tokens out of logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Lifecycle of the single data feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No identity; nothing attached.
    Idle,
    /// Feed started, no reading received yet.
    Attaching,
    /// At least one reading received for the current identity.
    Active,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let identity = Identity {
            uid: "u1".into(),
            email: Some("a@b.c".into()),
            id_token: Some("secret-jwt".into()),
        };
        let printed = format!("{identity:?}");
        assert!(printed.contains("u1"));
        assert!(!printed.contains("secret-jwt"));
    }
}
