//! Purchaser identity
//!
//! The purchase flow only ever sees this narrow view of the signed-in user;
//! the identity provider's full payload stays at the HTTP edge.

use serde::{Deserialize, Serialize};

pub trait Owner: Send + Sync {
    /// Stable identifier of the purchasing party
    fn owner_id(&self) -> &str;

    /// Name shown in notifications
    fn display_name(&self) -> &str;
}

/// Plain owner value
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerIdentity {
    pub owner_id: String,
    pub display_name: String,
}

impl OwnerIdentity {
    pub fn new(owner_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            display_name: display_name.into(),
        }
    }
}

impl Owner for OwnerIdentity {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}
