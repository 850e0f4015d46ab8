//! Explicit per-request session context.

use serde::{Deserialize, Serialize};

/// The authenticated caller. Every controller call takes one of these; there
/// is no ambient "current user".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    owner_id: String,
}

impl Session {
    /// Create a session for an owner. Returns `None` for a blank owner id.
    pub fn new(owner_id: impl Into<String>) -> Option<Self> {
        let owner_id = owner_id.into();
        let trimmed = owner_id.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            owner_id: trimmed.to_string(),
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }
}
