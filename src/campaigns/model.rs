//! Campaign data model: leads, campaigns and board events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder avatar used for imported leads.
pub const PLACEHOLDER_AVATAR_URL: &str = "https://placehold.co/100x100.png";

/// Placeholder latest-post image used for imported leads.
pub const PLACEHOLDER_POST_IMAGE_URL: &str = "https://placehold.co/300x300.png";

/// A prospective contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    /// Unique ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Handle without the leading `@`.
    pub username: String,
    /// Profile bio.
    pub bio: String,
    pub avatar_url: String,
    #[serde(default)]
    pub latest_post_image_url: String,
}

impl Lead {
    /// Synthesize a lead for an imported username. The username must already
    /// be normalized.
    pub fn from_username(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            id: Uuid::new_v4().to_string(),
            name: username.clone(),
            bio: format!("Instagram user @{username}"),
            username,
            avatar_url: PLACEHOLDER_AVATAR_URL.to_string(),
            latest_post_image_url: PLACEHOLDER_POST_IMAGE_URL.to_string(),
        }
    }

    /// Profile text handed to the opener generator.
    pub fn profile_data(&self) -> String {
        format!(
            "Username: @{}\nName: {}\nBio: {}",
            self.username, self.name, self.bio
        )
    }
}

/// A named collection of leads owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    /// Store-assigned ID.
    pub id: String,
    pub name: String,
    pub owner_id: String,
    /// Free-text niche, empty until set.
    #[serde(default)]
    pub niche: String,
    /// Leads in insertion order.
    #[serde(default)]
    pub leads: Vec<Lead>,
    /// Store-assigned creation time.
    pub created_at: DateTime<Utc>,
    /// Bumped by every lead append.
    #[serde(default)]
    pub version: u64,
}

impl Campaign {
    pub fn lead_count(&self) -> usize {
        self.leads.len()
    }

    /// Lightweight reference used by outbox entries.
    pub fn reference(&self) -> CampaignRef {
        CampaignRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Denormalized campaign identity (id + name snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRef {
    pub id: String,
    pub name: String,
}

/// Whether a board entry has been acknowledged by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Shown locally, store write still in flight.
    PendingLocal,
    /// Matches the store.
    Confirmed,
}

/// Events broadcast by the campaign board. Every event is scoped to one
/// owner (`CampaignUpserted` through `campaign.owner_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoardEvent {
    /// A campaign was added or replaced.
    CampaignUpserted { campaign: Campaign, sync: SyncState },
    /// A campaign was removed.
    CampaignRemoved { owner_id: String, id: String },
    /// An owner's whole list was replaced from the store.
    Reloaded {
        owner_id: String,
        campaigns: Vec<Campaign>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_from_username_uses_placeholders() {
        let lead = Lead::from_username("alice");
        assert_eq!(lead.username, "alice");
        assert_eq!(lead.name, "alice");
        assert_eq!(lead.avatar_url, PLACEHOLDER_AVATAR_URL);
        assert_eq!(lead.latest_post_image_url, PLACEHOLDER_POST_IMAGE_URL);
        assert!(lead.bio.contains("@alice"));
        assert!(Uuid::parse_str(&lead.id).is_ok());
    }

    #[test]
    fn lead_ids_are_unique() {
        let a = Lead::from_username("same");
        let b = Lead::from_username("same");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn profile_data_includes_username_and_bio() {
        let lead = Lead::from_username("bob");
        let data = lead.profile_data();
        assert!(data.contains("@bob"));
        assert!(data.contains(&lead.bio));
    }

    #[test]
    fn lead_serializes_camel_case() {
        let json = serde_json::to_value(Lead::from_username("x")).unwrap();
        assert!(json.get("avatarUrl").is_some());
        assert!(json.get("latestPostImageUrl").is_some());
    }
}
