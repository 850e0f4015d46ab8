//! Outbox data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::campaigns::model::{CampaignRef, Lead};

/// A persisted, generated opening message.
///
/// Lead and campaign name are snapshots taken at generation time, so the
/// message stays readable after the campaign is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxMessage {
    /// Store-assigned ID.
    pub id: String,
    pub lead: Lead,
    pub campaign_id: String,
    pub campaign_name: String,
    pub generated_message: String,
    pub owner_id: String,
    /// Store-assigned creation time.
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the writer; the store adds `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOutboxMessage {
    pub lead: Lead,
    pub campaign_id: String,
    pub campaign_name: String,
    pub generated_message: String,
    pub owner_id: String,
}

impl NewOutboxMessage {
    pub fn new(
        lead: Lead,
        campaign: &CampaignRef,
        generated_message: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            lead,
            campaign_id: campaign.id.clone(),
            campaign_name: campaign.name.clone(),
            generated_message: generated_message.into(),
            owner_id: owner_id.into(),
        }
    }
}
