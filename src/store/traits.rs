//! `Database` trait: single async interface for campaign and outbox persistence.

use async_trait::async_trait;

use crate::campaigns::model::{Campaign, Lead};
use crate::error::DatabaseError;
use crate::outbox::model::{NewOutboxMessage, OutboxMessage};

/// Backend-agnostic store for campaigns and outbox messages.
///
/// The store is the only writer of record ids and creation timestamps.
/// Every call is scoped to an owner; records of other owners behave as if
/// they did not exist.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Campaigns ───────────────────────────────────────────────────

    /// Create an empty campaign and return it with its assigned id.
    async fn create_campaign(&self, name: &str, owner_id: &str)
    -> Result<Campaign, DatabaseError>;

    /// All campaigns of an owner, newest first.
    async fn list_campaigns(&self, owner_id: &str) -> Result<Vec<Campaign>, DatabaseError>;

    /// A single campaign, if it exists for this owner.
    async fn get_campaign(
        &self,
        owner_id: &str,
        campaign_id: &str,
    ) -> Result<Option<Campaign>, DatabaseError>;

    /// Append leads after the existing ones. Returns the new version.
    ///
    /// With `expected_version`, the append fails with
    /// [`DatabaseError::Conflict`] if somebody else appended first.
    async fn append_leads(
        &self,
        owner_id: &str,
        campaign_id: &str,
        leads: &[Lead],
        expected_version: Option<u64>,
    ) -> Result<u64, DatabaseError>;

    /// Delete a campaign record. Outbox messages are left untouched.
    /// Fails with [`DatabaseError::NotFound`] when the id is unknown.
    async fn delete_campaign(&self, owner_id: &str, campaign_id: &str)
    -> Result<(), DatabaseError>;

    // ── Outbox ──────────────────────────────────────────────────────

    /// Persist a generated message.
    async fn append_message(
        &self,
        message: &NewOutboxMessage,
    ) -> Result<OutboxMessage, DatabaseError>;

    /// All outbox messages of an owner, newest first.
    async fn list_messages(&self, owner_id: &str) -> Result<Vec<OutboxMessage>, DatabaseError>;

    /// Outbox messages produced for one campaign, newest first.
    async fn list_messages_for_campaign(
        &self,
        owner_id: &str,
        campaign_id: &str,
    ) -> Result<Vec<OutboxMessage>, DatabaseError>;
}
