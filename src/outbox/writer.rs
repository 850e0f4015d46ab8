//! Outbox writer: persists generated openers, one independent write per lead.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::campaigns::model::{CampaignRef, Lead};
use crate::error::DatabaseError;
use crate::outbox::model::{NewOutboxMessage, OutboxMessage};
use crate::store::Database;

/// Result of writing one lead's message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteResult {
    Written { message_id: String },
    Failed { reason: String },
}

/// Per-lead write report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub lead_id: String,
    pub username: String,
    #[serde(flatten)]
    pub result: WriteResult,
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self.result, WriteResult::Written { .. })
    }
}

/// Appends outbox messages. Writes never roll back their siblings.
pub struct OutboxWriter {
    db: Arc<dyn Database>,
}

impl OutboxWriter {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Persist a single message.
    pub async fn write(
        &self,
        owner_id: &str,
        campaign: &CampaignRef,
        lead: &Lead,
        generated_message: &str,
    ) -> Result<OutboxMessage, DatabaseError> {
        let message =
            NewOutboxMessage::new(lead.clone(), campaign, generated_message, owner_id);
        self.db.append_message(&message).await
    }

    /// Persist one message per `(lead, message)` pair, in order. A failed
    /// write is reported and the remaining writes still run.
    pub async fn write_all(
        &self,
        owner_id: &str,
        campaign: &CampaignRef,
        items: &[(Lead, String)],
    ) -> Vec<WriteOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());
        for (lead, generated_message) in items {
            let result = match self.write(owner_id, campaign, lead, generated_message).await {
                Ok(stored) => WriteResult::Written {
                    message_id: stored.id,
                },
                Err(e) => {
                    warn!(
                        campaign_id = %campaign.id,
                        lead_id = %lead.id,
                        error = %e,
                        "Outbox write failed"
                    );
                    WriteResult::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push(WriteOutcome {
                lead_id: lead.id.clone(),
                username: lead.username.clone(),
                result,
            });
        }

        let written = outcomes.iter().filter(|o| o.is_written()).count();
        info!(
            campaign_id = %campaign.id,
            written,
            failed = outcomes.len() - written,
            "Outbox batch written"
        );
        outcomes
    }

    /// Messages of an owner, newest first.
    pub async fn list(&self, owner_id: &str) -> Result<Vec<OutboxMessage>, DatabaseError> {
        self.db.list_messages(owner_id).await
    }
}
