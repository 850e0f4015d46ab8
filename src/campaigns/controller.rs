//! Lead import controller: creates campaigns, attaches imported leads and
//! keeps the board in step with the store.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{AppendFailurePolicy, ImportConfig};
use crate::error::{Error, Result, ValidationError};
use crate::session::Session;
use crate::store::Database;

use super::board::CampaignBoard;
use super::import::{UsernameSource, count_duplicates};
use super::model::{Campaign, Lead};
use super::runs::RunRegistry;

/// Orchestrates campaign creation, lead import, deletion and refresh.
pub struct LeadImportController {
    db: Arc<dyn Database>,
    board: Arc<CampaignBoard>,
    runs: Arc<RunRegistry>,
    config: ImportConfig,
}

impl LeadImportController {
    pub fn new(
        db: Arc<dyn Database>,
        board: Arc<CampaignBoard>,
        runs: Arc<RunRegistry>,
        config: ImportConfig,
    ) -> Self {
        Self {
            db,
            board,
            runs,
            config,
        }
    }

    /// Create a campaign and import its leads.
    ///
    /// Input is validated before any store call. Once the campaign record
    /// exists, the board shows it with its leads while the append is in
    /// flight. If the append fails the board is rolled back and the failure is
    /// returned as [`Error::PartialImport`].
    pub async fn import(
        &self,
        session: &Session,
        name: &str,
        source: &UsernameSource,
    ) -> Result<Campaign> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyCampaignName.into());
        }
        let usernames = source.usernames()?;

        let duplicates = count_duplicates(&usernames);
        if duplicates > 0 {
            warn!(
                owner_id = session.owner_id(),
                duplicates, "Imported username list contains duplicates"
            );
        }

        let acknowledged = self.db.create_campaign(name, session.owner_id()).await?;
        let campaign_id = acknowledged.id.clone();

        let leads: Vec<Lead> = usernames.into_iter().map(Lead::from_username).collect();

        let mut optimistic = acknowledged.clone();
        optimistic.leads = leads.clone();
        self.board.insert_pending(optimistic.clone()).await;

        match self
            .db
            .append_leads(
                session.owner_id(),
                &campaign_id,
                &leads,
                Some(acknowledged.version),
            )
            .await
        {
            Ok(version) => {
                let mut campaign = optimistic;
                campaign.version = version;
                self.board.confirm(campaign.clone()).await;
                info!(
                    campaign_id = %campaign.id,
                    owner_id = session.owner_id(),
                    count = campaign.lead_count(),
                    "Campaign imported"
                );
                Ok(campaign)
            }
            Err(source) => {
                warn!(
                    campaign_id = %campaign_id,
                    error = %source,
                    "Lead append failed after campaign creation"
                );
                match self.config.append_failure {
                    AppendFailurePolicy::KeepEmptyCampaign => {
                        self.board.roll_back(acknowledged).await;
                    }
                    AppendFailurePolicy::CompensatingDelete => {
                        if let Err(e) = self
                            .db
                            .delete_campaign(session.owner_id(), &campaign_id)
                            .await
                        {
                            warn!(campaign_id = %campaign_id, error = %e, "Compensating delete failed");
                            self.board.roll_back(acknowledged).await;
                        } else {
                            self.board.remove(session.owner_id(), &campaign_id).await;
                        }
                    }
                }
                Err(Error::PartialImport {
                    campaign_id,
                    source,
                })
            }
        }
    }

    /// Delete a campaign, then cancel its in-flight runs. Unknown ids and
    /// campaigns of other owners fail with `NotFound` and cancel nothing.
    ///
    /// Outbox messages produced for the campaign are kept.
    pub async fn delete_campaign(&self, session: &Session, campaign_id: &str) -> Result<()> {
        self.db
            .delete_campaign(session.owner_id(), campaign_id)
            .await?;
        self.runs.cancel_campaign(campaign_id).await;
        self.board.remove(session.owner_id(), campaign_id).await;
        info!(campaign_id, owner_id = session.owner_id(), "Campaign removed");
        Ok(())
    }

    /// Reload the owner's campaigns from the store into the board.
    pub async fn refresh(&self, session: &Session) -> Result<Vec<Campaign>> {
        let campaigns = self.db.list_campaigns(session.owner_id()).await?;
        self.board
            .reload(session.owner_id(), campaigns.clone())
            .await;
        Ok(campaigns)
    }

    pub fn board(&self) -> &Arc<CampaignBoard> {
        &self.board
    }
}
