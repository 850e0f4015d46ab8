//! Campaign start: fan out one opener generation per lead, fan the results
//! back in, and hand the successes to the outbox writer.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::campaigns::model::Lead;
use crate::campaigns::runs::RunRegistry;
use crate::config::{BatchConfig, BatchMode};
use crate::error::{DatabaseError, Error, LlmError, Result, ValidationError};
use crate::outbox::writer::{OutboxWriter, WriteOutcome};
use crate::session::Session;
use crate::store::Database;

use super::generator::OpenerGenerator;

/// Generation result for one lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success(String),
    Failure(String),
}

/// One entry per lead, in lead order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadOutcome {
    pub lead_id: String,
    pub username: String,
    pub outcome: Outcome,
}

impl LeadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }
}

/// Everything that happened during a campaign start.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub campaign_id: String,
    pub campaign_name: String,
    pub goal: String,
    pub mode: BatchMode,
    pub succeeded: usize,
    pub failed: usize,
    pub written: usize,
    pub outcomes: Vec<LeadOutcome>,
    pub writes: Vec<WriteOutcome>,
    /// Set when all-or-nothing mode discarded the batch.
    pub aborted: Option<String>,
}

/// Resolve and validate the goal of a campaign start.
pub fn resolve_goal(goal: Option<&str>, config: &BatchConfig) -> std::result::Result<String, ValidationError> {
    let goal = goal
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .unwrap_or(config.default_goal.as_str());
    if goal.chars().count() < config.min_goal_len {
        return Err(ValidationError::GoalTooShort {
            min: config.min_goal_len,
        });
    }
    Ok(goal.to_string())
}

/// Runs opener generation for a whole campaign.
pub struct OpenerBatch {
    db: Arc<dyn Database>,
    generator: Arc<dyn OpenerGenerator>,
    writer: Arc<OutboxWriter>,
    runs: Arc<RunRegistry>,
    config: BatchConfig,
}

impl OpenerBatch {
    pub fn new(
        db: Arc<dyn Database>,
        generator: Arc<dyn OpenerGenerator>,
        writer: Arc<OutboxWriter>,
        runs: Arc<RunRegistry>,
        config: BatchConfig,
    ) -> Self {
        Self {
            db,
            generator,
            writer,
            runs,
            config,
        }
    }

    /// Generate an opener for every lead of a campaign and write the results
    /// to the outbox according to the configured [`BatchMode`].
    ///
    /// Fails with [`Error::Cancelled`] if the campaign's runs are cancelled
    /// (for example by deleting it) before the outbox phase.
    pub async fn start_campaign(
        &self,
        session: &Session,
        campaign_id: &str,
        goal: Option<&str>,
    ) -> Result<BatchReport> {
        let goal = resolve_goal(goal, &self.config)?;
        let campaign = self
            .db
            .get_campaign(session.owner_id(), campaign_id)
            .await?
            .ok_or_else(|| DatabaseError::campaign_not_found(campaign_id))?;
        if campaign.leads.is_empty() {
            return Err(ValidationError::NoLeads {
                campaign_id: campaign_id.to_string(),
            }
            .into());
        }

        info!(
            campaign_id,
            owner_id = session.owner_id(),
            count = campaign.lead_count(),
            mode = ?self.config.mode,
            "Starting campaign"
        );

        let token = self.runs.token_for(campaign_id).await;
        let outcomes = self.generate_all(&campaign.leads, &goal, &token).await;
        if token.is_cancelled() {
            return Err(Error::Cancelled {
                campaign_id: campaign_id.to_string(),
            });
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let failed = outcomes.len() - succeeded;

        let (writes, aborted) = match self.config.mode {
            BatchMode::AllOrNothing if failed > 0 => {
                let reason = format!(
                    "{failed} of {} openers failed; nothing was written",
                    outcomes.len()
                );
                warn!(campaign_id, failed, "Batch discarded");
                (Vec::new(), Some(reason))
            }
            _ => {
                let items: Vec<(Lead, String)> = campaign
                    .leads
                    .iter()
                    .zip(&outcomes)
                    .filter_map(|(lead, outcome)| match &outcome.outcome {
                        Outcome::Success(message) => Some((lead.clone(), message.clone())),
                        Outcome::Failure(_) => None,
                    })
                    .collect();
                let writes = self
                    .writer
                    .write_all(session.owner_id(), &campaign.reference(), &items)
                    .await;
                (writes, None)
            }
        };

        let written = writes.iter().filter(|w| w.is_written()).count();
        info!(campaign_id, succeeded, failed, written, "Campaign start finished");

        Ok(BatchReport {
            campaign_id: campaign.id,
            campaign_name: campaign.name,
            goal,
            mode: self.config.mode,
            succeeded,
            failed,
            written,
            outcomes,
            writes,
            aborted,
        })
    }

    /// Bounded fan-out; results come back in lead order.
    async fn generate_all(
        &self,
        leads: &[Lead],
        goal: &str,
        token: &CancellationToken,
    ) -> Vec<LeadOutcome> {
        let calls: Vec<_> = leads
            .iter()
            .map(|lead| self.generate_one(lead, goal, token))
            .collect();
        stream::iter(calls)
            .buffered(self.config.max_concurrent.max(1))
            .collect()
            .await
    }

    async fn generate_one(&self, lead: &Lead, goal: &str, token: &CancellationToken) -> LeadOutcome {
        let profile = lead.profile_data();
        let timeout = self.config.generation_timeout;

        let outcome = tokio::select! {
            _ = token.cancelled() => Outcome::Failure("cancelled".to_string()),
            result = tokio::time::timeout(timeout, self.generator.generate_opener(&profile, goal)) => {
                match result {
                    Ok(Ok(message)) => Outcome::Success(message),
                    Ok(Err(e)) => Outcome::Failure(e.to_string()),
                    Err(_) => Outcome::Failure(
                        LlmError::Timeout {
                            provider: "opener".to_string(),
                            timeout,
                        }
                        .to_string(),
                    ),
                }
            }
        };

        if let Outcome::Failure(reason) = &outcome {
            warn!(lead_id = %lead.id, username = %lead.username, reason = %reason, "Opener generation failed");
        }

        LeadOutcome {
            lead_id: lead.id.clone(),
            username: lead.username.clone(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::store::LibSqlBackend;

    /// Greets every lead except those whose profile mentions `fail_on`.
    struct StubGenerator {
        fail_on: Option<&'static str>,
        hang_on: Option<&'static str>,
    }

    #[async_trait]
    impl OpenerGenerator for StubGenerator {
        async fn generate_opener(
            &self,
            lead_profile_data: &str,
            goal: &str,
        ) -> std::result::Result<String, LlmError> {
            if self.hang_on.is_some_and(|u| lead_profile_data.contains(u)) {
                std::future::pending::<()>().await;
            }
            if self.fail_on.is_some_and(|u| lead_profile_data.contains(u)) {
                return Err(LlmError::RequestFailed {
                    provider: "stub".into(),
                    reason: "model overloaded".into(),
                });
            }
            let first_line = lead_profile_data.lines().next().unwrap_or_default();
            Ok(format!("{first_line} -> {goal}"))
        }
    }

    fn session() -> Session {
        Session::new("user-1").unwrap()
    }

    struct Fixture {
        batch: OpenerBatch,
        db: Arc<LibSqlBackend>,
        runs: Arc<RunRegistry>,
        campaign_id: String,
    }

    async fn fixture(generator: StubGenerator, config: BatchConfig) -> Fixture {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let campaign = db.create_campaign("Spring", "user-1").await.unwrap();
        let leads: Vec<Lead> = ["alice", "bob", "carol"]
            .into_iter()
            .map(Lead::from_username)
            .collect();
        db.append_leads("user-1", &campaign.id, &leads, None)
            .await
            .unwrap();

        let runs = RunRegistry::new();
        let batch = OpenerBatch::new(
            db.clone(),
            Arc::new(generator),
            Arc::new(OutboxWriter::new(db.clone())),
            runs.clone(),
            config,
        );
        Fixture {
            batch,
            db,
            runs,
            campaign_id: campaign.id,
        }
    }

    fn failing_bob() -> StubGenerator {
        StubGenerator {
            fail_on: Some("@bob"),
            hang_on: None,
        }
    }

    #[tokio::test]
    async fn campaign_start_runs_on_a_spawned_task() {
        let f = fixture(failing_bob(), BatchConfig::default()).await;
        let batch = Arc::new(f.batch);
        let campaign_id = f.campaign_id.clone();

        let report = tokio::spawn(async move {
            batch.start_campaign(&session(), &campaign_id, None).await
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(f.db.list_messages("user-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn partial_success_writes_each_successful_lead() {
        let f = fixture(failing_bob(), BatchConfig::default()).await;

        let report = f
            .batch
            .start_campaign(&session(), &f.campaign_id, Some("Book a call"))
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.written, 2);
        assert!(report.aborted.is_none());

        let order: Vec<_> = report.outcomes.iter().map(|o| o.username.as_str()).collect();
        assert_eq!(order, vec!["alice", "bob", "carol"]);
        assert!(matches!(report.outcomes[1].outcome, Outcome::Failure(ref r) if r.contains("overloaded")));

        let mut written: Vec<_> = f
            .db
            .list_messages("user-1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.lead.username)
            .collect();
        written.sort();
        assert_eq!(written, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn all_or_nothing_writes_nothing_on_failure() {
        let config = BatchConfig {
            mode: BatchMode::AllOrNothing,
            ..BatchConfig::default()
        };
        let f = fixture(failing_bob(), config).await;

        let report = f
            .batch
            .start_campaign(&session(), &f.campaign_id, None)
            .await
            .unwrap();

        assert_eq!(report.written, 0);
        assert!(report.aborted.as_deref().unwrap().contains("1 of 3"));
        assert!(f.db.list_messages("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_or_nothing_writes_everything_on_success() {
        let config = BatchConfig {
            mode: BatchMode::AllOrNothing,
            ..BatchConfig::default()
        };
        let generator = StubGenerator {
            fail_on: None,
            hang_on: None,
        };
        let f = fixture(generator, config).await;

        let report = f
            .batch
            .start_campaign(&session(), &f.campaign_id, None)
            .await
            .unwrap();
        assert_eq!(report.written, 3);
        assert_eq!(report.goal, crate::config::DEFAULT_GOAL);

        let messages = f
            .db
            .list_messages_for_campaign("user-1", &f.campaign_id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.campaign_name == "Spring"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lead_times_out_without_blocking_others() {
        let config = BatchConfig {
            generation_timeout: Duration::from_secs(2),
            ..BatchConfig::default()
        };
        let generator = StubGenerator {
            fail_on: None,
            hang_on: Some("@carol"),
        };
        let f = fixture(generator, config).await;

        let report = f
            .batch
            .start_campaign(&session(), &f.campaign_id, None)
            .await
            .unwrap();
        assert_eq!(report.written, 2);
        assert!(matches!(report.outcomes[2].outcome, Outcome::Failure(ref r) if r.contains("timed out")));
    }

    #[tokio::test]
    async fn cancelled_campaign_writes_nothing() {
        let generator = StubGenerator {
            fail_on: None,
            hang_on: Some("@alice"),
        };
        let f = fixture(generator, BatchConfig::default()).await;

        let runs = f.runs.clone();
        let campaign_id = f.campaign_id.clone();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            runs.cancel_campaign(&campaign_id).await;
        });

        let err = f
            .batch
            .start_campaign(&session(), &f.campaign_id, None)
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, Error::Cancelled { .. }));
        assert!(f.db.list_messages("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn goal_and_campaign_validation() {
        let f = fixture(failing_bob(), BatchConfig::default()).await;

        let err = f
            .batch
            .start_campaign(&session(), &f.campaign_id, Some(" hi "))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::GoalTooShort { min: 5 })
        ));

        let err = f
            .batch
            .start_campaign(&session(), "missing", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let empty = f.db.create_campaign("empty", "user-1").await.unwrap();
        let err = f
            .batch
            .start_campaign(&session(), &empty.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::NoLeads { .. })));
    }

    #[test]
    fn blank_goal_falls_back_to_default() {
        let config = BatchConfig::default();
        assert_eq!(resolve_goal(Some("   "), &config).unwrap(), config.default_goal);
        assert_eq!(resolve_goal(Some(" Grow sales "), &config).unwrap(), "Grow sales");
    }
}
