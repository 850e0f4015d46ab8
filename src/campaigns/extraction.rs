//! Extraction runs: a cancellable, campaign-scoped progress state machine
//! that attaches freshly produced leads when it reaches 100%.
//!
//! ```text
//! Idle ──start──▶ Extracting { progress, status_text } ──100%──▶ Idle
//!                        │
//!                        ├──cancel / campaign deleted──▶ Cancelled ─▶ Idle
//!                        └──source or store error─────▶ Failed    ─▶ Idle
//! ```
//!
//! `Failed` and `Cancelled` are reported once by [`ExtractionController::status`]
//! and then cleared.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ExtractionConfig;
use crate::error::{DatabaseError, LlmError, Result, ValidationError};
use crate::session::Session;
use crate::store::Database;

use super::board::CampaignBoard;
use super::import::normalize_target_account;
use super::lead_source::{ExtractionRequest, LeadSource};
use super::runs::RunRegistry;

/// Observable state of a campaign's extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Extracting { progress: u8, status_text: String },
    Failed { reason: String },
    Cancelled,
}

impl RunState {
    /// Terminal bookkeeping states, reported once before returning to idle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Failed { .. } | RunState::Cancelled)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Extracting { .. })
    }
}

/// One step of a progress sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub progress: u8,
    pub status_text: String,
}

impl Checkpoint {
    pub fn new(progress: u8, status_text: impl Into<String>) -> Self {
        Self {
            progress,
            status_text: status_text.into(),
        }
    }
}

/// Source of progress checkpoints for a run.
#[async_trait]
pub trait ProgressDriver: Send + Sync {
    /// Wait for the next checkpoint. `None` means the driver is exhausted.
    async fn next_checkpoint(&mut self) -> Option<Checkpoint>;
}

/// Builds a fresh driver for each run.
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn ProgressDriver> + Send + Sync>;

/// Checkpoints shown while "extracting".
pub const DEFAULT_CHECKPOINTS: &[(u8, &str)] = &[
    (10, "Connecting to target account..."),
    (30, "Scanning followers..."),
    (55, "Analyzing profiles..."),
    (80, "Qualifying leads..."),
    (100, "Finalizing leads..."),
];

/// Emits a fixed checkpoint list, one per tick.
pub struct TimerDriver {
    interval: Interval,
    checkpoints: VecDeque<Checkpoint>,
}

impl TimerDriver {
    /// A zero period is raised to one millisecond.
    pub fn new(period: Duration, checkpoints: Vec<Checkpoint>) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            checkpoints: checkpoints.into(),
        }
    }

    /// The default checkpoint list on the given period.
    pub fn with_defaults(period: Duration) -> Self {
        Self::new(
            period,
            DEFAULT_CHECKPOINTS
                .iter()
                .map(|(p, text)| Checkpoint::new(*p, *text))
                .collect(),
        )
    }
}

#[async_trait]
impl ProgressDriver for TimerDriver {
    async fn next_checkpoint(&mut self) -> Option<Checkpoint> {
        if self.checkpoints.is_empty() {
            return None;
        }
        self.interval.tick().await;
        self.checkpoints.pop_front()
    }
}

/// Emits a predetermined list without waiting.
pub struct ScriptedDriver {
    checkpoints: VecDeque<Checkpoint>,
}

impl ScriptedDriver {
    pub fn new(checkpoints: Vec<Checkpoint>) -> Self {
        Self {
            checkpoints: checkpoints.into(),
        }
    }

    /// A factory handing every run the same script.
    pub fn factory(checkpoints: Vec<Checkpoint>) -> DriverFactory {
        Arc::new(move || -> Box<dyn ProgressDriver> {
            Box::new(ScriptedDriver::new(checkpoints.clone()))
        })
    }
}

#[async_trait]
impl ProgressDriver for ScriptedDriver {
    async fn next_checkpoint(&mut self) -> Option<Checkpoint> {
        self.checkpoints.pop_front()
    }
}

/// Progress never goes backwards and never exceeds 100.
fn next_progress(last: u8, reported: u8) -> u8 {
    reported.min(100).max(last)
}

struct ActiveRun {
    run_id: Uuid,
    owner_id: String,
    state: watch::Receiver<RunState>,
    token: CancellationToken,
}

type ActiveRuns = Arc<RwLock<HashMap<String, ActiveRun>>>;

/// Starts and cancels extraction runs. At most one run per campaign.
pub struct ExtractionController {
    db: Arc<dyn Database>,
    board: Arc<CampaignBoard>,
    runs: Arc<RunRegistry>,
    source: Arc<dyn LeadSource>,
    driver: DriverFactory,
    config: ExtractionConfig,
    active: ActiveRuns,
}

impl ExtractionController {
    /// Controller driven by a [`TimerDriver`] on the configured tick.
    pub fn new(
        db: Arc<dyn Database>,
        board: Arc<CampaignBoard>,
        runs: Arc<RunRegistry>,
        source: Arc<dyn LeadSource>,
        config: ExtractionConfig,
    ) -> Self {
        let tick = config.tick_interval;
        Self {
            db,
            board,
            runs,
            source,
            driver: Arc::new(move || -> Box<dyn ProgressDriver> {
                Box::new(TimerDriver::with_defaults(tick))
            }),
            config,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Replace the progress driver.
    pub fn with_driver(mut self, driver: DriverFactory) -> Self {
        self.driver = driver;
        self
    }

    /// Start an extraction for a campaign. Returns a receiver that observes
    /// the run's state until it ends.
    pub async fn start(
        &self,
        session: &Session,
        campaign_id: &str,
        target_account: &str,
        niche: &str,
        count: Option<usize>,
    ) -> Result<watch::Receiver<RunState>> {
        let target_account = normalize_target_account(target_account)?;
        let owner_id = session.owner_id().to_string();

        if self.db.get_campaign(&owner_id, campaign_id).await?.is_none() {
            return Err(DatabaseError::campaign_not_found(campaign_id).into());
        }

        let request = ExtractionRequest {
            target_account,
            niche: niche.trim().to_string(),
            count: count.filter(|c| *c > 0).unwrap_or(self.config.lead_count),
        };

        let initial = RunState::Extracting {
            progress: 0,
            status_text: "Starting extraction...".to_string(),
        };
        let (tx, rx) = watch::channel(initial);
        let run_id = Uuid::new_v4();

        let token = {
            let mut active = self.active.write().await;
            if active
                .get(campaign_id)
                .is_some_and(|run| run.state.borrow().is_running())
            {
                return Err(ValidationError::RunInProgress {
                    campaign_id: campaign_id.to_string(),
                }
                .into());
            }

            let token = self.runs.token_for(campaign_id).await;
            active.insert(
                campaign_id.to_string(),
                ActiveRun {
                    run_id,
                    owner_id: owner_id.clone(),
                    state: rx.clone(),
                    token: token.clone(),
                },
            );
            token
        };

        info!(
            campaign_id,
            owner_id = %owner_id,
            target_account = %request.target_account,
            count = request.count,
            "Extraction started"
        );

        let task = RunTask {
            run_id,
            owner_id,
            campaign_id: campaign_id.to_string(),
            request,
            driver: (self.driver)(),
            tx,
            token,
            source_timeout: self.config.source_timeout,
            db: Arc::clone(&self.db),
            board: Arc::clone(&self.board),
            source: Arc::clone(&self.source),
            active: Arc::clone(&self.active),
        };
        tokio::spawn(task.run());

        Ok(rx)
    }

    /// Current state of a campaign's extraction. Terminal states are
    /// returned once and then cleared.
    pub async fn status(&self, session: &Session, campaign_id: &str) -> RunState {
        let mut active = self.active.write().await;
        let Some(run) = active.get(campaign_id) else {
            return RunState::Idle;
        };
        if run.owner_id != session.owner_id() {
            return RunState::Idle;
        }

        let state = run.state.borrow().clone();
        if state.is_terminal() {
            active.remove(campaign_id);
        }
        state
    }

    /// Cancel a running extraction. Returns false if nothing was running.
    pub async fn cancel(&self, session: &Session, campaign_id: &str) -> bool {
        let active = self.active.read().await;
        match active.get(campaign_id) {
            Some(run) if run.owner_id == session.owner_id() && run.state.borrow().is_running() => {
                run.token.cancel();
                info!(campaign_id, "Extraction cancel requested");
                true
            }
            _ => false,
        }
    }
}

/// Why a run stopped early.
enum RunEnd {
    Cancelled,
    Failed(String),
}

struct RunTask {
    run_id: Uuid,
    owner_id: String,
    campaign_id: String,
    request: ExtractionRequest,
    driver: Box<dyn ProgressDriver>,
    tx: watch::Sender<RunState>,
    token: CancellationToken,
    source_timeout: Duration,
    db: Arc<dyn Database>,
    board: Arc<CampaignBoard>,
    source: Arc<dyn LeadSource>,
    active: ActiveRuns,
}

impl RunTask {
    async fn run(mut self) {
        let terminal = match self.advance().await {
            Ok(added) => {
                info!(campaign_id = %self.campaign_id, added, "Extraction complete");
                RunState::Idle
            }
            Err(RunEnd::Cancelled) => {
                info!(campaign_id = %self.campaign_id, "Extraction cancelled");
                RunState::Cancelled
            }
            Err(RunEnd::Failed(reason)) => {
                warn!(campaign_id = %self.campaign_id, reason = %reason, "Extraction failed");
                RunState::Failed { reason }
            }
        };

        // Completed runs, and runs whose campaign is gone, leave nothing to
        // report. Forget them before publishing the final state.
        let forget = match terminal {
            RunState::Idle => true,
            _ => self.campaign_gone().await,
        };
        if forget {
            let mut active = self.active.write().await;
            if active
                .get(&self.campaign_id)
                .is_some_and(|run| run.run_id == self.run_id)
            {
                active.remove(&self.campaign_id);
            }
        }
        self.tx.send_replace(terminal);
    }

    async fn campaign_gone(&self) -> bool {
        matches!(
            self.db.get_campaign(&self.owner_id, &self.campaign_id).await,
            Ok(None)
        )
    }

    /// Walk the checkpoints, then produce and attach leads. Returns the
    /// number of leads added.
    async fn advance(&mut self) -> std::result::Result<usize, RunEnd> {
        let mut progress = 0u8;
        while progress < 100 {
            let checkpoint = tokio::select! {
                _ = self.token.cancelled() => return Err(RunEnd::Cancelled),
                checkpoint = self.driver.next_checkpoint() => checkpoint,
            };
            let Some(checkpoint) = checkpoint else {
                return Err(RunEnd::Failed(format!(
                    "progress driver stopped at {progress}%"
                )));
            };

            progress = next_progress(progress, checkpoint.progress);
            debug!(campaign_id = %self.campaign_id, progress, "Extraction progress");
            self.tx.send_replace(RunState::Extracting {
                progress,
                status_text: checkpoint.status_text,
            });
        }

        let deadline = tokio::time::timeout(self.source_timeout, self.source.produce(&self.request));
        let produced = tokio::select! {
            _ = self.token.cancelled() => return Err(RunEnd::Cancelled),
            produced = deadline => produced,
        };
        let leads = match produced {
            Ok(leads) => leads.map_err(|e| RunEnd::Failed(e.to_string()))?,
            Err(_) => {
                let err = LlmError::Timeout {
                    provider: "lead source".to_string(),
                    timeout: self.source_timeout,
                };
                return Err(RunEnd::Failed(err.to_string()));
            }
        };
        if self.token.is_cancelled() {
            return Err(RunEnd::Cancelled);
        }

        self.db
            .append_leads(&self.owner_id, &self.campaign_id, &leads, None)
            .await
            .map_err(|e| RunEnd::Failed(e.to_string()))?;

        match self.db.get_campaign(&self.owner_id, &self.campaign_id).await {
            Ok(Some(campaign)) => self.board.confirm(campaign).await,
            Ok(None) => {}
            Err(e) => warn!(campaign_id = %self.campaign_id, error = %e, "Board refresh after extraction failed"),
        }
        Ok(leads.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaigns::lead_source::MockLeadSource;
    use crate::error::Error;
    use crate::campaigns::model::Lead;
    use crate::store::LibSqlBackend;

    fn session() -> Session {
        Session::new("user-1").unwrap()
    }

    fn script() -> Vec<Checkpoint> {
        vec![
            Checkpoint::new(40, "scanning"),
            Checkpoint::new(20, "stale"),
            Checkpoint::new(250, "done"),
        ]
    }

    /// Reports one checkpoint, then never makes progress again.
    struct StallingDriver {
        sent: bool,
    }

    #[async_trait]
    impl ProgressDriver for StallingDriver {
        async fn next_checkpoint(&mut self) -> Option<Checkpoint> {
            if !self.sent {
                self.sent = true;
                return Some(Checkpoint::new(10, "working"));
            }
            std::future::pending().await
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl LeadSource for BrokenSource {
        async fn produce(
            &self,
            _request: &ExtractionRequest,
        ) -> std::result::Result<Vec<Lead>, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "test".into(),
                reason: "offline".into(),
            })
        }
    }

    struct HangingSource;

    #[async_trait]
    impl LeadSource for HangingSource {
        async fn produce(
            &self,
            _request: &ExtractionRequest,
        ) -> std::result::Result<Vec<Lead>, LlmError> {
            std::future::pending().await
        }
    }

    struct Fixture {
        controller: ExtractionController,
        db: Arc<LibSqlBackend>,
        runs: Arc<RunRegistry>,
        campaign_id: String,
    }

    async fn fixture(source: Arc<dyn LeadSource>, driver: DriverFactory) -> Fixture {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let campaign = db.create_campaign("extract", "user-1").await.unwrap();
        let runs = RunRegistry::new();
        let controller = ExtractionController::new(
            db.clone(),
            CampaignBoard::new(),
            runs.clone(),
            source,
            ExtractionConfig::default(),
        )
        .with_driver(driver);
        Fixture {
            controller,
            db,
            runs,
            campaign_id: campaign.id,
        }
    }

    fn stalling() -> DriverFactory {
        Arc::new(|| -> Box<dyn ProgressDriver> { Box::new(StallingDriver { sent: false }) })
    }

    #[test]
    fn progress_is_monotonic_and_clamped() {
        assert_eq!(next_progress(0, 40), 40);
        assert_eq!(next_progress(40, 20), 40);
        assert_eq!(next_progress(40, 250), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_driver_ticks_through_defaults() {
        let start = Instant::now();
        let mut driver = TimerDriver::with_defaults(Duration::from_millis(1500));

        let mut seen = Vec::new();
        while let Some(checkpoint) = driver.next_checkpoint().await {
            seen.push(checkpoint.progress);
        }

        assert_eq!(seen, vec![10, 30, 55, 80, 100]);
        assert!(start.elapsed() >= Duration::from_millis(1500 * 5));
    }

    #[tokio::test]
    async fn completed_run_attaches_leads_and_returns_to_idle() {
        let f = fixture(
            Arc::new(MockLeadSource::seeded(3)),
            ScriptedDriver::factory(script()),
        )
        .await;

        let mut rx = f
            .controller
            .start(&session(), &f.campaign_id, "@fitlife", "Fitness", Some(4))
            .await
            .unwrap();
        let final_state = rx.wait_for(|s| !s.is_running()).await.unwrap().clone();
        assert_eq!(final_state, RunState::Idle);

        let campaign = f
            .db
            .get_campaign("user-1", &f.campaign_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.lead_count(), 4);
        assert_eq!(
            f.controller.status(&session(), &f.campaign_id).await,
            RunState::Idle
        );
    }

    #[tokio::test]
    async fn second_start_while_running_is_rejected() {
        let f = fixture(Arc::new(MockLeadSource::seeded(1)), stalling()).await;

        f.controller
            .start(&session(), &f.campaign_id, "fitlife", "Fitness", None)
            .await
            .unwrap();
        let err = f
            .controller
            .start(&session(), &f.campaign_id, "fitlife", "Fitness", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::RunInProgress { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_reports_cancelled_once() {
        let f = fixture(Arc::new(MockLeadSource::seeded(1)), stalling()).await;

        let mut rx = f
            .controller
            .start(&session(), &f.campaign_id, "fitlife", "Fitness", None)
            .await
            .unwrap();
        rx.wait_for(|s| matches!(s, RunState::Extracting { progress: 10, .. }))
            .await
            .unwrap();

        assert!(f.controller.cancel(&session(), &f.campaign_id).await);
        rx.wait_for(|s| *s == RunState::Cancelled).await.unwrap();

        assert_eq!(
            f.controller.status(&session(), &f.campaign_id).await,
            RunState::Cancelled
        );
        assert_eq!(
            f.controller.status(&session(), &f.campaign_id).await,
            RunState::Idle
        );

        let campaign = f
            .db
            .get_campaign("user-1", &f.campaign_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.lead_count(), 0);
    }

    #[tokio::test]
    async fn campaign_cancellation_stops_the_run() {
        let f = fixture(Arc::new(MockLeadSource::seeded(1)), stalling()).await;

        let mut rx = f
            .controller
            .start(&session(), &f.campaign_id, "fitlife", "Fitness", None)
            .await
            .unwrap();
        f.runs.cancel_campaign(&f.campaign_id).await;

        let state = rx.wait_for(|s| !s.is_running()).await.unwrap().clone();
        assert_eq!(state, RunState::Cancelled);
    }

    #[tokio::test]
    async fn source_failure_is_reported() {
        let f = fixture(Arc::new(BrokenSource), ScriptedDriver::factory(script())).await;

        let mut rx = f
            .controller
            .start(&session(), &f.campaign_id, "fitlife", "Fitness", None)
            .await
            .unwrap();
        let state = rx.wait_for(|s| !s.is_running()).await.unwrap().clone();
        assert!(matches!(state, RunState::Failed { ref reason } if reason.contains("offline")));

        // A failed run does not block a new one.
        assert!(
            f.controller
                .start(&session(), &f.campaign_id, "fitlife", "Fitness", None)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn validation_and_ownership() {
        let f = fixture(
            Arc::new(MockLeadSource::seeded(1)),
            ScriptedDriver::factory(script()),
        )
        .await;

        let err = f
            .controller
            .start(&session(), &f.campaign_id, "  @ ", "Fitness", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyTarget)));

        let stranger = Session::new("user-2").unwrap();
        let err = f
            .controller
            .start(&stranger, &f.campaign_id, "fitlife", "Fitness", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!f.controller.cancel(&stranger, &f.campaign_id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_timer_still_ticks() {
        let mut driver = TimerDriver::new(Duration::ZERO, vec![Checkpoint::new(100, "done")]);
        assert_eq!(driver.next_checkpoint().await.unwrap().progress, 100);
        assert!(driver.next_checkpoint().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_source_fails_after_deadline() {
        let f = fixture(Arc::new(HangingSource), ScriptedDriver::factory(script())).await;

        let mut rx = f
            .controller
            .start(&session(), &f.campaign_id, "fitlife", "Fitness", None)
            .await
            .unwrap();
        let state = rx.wait_for(|s| !s.is_running()).await.unwrap().clone();
        assert!(
            matches!(state, RunState::Failed { ref reason } if reason.contains("timed out")),
            "unexpected state: {state:?}"
        );

        // The campaign still exists, so the failure is reported once.
        assert!(matches!(
            f.controller.status(&session(), &f.campaign_id).await,
            RunState::Failed { .. }
        ));
        assert_eq!(
            f.controller.status(&session(), &f.campaign_id).await,
            RunState::Idle
        );
    }

    #[tokio::test]
    async fn run_of_deleted_campaign_is_forgotten() {
        let f = fixture(Arc::new(MockLeadSource::seeded(1)), stalling()).await;

        let mut rx = f
            .controller
            .start(&session(), &f.campaign_id, "fitlife", "Fitness", None)
            .await
            .unwrap();
        f.db.delete_campaign("user-1", &f.campaign_id).await.unwrap();
        f.runs.cancel_campaign(&f.campaign_id).await;

        rx.wait_for(|s| *s == RunState::Cancelled).await.unwrap();
        assert!(f.controller.active.read().await.is_empty());
    }
}
