//! HTTP action handlers for campaigns, extraction, campaign start and the outbox.
//!
//! The caller is identified by the `x-owner-id` header and turned into an
//! explicit [`Session`] per request.

mod campaigns;
pub mod notification;
mod outbox;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::FromRequestParts,
    http::request::Parts,
    response::IntoResponse,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::campaigns::{
    CampaignBoard, ExtractionController, LeadImportController, LeadSource, LlmLeadSource,
    MockLeadSource, RunRegistry,
};
use crate::config::OutreachConfig;
use crate::llm::LlmProvider;
use crate::opener::{
    GeneratorConfig, LlmOpenerGenerator, LlmPersonalizer, MessagePersonalizer, OpenerBatch,
};
use crate::outbox::OutboxWriter;
use crate::session::Session;
use crate::store::Database;

pub use notification::{ApiError, Notification, NotificationVariant};

/// Header carrying the authenticated owner id.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub imports: Arc<LeadImportController>,
    pub extraction: Arc<ExtractionController>,
    pub outbox: Arc<OutboxWriter>,
    /// Campaign start. `None` when no LLM is configured.
    pub openers: Option<Arc<OpenerBatch>>,
    /// Template personalization. `None` when no LLM is configured.
    pub personalizer: Option<Arc<dyn MessagePersonalizer>>,
}

impl AppState {
    /// Wire every controller over one store.
    ///
    /// Without an LLM, extraction falls back to mock leads and the
    /// generation routes answer 503.
    pub fn new(
        db: Arc<dyn Database>,
        llm: Option<Arc<dyn LlmProvider>>,
        config: &OutreachConfig,
    ) -> Self {
        let board = CampaignBoard::new();
        let runs = RunRegistry::new();
        let outbox = Arc::new(OutboxWriter::new(Arc::clone(&db)));

        let source: Arc<dyn LeadSource> = match &llm {
            Some(llm) => Arc::new(LlmLeadSource::new(Arc::clone(llm))),
            None => Arc::new(MockLeadSource::new()),
        };

        let imports = Arc::new(LeadImportController::new(
            Arc::clone(&db),
            Arc::clone(&board),
            Arc::clone(&runs),
            config.import.clone(),
        ));
        let extraction = Arc::new(ExtractionController::new(
            Arc::clone(&db),
            board,
            Arc::clone(&runs),
            source,
            config.extraction.clone(),
        ));

        let (openers, personalizer) = match llm {
            Some(llm) => {
                let generator = Arc::new(LlmOpenerGenerator::new(
                    Arc::clone(&llm),
                    GeneratorConfig::default(),
                ));
                let openers = Arc::new(OpenerBatch::new(
                    db,
                    generator,
                    Arc::clone(&outbox),
                    runs,
                    config.batch.clone(),
                ));
                let personalizer: Arc<dyn MessagePersonalizer> =
                    Arc::new(LlmPersonalizer::new(llm, GeneratorConfig::default()));
                (Some(openers), Some(personalizer))
            }
            None => (None, None),
        };

        Self {
            imports,
            extraction,
            outbox,
            openers,
            personalizer,
        }
    }
}

/// Build the Axum router with every outreach route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/campaigns",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .route("/api/campaigns/import-csv", post(campaigns::import_csv))
        .route(
            "/api/campaigns/{id}",
            axum::routing::delete(campaigns::delete_campaign),
        )
        .route("/api/campaigns/{id}/start", post(campaigns::start_campaign))
        .route(
            "/api/campaigns/{id}/extract",
            post(campaigns::start_extraction)
                .get(campaigns::extraction_status)
                .delete(campaigns::cancel_extraction),
        )
        .route("/api/outbox", get(outbox::list_outbox))
        .route("/api/personalize", post(outbox::personalize))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lead-outreach"
    }))
}

// ── Session extraction ──────────────────────────────────────────────────

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(Session::new)
            .ok_or_else(ApiError::unauthorized)
    }
}
