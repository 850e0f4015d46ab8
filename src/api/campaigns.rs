//! Campaign, extraction and campaign-start handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::campaigns::UsernameSource;
use crate::campaigns::import::count_duplicates;
use crate::session::Session;

use super::notification::{ApiError, Notification};
use super::AppState;

/// Usernames as pasted text or as a JSON list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum UsernamesInput {
    Text(String),
    List(Vec<String>),
}

impl UsernamesInput {
    fn into_source(self) -> UsernameSource {
        match self {
            UsernamesInput::Text(text) => UsernameSource::Text(text),
            UsernamesInput::List(list) => UsernameSource::Text(list.join("\n")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateCampaignRequest {
    #[serde(default)]
    name: String,
    usernames: UsernamesInput,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImportCsvRequest {
    #[serde(default)]
    name: String,
    csv: String,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct StartCampaignRequest {
    #[serde(default)]
    goal: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ExtractRequest {
    #[serde(default)]
    target_account: String,
    #[serde(default)]
    niche: String,
    #[serde(default)]
    count: Option<usize>,
}

pub(super) async fn list_campaigns(
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    state.imports.refresh(&session).await?;
    let entries = state.imports.board().entries(session.owner_id()).await;
    Ok(Json(json!({ "campaigns": entries })))
}

pub(super) async fn create_campaign(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CreateCampaignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    import(&state, &session, &body.name, body.usernames.into_source()).await
}

pub(super) async fn import_csv(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<ImportCsvRequest>,
) -> Result<impl IntoResponse, ApiError> {
    import(
        &state,
        &session,
        &body.name,
        UsernameSource::Csv(body.csv.into_bytes()),
    )
    .await
}

async fn import(
    state: &AppState,
    session: &Session,
    name: &str,
    source: UsernameSource,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let campaign = state.imports.import(session, name, &source).await?;

    let usernames: Vec<String> = campaign.leads.iter().map(|l| l.username.clone()).collect();
    let duplicates = count_duplicates(&usernames);
    let mut description = format!(
        "\"{}\" was created with {} leads.",
        campaign.name,
        campaign.lead_count()
    );
    if duplicates > 0 {
        description.push_str(&format!(" {duplicates} usernames appear more than once."));
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "campaign": campaign,
            "duplicates": duplicates,
            "notification": Notification::info("Campaign Created", description),
        })),
    ))
}

pub(super) async fn delete_campaign(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.imports.delete_campaign(&session, &id).await?;
    Ok(Json(json!({
        "status": "deleted",
        "notification": Notification::info("Campaign Deleted", "The campaign was removed. Its outbox messages are kept."),
    })))
}

pub(super) async fn start_campaign(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<StartCampaignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let openers = state
        .openers
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("Opener generation is not configured."))?;

    let report = openers
        .start_campaign(&session, &id, body.goal.as_deref())
        .await?;

    let (status, notification) = match &report.aborted {
        Some(reason) => (
            StatusCode::BAD_GATEWAY,
            Notification::destructive("Error", reason.clone()),
        ),
        None => {
            let mut description = format!(
                "Outreach for the \"{}\" campaign has begun.",
                report.campaign_name
            );
            if report.failed > 0 {
                description.push_str(&format!(
                    " {} of {} openers could not be generated.",
                    report.failed,
                    report.outcomes.len()
                ));
            }
            (
                StatusCode::OK,
                Notification::info("Campaign Started!", description),
            )
        }
    };

    Ok((
        status,
        Json(json!({ "report": report, "notification": notification })),
    ))
}

pub(super) async fn start_extraction(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<ExtractRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let run = state
        .extraction
        .start(&session, &id, &body.target_account, &body.niche, body.count)
        .await?;
    // Read the receiver directly; `status` would consume a terminal state.
    let run_state = run.borrow().clone();

    let description = match state.imports.board().get(session.owner_id(), &id).await {
        Some(entry) => format!(
            "We are extracting new leads for the \"{}\" campaign.",
            entry.campaign.name
        ),
        None => "We are extracting new leads for this campaign.".to_string(),
    };
    info!(campaign_id = %id, "Extraction requested over HTTP");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "state": run_state,
            "notification": Notification::info("Extraction Started", description),
        })),
    ))
}

pub(super) async fn extraction_status(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(json!({ "state": state.extraction.status(&session, &id).await }))
}

pub(super) async fn cancel_extraction(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let cancelled = state.extraction.cancel(&session, &id).await;
    Json(json!({ "cancelled": cancelled }))
}
