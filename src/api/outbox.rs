//! Outbox listing and message personalization handlers.

use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::Error;
use crate::opener::personalize::validate_personalize_input;
use crate::session::Session;

use super::AppState;
use super::notification::ApiError;

pub(super) async fn list_outbox(
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state
        .outbox
        .list(session.owner_id())
        .await
        .map_err(Error::from)?;
    Ok(Json(json!({ "messages": messages })))
}

#[derive(Debug, Deserialize)]
pub(super) struct PersonalizeRequest {
    #[serde(default)]
    lead_profile_data: String,
    #[serde(default)]
    message_template: String,
}

pub(super) async fn personalize(
    State(state): State<AppState>,
    _session: Session,
    Json(body): Json<PersonalizeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_personalize_input(&body.lead_profile_data, &body.message_template)?;
    let personalizer = state
        .personalizer
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("Message personalization is not configured."))?;

    let message = personalizer
        .personalize(&body.lead_profile_data, &body.message_template)
        .await?;
    Ok(Json(json!({ "personalized_message": message })))
}
