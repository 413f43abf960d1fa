use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use reach_rules::{parse_query, BackendQuery};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::domain::{CampaignDraft, NewCampaign, NewSegment};
use crate::error::{AppError, EnvelopeResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCampaignRequest {
    #[serde(default)]
    campaign_name: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    segment_name: Option<String>,
    #[serde(default)]
    segment_rules: Value,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/campaigns", get(list_campaigns).post(create_campaign))
        .with_state(state)
}

/// Creates the audience segment first, then the campaign pointing at it.
async fn create_campaign(
    State(state): State<AppState>,
    Json(payload): Json<CreateCampaignRequest>,
) -> EnvelopeResult<impl IntoResponse> {
    // Unreadable rules count as "no conditions", so name and message
    // problems are reported first.
    let rules = parse_query(&payload.segment_rules).unwrap_or_else(|err| {
        debug!(error = %err, "campaign rules could not be read");
        BackendQuery::default()
    });
    let draft = CampaignDraft::validated(
        &payload.campaign_name,
        &payload.message,
        payload.segment_name.as_deref(),
        rules,
    )?;

    let estimate = state
        .store
        .estimate_audience(&draft.rules, state.sample_size)
        .await?;

    let segment = state
        .store
        .create_segment(NewSegment::validated(&draft.segment_name, draft.rules.clone())?)
        .await?;

    let campaign = state
        .store
        .create_campaign(NewCampaign {
            name: draft.campaign_name.clone(),
            message_template: draft.message.clone(),
            audience_size: estimate.audience_size as u64,
            segment_id: segment.id,
        })
        .await
        .map_err(|err| {
            warn!(
                segment_id = %segment.id,
                error = %err,
                "campaign insert failed, segment left without a campaign"
            );
            AppError::internal("Failed to create campaign")
        })?;

    info!(
        campaign_id = %campaign.id,
        segment_id = %segment.id,
        audience_size = campaign.audience_size,
        "campaign created"
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "segment": segment,
            "campaign": campaign,
        })),
    ))
}

async fn list_campaigns(State(state): State<AppState>) -> EnvelopeResult<impl IntoResponse> {
    let campaigns = state.store.list_campaigns().await?;
    Ok(Json(json!({ "success": true, "data": campaigns })))
}
