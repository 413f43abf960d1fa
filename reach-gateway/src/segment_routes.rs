use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use reach_core::errors::ReachError;
use reach_rules::{parse_query, AudienceEstimate};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::domain::NewSegment;
use crate::error::{AppResult, EnvelopeResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateSegmentRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    rules: Value,
}

#[derive(Debug, Deserialize)]
struct PreviewRequest {
    #[serde(default)]
    rules: Value,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/segments", get(list_segments).post(create_segment))
        .route("/api/segments/preview", post(preview_segment))
        .route("/api/segments/:id", get(get_segment))
        .with_state(state)
}

async fn create_segment(
    State(state): State<AppState>,
    Json(payload): Json<CreateSegmentRequest>,
) -> EnvelopeResult<impl IntoResponse> {
    let name = NewSegment::validate_name(&payload.name)?;
    let rules = parse_query(&payload.rules)?;
    let segment = state
        .store
        .create_segment(NewSegment::validated(&name, rules)?)
        .await?;

    info!(segment_id = %segment.id, name = %segment.name, "segment created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!("Segment \"{}\" created successfully.", segment.name),
            "data": segment,
        })),
    ))
}

async fn list_segments(State(state): State<AppState>) -> EnvelopeResult<impl IntoResponse> {
    let segments = state.store.list_segments().await?;
    Ok(Json(json!({ "success": true, "data": segments })))
}

async fn get_segment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> EnvelopeResult<impl IntoResponse> {
    let segment = state
        .store
        .find_segment(id)
        .await?
        .ok_or_else(|| ReachError::not_found("Segment not found"))?;
    Ok(Json(json!({ "success": true, "data": segment })))
}

async fn preview_segment(
    State(state): State<AppState>,
    Json(payload): Json<PreviewRequest>,
) -> AppResult<Json<AudienceEstimate>> {
    let query = parse_query(&payload.rules)?;
    let estimate = state
        .store
        .estimate_audience(&query, state.sample_size)
        .await?;
    Ok(Json(estimate))
}
