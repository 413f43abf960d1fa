use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::domain::PageRequest;
use crate::error::EnvelopeResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogsQuery {
    page: Option<u32>,
    page_size: Option<u32>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/dashboard/stats", get(dashboard_stats))
        .route("/api/dashboard/campaign-status", get(campaign_status))
        .route("/api/logs", get(list_logs))
        .with_state(state)
}

async fn dashboard_stats(State(state): State<AppState>) -> EnvelopeResult<impl IntoResponse> {
    let stats = state.store.dashboard_stats().await?;
    Ok(Json(json!({ "success": true, "data": stats })))
}

async fn campaign_status(State(state): State<AppState>) -> EnvelopeResult<impl IntoResponse> {
    let counts = state.store.campaign_status_counts().await?;
    Ok(Json(json!({ "success": true, "data": counts })))
}

async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> EnvelopeResult<impl IntoResponse> {
    let page = PageRequest::new(query.page, query.page_size);
    let logs = state.store.list_logs(page).await?;
    Ok(Json(json!({
        "success": true,
        "data": logs.logs,
        "total": logs.total,
        "page": page.page,
        "pageSize": page.page_size,
        "totalPages": page.total_pages(logs.total),
    })))
}
