use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use reach_rules::{translate_with_report, ModelSchema, RuleGroup, Translation, TranslationMode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct TranslateRequest {
    #[serde(default)]
    rules: Value,
    #[serde(default)]
    mode: Option<TranslationMode>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/rules/translate", post(translate_rules))
        .with_state(state)
}

async fn translate_rules(
    State(state): State<AppState>,
    Json(payload): Json<TranslateRequest>,
) -> AppResult<Json<Translation>> {
    let tree: RuleGroup = serde_json::from_value(payload.rules)
        .map_err(|err| AppError::bad_request(format!("invalid rule tree: {err}")))?;
    ModelSchema
        .validate(&tree)
        .map_err(|violations| AppError::bad_request(violations.to_string()))?;

    let mode = payload.mode.unwrap_or(state.translation_mode);
    let translation = translate_with_report(&tree, mode)?;
    debug!(
        %mode,
        conditions = translation.condition_count,
        lossy = translation.lossy,
        "translated rule tree"
    );
    Ok(Json(translation))
}
