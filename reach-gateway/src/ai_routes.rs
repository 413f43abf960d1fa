//! Generative endpoints. Both sit behind the AI rate limiter and answer 503
//! when no generator is configured.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::middleware;
use axum::routing::post;
use axum::{Json, Router};
use reach_rules::RuleGroup;
use reach_synth::MessageRequest;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::rate_limit::enforce_rate_limit;
use crate::state::{AiServices, AppState};

pub const SESSION_HEADER: &str = "x-session-id";
const ANONYMOUS_SESSION: &str = "anonymous";

#[derive(Debug, Deserialize)]
struct RulesRequest {
    #[serde(default)]
    description: Value,
}

pub fn router(state: AppState) -> Router {
    let limiter = state.ai_rate_limit.clone();
    Router::new()
        .route("/api/ai/rules", post(synthesize_rules))
        .route("/api/ai/message", post(compose_message))
        .route_layer(middleware::from_fn_with_state(limiter, enforce_rate_limit))
        .with_state(state)
}

fn ai_services(state: &AppState) -> AppResult<&AiServices> {
    state
        .ai
        .as_ref()
        .ok_or_else(|| AppError::unavailable("AI features are not configured"))
}

fn session_key(headers: &HeaderMap) -> &str {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(ANONYMOUS_SESSION)
}

/// Identical descriptions from the same session share one generator call.
async fn synthesize_rules(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RulesRequest>,
) -> AppResult<Json<RuleGroup>> {
    let ai = ai_services(&state)?;
    let description = match payload.description {
        Value::String(text) if !text.trim().is_empty() => text,
        _ => {
            return Err(AppError::bad_request(
                "Description is required and must be a string",
            ))
        }
    };

    let key = format!("{}\u{0}{}", session_key(&headers), description.trim());
    let synthesizer = ai.synthesizer.clone();
    let tree = ai
        .flight
        .run(&key, move || async move {
            synthesizer.synthesize(&description).await
        })
        .await?;

    info!(conditions = tree.condition_count(), "returned synthesized rules");
    Ok(Json(tree))
}

async fn compose_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> AppResult<Json<Value>> {
    let ai = ai_services(&state)?;
    match ai.composer.compose(&request).await {
        Ok(message) => Ok(Json(json!({ "message": message }))),
        Err(err) if err.is_client_error() => Err(AppError::bad_request(err.user_message())),
        Err(err) => {
            error!(error = %err, "message generation failed");
            Err(AppError::internal("Failed to generate message"))
        }
    }
}
