//! Server-side rule builder sessions.
//!
//! A session owns one [`RuleBuilder`](reach_rules::RuleBuilder). Every
//! mutation that changes the tree schedules a fresh audience estimate; the
//! response waits for it, and the estimate reported is always the one for
//! the newest generation that has finished.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use reach_rules::{PreviewSnapshot, RuleGroup};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::sessions::{BuilderOp, SharedBuilder};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct OpenSessionRequest {
    #[serde(default)]
    tree: Option<RuleGroup>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    session_id: Uuid,
    tree: RuleGroup,
    generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimate: Option<PreviewSnapshot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MutationView {
    #[serde(flatten)]
    session: SessionView,
    changed: bool,
    created: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/builder/sessions", post(open_session))
        .route("/api/builder/sessions/:id", get(get_session))
        .route("/api/builder/sessions/:id/mutations", post(apply_mutation))
        .with_state(state)
}

fn view(session_id: Uuid, builder: &SharedBuilder, with_estimate: bool) -> SessionView {
    let builder = builder.lock();
    SessionView {
        session_id,
        tree: builder.tree().clone(),
        generation: builder.generation(),
        estimate: if with_estimate {
            builder.latest_estimate()
        } else {
            None
        },
    }
}

fn find_session(state: &AppState, id: Uuid) -> AppResult<SharedBuilder> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| AppError::not_found("Builder session not found"))
}

async fn open_session(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        OpenSessionRequest::default()
    } else {
        serde_json::from_slice::<OpenSessionRequest>(&body)
            .map_err(|err| AppError::bad_request(format!("invalid session request: {err}")))?
    };

    let (id, builder) = state.sessions.open(request.tree.unwrap_or_default())?;
    Ok((StatusCode::CREATED, Json(view(id, &builder, false))))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionView>> {
    let builder = find_session(&state, id)?;
    Ok(Json(view(id, &builder, true)))
}

async fn apply_mutation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> AppResult<Json<MutationView>> {
    let builder = find_session(&state, id)?;
    let op: BuilderOp = serde_json::from_value(payload)
        .map_err(|err| AppError::bad_request(format!("invalid builder mutation: {err}")))?;

    let mutation = {
        let mut guard = builder.lock();
        op.apply(&mut guard)?
    };

    if let Some(preview) = mutation.preview {
        let generation = preview.ticket.generation();
        let recorded = preview.wait().await;
        debug!(session_id = %id, generation, recorded, "builder preview settled");
    }

    Ok(Json(MutationView {
        session: view(id, &builder, true),
        changed: mutation.changed,
        created: mutation.created,
    }))
}
