use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::attempt_dto::{
    AttemptViewResponse, AutoSubmitRequest, AutoSubmitResponse, AutosaveRequest,
    AutosaveResponse, HeartbeatRequest, HeartbeatResponse, StartAttemptRequest,
    StartAttemptResponse, SubmitRequest, SubmitResponse, TrackTimeRequest, TrackTimeResponse,
    VisibilityRequest, VisibilityResponse,
};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::AppState;

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<Json<StartAttemptResponse>> {
    let started = state
        .attempt_service
        .start(claims.student_id()?, payload.test_id)
        .await?;
    Ok(Json(StartAttemptResponse {
        attempt: started.attempt,
        resumed: started.resumed,
    }))
}

#[axum::debug_handler]
pub async fn autosave(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AutosaveRequest>,
) -> Result<Json<AutosaveResponse>> {
    let timestamp = state
        .autosave_service
        .autosave(claims.student_id()?, payload)
        .await?;
    Ok(Json(AutosaveResponse { timestamp }))
}

#[axum::debug_handler]
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>> {
    let last_heartbeat = state
        .heartbeat_service
        .heartbeat(claims.student_id()?, payload)
        .await?;
    Ok(Json(HeartbeatResponse { last_heartbeat }))
}

#[axum::debug_handler]
pub async fn track_time(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<TrackTimeRequest>,
) -> Result<Json<TrackTimeResponse>> {
    state
        .timing_service
        .record_action(claims.student_id()?, payload)
        .await?;
    Ok(Json(TrackTimeResponse { success: true }))
}

#[axum::debug_handler]
pub async fn auto_submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AutoSubmitRequest>,
) -> Result<Json<AutoSubmitResponse>> {
    let outcome = state
        .auto_submit_service
        .auto_submit(payload.attempt_id, claims.student_id()?, payload.reason)
        .await?;
    Ok(Json(AutoSubmitResponse {
        status: outcome.status,
    }))
}

#[axum::debug_handler]
pub async fn report_visibility(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<VisibilityRequest>,
) -> Result<Json<VisibilityResponse>> {
    payload.validate()?;
    let outcome = state
        .auto_submit_service
        .report_visibility(payload.attempt_id, claims.student_id()?, payload.hidden_for_secs)
        .await?;
    Ok(Json(VisibilityResponse {
        status: outcome.status,
        auto_submitted: outcome.auto_submitted,
    }))
}

#[axum::debug_handler]
pub async fn submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>> {
    let outcome = state
        .attempt_service
        .submit(claims.student_id()?, payload)
        .await?;
    Ok(Json(SubmitResponse {
        attempt_id: outcome.attempt.id,
        status: outcome.attempt.status,
        score: outcome.attempt.score,
        already_finalized: outcome.already_finalized,
    }))
}

#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<AttemptViewResponse>> {
    let view = state
        .attempt_service
        .view(id, claims.student_id()?)
        .await?;
    Ok(Json(view))
}
