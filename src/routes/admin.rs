use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::dto::admin_dto::{CreateTestRequest, RankResponse, SweepResponse};
use crate::error::Result;
use crate::models::test::Test;
use crate::AppState;

#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    Json(payload): Json<CreateTestRequest>,
) -> Result<(StatusCode, Json<Test>)> {
    let test = state.test_service.create_test(payload).await?;
    Ok((StatusCode::CREATED, Json(test)))
}

#[axum::debug_handler]
pub async fn get_test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Test>> {
    Ok(Json(state.test_service.get_test(id).await?))
}

#[axum::debug_handler]
pub async fn annotate_ranks(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RankResponse>> {
    let ranked = state.attempt_service.annotate_ranks(id).await?;
    Ok(Json(RankResponse { ranked }))
}

#[axum::debug_handler]
pub async fn sweep_stale(State(state): State<AppState>) -> Result<Json<SweepResponse>> {
    let auto_submitted = state.auto_submit_service.sweep_stale().await?;
    Ok(Json(SweepResponse { auto_submitted }))
}
