use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::dto::session_dto::{
    EnterModuleRequest, RecordAnswerRequest, StartSessionRequest, SubmitModuleRequest, ViolationRequest,
};
use crate::error::Result;
use crate::models::module_kind::ModuleKind;
use crate::AppState;

#[axum::debug_handler]
pub async fn start_session(
    State(state): State<AppState>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<Response> {
    payload.validate()?;
    let session = state.runner.start_session(&payload.modules).await?;
    Ok((StatusCode::CREATED, Json(session)).into_response())
}

#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let session = state.runner.flow().get(id).await?;
    Ok(Json(session).into_response())
}

#[axum::debug_handler]
pub async fn enter_module(
    State(state): State<AppState>,
    Path((id, module)): Path<(Uuid, String)>,
    payload: Option<Json<EnterModuleRequest>>,
) -> Result<Response> {
    let module: ModuleKind = module.parse()?;
    let Some(Json(payload)) = payload else {
        let session = state.runner.enter_module(id, module).await?;
        return Ok(Json(session).into_response());
    };

    payload.validate()?;
    let active = state.runner.begin_module(id, payload.into_attempt(module)).await?;
    let session = state.runner.flow().get(id).await?;
    Ok(Json(json!({
        "session": session,
        "expires_at": active.snapshot().expires_at,
    }))
    .into_response())
}

#[axum::debug_handler]
pub async fn record_answer(
    State(state): State<AppState>,
    Path((id, module)): Path<(Uuid, String)>,
    Json(payload): Json<RecordAnswerRequest>,
) -> Result<Response> {
    let module: ModuleKind = module.parse()?;
    payload.validate()?;
    let recorded = state
        .runner
        .record_answer(id, module, &payload.question_id, &payload.answer)?;
    Ok(Json(json!({ "recorded": recorded })).into_response())
}

#[axum::debug_handler]
pub async fn submit_module(
    State(state): State<AppState>,
    Path((id, module)): Path<(Uuid, String)>,
    Json(payload): Json<SubmitModuleRequest>,
) -> Result<Response> {
    let module: ModuleKind = module.parse()?;
    payload.validate()?;
    let attempt = payload.into_attempt(module);
    let result = state.runner.submit_manual(id, attempt).await?;
    Ok(Json(result).into_response())
}

#[axum::debug_handler]
pub async fn finalize_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let outcome = state.runner.finalize(id).await?;
    Ok(Json(outcome).into_response())
}

#[axum::debug_handler]
pub async fn report_violation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ViolationRequest>,
) -> Result<Response> {
    payload.validate()?;
    let violation = state
        .runner
        .report_violation(id, payload.kind.trim(), payload.detail)
        .await?;
    Ok((StatusCode::CREATED, Json(violation)).into_response())
}
