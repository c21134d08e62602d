use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
};
use uuid::Uuid;

use crate::error::Result;
use crate::AppState;

#[axum::debug_handler]
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let report = state.reports.build_report(id).await?;
    Ok(Json(report).into_response())
}
