use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use std::sync::Arc;

use crate::db::services::{assignment_service, AssignmentAction, AssignmentOutcome};
use crate::web::models::{ApiResponse, AssignUnassignRequest};
use crate::web::middleware::i18n::localized;
use crate::web::{AppError, AppState};

pub fn create_assignment_router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(assign_unassign_handler))
}

async fn assign_unassign_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<AssignUnassignRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AssignmentOutcome>>, AppError> {
    let Json(payload) = payload?;
    let action = payload
        .action
        .ok_or_else(|| AppError::MissingParameter("action".to_string()))?;
    let tag_name = payload
        .tag_name
        .ok_or_else(|| AppError::MissingParameter("tag_name".to_string()))?;

    let outcome = assignment_service::dispatch(
        &app_state.db_pool,
        &action,
        &tag_name,
        payload.scope.as_deref(),
        &payload.vm_ids,
    )
    .await?;

    let message = match outcome.action {
        AssignmentAction::Assign => localized("success.tag_assigned"),
        AssignmentAction::Unassign => localized("success.tag_unassigned"),
    };
    Ok(Json(ApiResponse::success(message, outcome)))
}
