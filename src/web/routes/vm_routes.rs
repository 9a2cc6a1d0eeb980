use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use axum_extra::extract::{Query, QueryRejection};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::services::{vm_service, VmQuery, VmWithTags};
use crate::web::models::{ApiResponse, CreateVmRequest, UpdateVmRequest};
use crate::web::middleware::i18n::localized;
use crate::web::{AppError, AppState};

pub fn create_vms_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(list_vms_handler)
                .post(create_vm_handler)
                .put(update_vm_by_body_handler),
        )
        .route(
            "/{vm_id}",
            get(get_vm_handler).put(update_vm_handler).delete(delete_vm_handler),
        )
}

// --- Route Handlers ---

async fn list_vms_handler(
    State(app_state): State<Arc<AppState>>,
    query: Result<Query<VmQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<VmWithTags>>>, AppError> {
    let Query(query) = query?;
    let vms = vm_service::list_vms(&app_state.db_pool, &query).await?;
    Ok(Json(ApiResponse::success(localized("success.vms_listed"), vms)))
}

async fn get_vm_handler(
    State(app_state): State<Arc<AppState>>,
    vm_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Vec<VmWithTags>>>, AppError> {
    let Path(vm_id) = vm_id?;
    let query = VmQuery {
        vm_id: Some(vm_id),
        ..Default::default()
    };
    let vms = vm_service::list_vms(&app_state.db_pool, &query).await?;
    Ok(Json(ApiResponse::success(localized("success.vms_listed"), vms)))
}

async fn create_vm_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<CreateVmRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<VmWithTags>>), AppError> {
    let Json(payload) = payload?;
    let vm = vm_service::create_vm(
        &app_state.db_pool,
        payload.vm_name.as_deref().unwrap_or_default(),
        &payload.tags,
        payload.user_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(localized("success.vm_created"), vm))))
}

async fn update_vm_handler(
    State(app_state): State<Arc<AppState>>,
    vm_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateVmRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<VmWithTags>>, AppError> {
    let Path(vm_id) = vm_id?;
    let Json(payload) = payload?;
    let vm = vm_service::update_vm(&app_state.db_pool, vm_id, payload.vm_name, payload.tags).await?;
    Ok(Json(ApiResponse::success(localized("success.vm_updated"), vm)))
}

async fn update_vm_by_body_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<UpdateVmRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<VmWithTags>>, AppError> {
    let Json(payload) = payload?;
    let vm_id = payload
        .vm_id
        .ok_or_else(|| AppError::MissingParameter("id".to_string()))?;
    let vm = vm_service::update_vm(&app_state.db_pool, vm_id, payload.vm_name, payload.tags).await?;
    Ok(Json(ApiResponse::success(localized("success.vm_updated"), vm)))
}

async fn delete_vm_handler(
    State(app_state): State<Arc<AppState>>,
    vm_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let Path(vm_id) = vm_id?;
    vm_service::delete_vm(&app_state.db_pool, vm_id).await?;
    Ok(Json(ApiResponse::success(localized("success.vm_deleted"), json!({ "vm_id": vm_id }))))
}
