use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    entities::tag,
    services::{tag_service, TagFilter},
};
use crate::web::models::{ApiResponse, CreateTagRequest, DeleteTagQuery, RequesterQuery};
use crate::web::middleware::i18n::localized;
use crate::web::{AppError, AppState};

pub fn create_tags_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(list_tags_handler)
                .post(create_tag_handler)
                .delete(delete_tag_by_query_handler),
        )
        .route("/{tag_id}", get(get_tag_handler).delete(delete_tag_handler))
}

// --- Route Handlers ---

async fn list_tags_handler(
    State(app_state): State<Arc<AppState>>,
    filter: Result<Query<TagFilter>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<tag::Model>>>, AppError> {
    let Query(filter) = filter?;
    let tags = tag_service::list_tags(&app_state.db_pool, &filter).await?;
    Ok(Json(ApiResponse::success(localized("success.tags_listed"), tags)))
}

async fn get_tag_handler(
    State(app_state): State<Arc<AppState>>,
    tag_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<tag::Model>>, AppError> {
    let Path(tag_id) = tag_id?;
    let tag = tag_service::get_tag(&app_state.db_pool, tag_id).await?;
    Ok(Json(ApiResponse::success(localized("success.tag_found"), tag)))
}

async fn create_tag_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<CreateTagRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<tag::Model>>), AppError> {
    let Json(payload) = payload?;
    let user_id = payload
        .user_id
        .ok_or_else(|| AppError::MissingParameter("user_id".to_string()))?;

    let tag = tag_service::create_tag(
        &app_state.db_pool,
        payload.tag_name.as_deref().unwrap_or_default(),
        payload.scope.as_deref(),
        user_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(localized("success.tag_created"), tag))))
}

async fn delete_tag_by_query_handler(
    State(app_state): State<Arc<AppState>>,
    query: Result<Query<DeleteTagQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let Query(query) = query?;
    tag_service::delete_tag(&app_state.db_pool, query.tag_id, query.user_id).await?;
    Ok(Json(ApiResponse::success(
        localized("success.tag_deleted"),
        json!({ "tag_id": query.tag_id }),
    )))
}

async fn delete_tag_handler(
    State(app_state): State<Arc<AppState>>,
    tag_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<RequesterQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let Path(tag_id) = tag_id?;
    let Query(query) = query?;
    tag_service::delete_tag(&app_state.db_pool, Some(tag_id), query.user_id).await?;
    Ok(Json(ApiResponse::success(
        localized("success.tag_deleted"),
        json!({ "tag_id": tag_id }),
    )))
}
