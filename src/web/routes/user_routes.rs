use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::db::{entities::user, services::user_service};
use crate::web::models::{ApiResponse, CreateUserRequest};
use crate::web::middleware::i18n::localized;
use crate::web::{AppError, AppState};

pub fn create_user_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_users_handler).post(create_user_handler))
}

async fn list_users_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<user::Model>>>, AppError> {
    let users = user_service::list_users(&app_state.db_pool).await?;
    Ok(Json(ApiResponse::success(localized("success.users_listed"), users)))
}

async fn create_user_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<user::Model>>), AppError> {
    let Json(payload) = payload?;
    let user = user_service::create_user(
        &app_state.db_pool,
        payload.user_name.as_deref().unwrap_or_default(),
        payload.role,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(localized("success.user_created"), user))))
}
