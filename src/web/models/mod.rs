use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::enums::UserRole;
use crate::web::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// The uniform body of every API response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: ResponseStatus,
    pub error_code: ErrorCode,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            error_code: ErrorCode::Success,
            message: message.into(),
            data,
        }
    }
}

impl ApiResponse<serde_json::Value> {
    pub fn error(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            error_code,
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }
}

// --- Tags ---

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub tag_name: Option<String>,
    pub scope: Option<String>,
    pub user_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteTagQuery {
    pub tag_id: Option<Uuid>,
    pub user_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct RequesterQuery {
    pub user_id: Option<i32>,
}

// --- Assignment ---

#[derive(Debug, Deserialize)]
pub struct AssignUnassignRequest {
    pub action: Option<String>,
    pub tag_name: Option<String>,
    /// Disambiguates `tag_name` when several tags share it. `""` means "no scope".
    pub scope: Option<String>,
    #[serde(default)]
    pub vm_ids: Vec<Uuid>,
}

// --- VMs ---

#[derive(Debug, Deserialize)]
pub struct CreateVmRequest {
    pub vm_name: Option<String>,
    /// `"name:scope"` specs.
    #[serde(default)]
    pub tags: Vec<String>,
    pub user_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVmRequest {
    #[serde(alias = "id")]
    pub vm_id: Option<Uuid>,
    pub vm_name: Option<String>,
    /// Replaces the VM's tag set when present.
    pub tags: Option<Vec<Uuid>>,
}

// --- Users ---

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub user_name: Option<String>,
    pub role: Option<UserRole>,
}
