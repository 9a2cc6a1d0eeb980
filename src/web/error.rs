use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{error, warn};

use crate::web::middleware::i18n::current_locale;
use crate::web::models::ApiResponse;

static EXPOSE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(true);

/// Controls whether the text of unexpected failures is embedded in the
/// envelope message. It is always logged either way.
pub fn set_expose_internal_errors(expose: bool) {
    EXPOSE_INTERNAL_ERRORS.store(expose, Ordering::Relaxed);
}

/// Numeric `error_code` carried by every response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    NotFound = 100,
    Unexpected = 101,
    Conflict = 102,
    Validation = 103,
    InvalidAction = 108,
    MissingField = 400,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Missing parameter: {0}")]
    MissingParameter(String),
    #[error("Duplicate tag: {0}")]
    DuplicateTag(String),
    #[error("Duplicate VM: {0}")]
    DuplicateVm(String),
    #[error("Tag in use: {0}")]
    TagInUse(String),
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Invalid action: {0}")]
    InvalidAction(String),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::InvalidInput(_) => ErrorCode::Validation,
            AppError::MissingParameter(_) => ErrorCode::MissingField,
            AppError::DuplicateTag(_) | AppError::DuplicateVm(_) | AppError::TagInUse(_) => {
                ErrorCode::Conflict
            }
            AppError::NotAuthorized(_) | AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::InvalidAction(_) => ErrorCode::InvalidAction,
            AppError::Unexpected(_) | AppError::DatabaseError(_) => ErrorCode::Unexpected,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::MissingParameter(_) | AppError::InvalidAction(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::DuplicateTag(_) | AppError::DuplicateVm(_) | AppError::TagInUse(_) => {
                StatusCode::CONFLICT
            }
            AppError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unexpected(_) | AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The user-facing message in `locale`.
    pub fn localized_message(&self, locale: &str) -> String {
        match self {
            AppError::InvalidInput(detail) => t!("error.validation", locale = locale, detail = detail).to_string(),
            AppError::MissingParameter(field) => t!("error.missing_parameter", locale = locale, field = field).to_string(),
            AppError::DuplicateTag(_) => t!("error.duplicate_tag", locale = locale).to_string(),
            AppError::DuplicateVm(_) => t!("error.duplicate_vm", locale = locale).to_string(),
            AppError::TagInUse(_) => t!("error.tag_in_use", locale = locale).to_string(),
            AppError::NotAuthorized(_) => t!("error.not_authorized", locale = locale).to_string(),
            AppError::NotFound(what) => t!("error.not_found", locale = locale, what = what).to_string(),
            AppError::InvalidAction(_) => t!("error.invalid_action", locale = locale).to_string(),
            AppError::Unexpected(detail) | AppError::DatabaseError(detail) => {
                if EXPOSE_INTERNAL_ERRORS.load(Ordering::Relaxed) {
                    t!("error.unexpected_detail", locale = locale, detail = detail).to_string()
                } else {
                    t!("error.unexpected", locale = locale).to_string()
                }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed.");
        } else {
            warn!(error = %self, "Request rejected.");
        }

        let body = ApiResponse::<serde_json::Value>::error(
            self.error_code(),
            self.localized_message(&current_locale()),
        );
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<axum_extra::extract::QueryRejection> for AppError {
    fn from(rejection: axum_extra::extract::QueryRejection) -> Self {
        AppError::InvalidInput(rejection.to_string())
    }
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

pub(crate) fn is_foreign_key_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::ForeignKeyConstraintViolation(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_map_to_fixed_codes() {
        let cases = [
            (AppError::InvalidInput("x".into()), ErrorCode::Validation, StatusCode::BAD_REQUEST),
            (AppError::MissingParameter("user_id".into()), ErrorCode::MissingField, StatusCode::BAD_REQUEST),
            (AppError::DuplicateTag("x".into()), ErrorCode::Conflict, StatusCode::CONFLICT),
            (AppError::DuplicateVm("x".into()), ErrorCode::Conflict, StatusCode::CONFLICT),
            (AppError::TagInUse("x".into()), ErrorCode::Conflict, StatusCode::CONFLICT),
            (AppError::NotAuthorized("x".into()), ErrorCode::NotFound, StatusCode::FORBIDDEN),
            (AppError::NotFound("x".into()), ErrorCode::NotFound, StatusCode::NOT_FOUND),
            (AppError::InvalidAction("x".into()), ErrorCode::InvalidAction, StatusCode::BAD_REQUEST),
            (AppError::DatabaseError("x".into()), ErrorCode::Unexpected, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, code, status) in cases {
            assert_eq!(err.error_code(), code, "{err}");
            assert_eq!(err.status_code(), status, "{err}");
        }
    }

    #[test]
    fn test_messages_follow_the_given_locale() {
        let err = AppError::NotFound("tag x".into());
        assert_eq!(err.localized_message("en"), "Not found: tag x");
        assert_eq!(err.localized_message("zh-CN"), "未找到: tag x");
        // unknown locales fall back to English
        assert_eq!(err.localized_message("fr"), "Not found: tag x");
    }

    #[test]
    fn test_error_code_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&ErrorCode::InvalidAction).unwrap(), "108");
        assert_eq!(serde_json::to_string(&ErrorCode::MissingField).unwrap(), "400");
    }
}
