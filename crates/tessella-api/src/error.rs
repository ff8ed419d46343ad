//! HTTP error response conversion.
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`; every
//! `AppError` (and the storage errors that convert into it) renders as a
//! consistent JSON body with a machine-readable code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tessella_core::{AppError, LogLevel};
use tessella_storage::StorageError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable error code for programmatic handling.
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Wrapper type for AppError to implement IntoResponse. Rust's orphan rules
/// forbid implementing IntoResponse for a type from another crate directly.
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl From<anyhow::Error> for HttpAppError {
    fn from(err: anyhow::Error) -> Self {
        HttpAppError(AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        })
    }
}

impl From<StorageError> for HttpAppError {
    fn from(err: StorageError) -> Self {
        HttpAppError(err.into())
    }
}

fn log_error(error: &AppError) {
    let code = error.error_code();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, code, "Request failed");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, code, "Request failed");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, code, "Request failed");
        }
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.0;

        let status = StatusCode::from_u16(app_error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(app_error);

        // Sensitive errors keep internal detail out of the response body.
        let body = if app_error.is_sensitive() {
            ErrorResponse {
                error: "Internal server error".to_string(),
                code: app_error.error_code().to_string(),
                details: None,
            }
        } else {
            ErrorResponse {
                error: app_error.to_string(),
                code: app_error.error_code().to_string(),
                details: None,
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixity_mismatch_renders_as_bad_request() {
        let err = HttpAppError(AppError::FixityMismatch {
            declared: "abc".to_string(),
            computed: "def".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = HttpAppError(AppError::Internal("pool exhausted".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn storage_not_found_maps_to_conflict() {
        let err: HttpAppError = StorageError::NotFound("uploads/x.tif".to_string()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn error_response_shape() {
        let response = ErrorResponse {
            error: "Not found".to_string(),
            code: "NOT_FOUND".to_string(),
            details: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "Not found");
        assert_eq!(json["code"], "NOT_FOUND");
        assert!(json.get("details").is_none());
    }
}
