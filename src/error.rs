// Error handling module
// Defines error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::LoginError;

/// Errors that can occur while serving a request or calling Smartflo
#[derive(Error, Debug)]
pub enum ApiError {
    /// Required configuration is absent
    #[error("Configuration missing: {0}")]
    ConfigMissing(String),

    /// Could not obtain a Smartflo credential
    #[error("Smartflo authentication failed: {0}")]
    AuthAcquisitionFailed(#[from] LoginError),

    /// Smartflo rejected the request even with a freshly acquired credential
    #[error("Smartflo rejected credentials after re-authentication: {message}")]
    AuthPersistentlyRejected {
        message: String,
        payload: Option<Value>,
    },

    /// The remote call never produced a response
    #[error("Network error calling Smartflo ({kind}): {message}")]
    TransientNetworkError { kind: &'static str, message: String },

    /// Smartflo answered with a non-success status
    #[error("Smartflo API error: {status} - {message}")]
    RemoteServiceError {
        status: u16,
        message: String,
        payload: Option<Value>,
    },

    /// Smartflo answered 2xx with a body that is not JSON
    #[error("Malformed Smartflo response: {0}")]
    MalformedResponse(String),

    /// Inbound caller failed authentication
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Request validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Short machine-readable kind, also used as the response `type`
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::ConfigMissing(_) => "config_missing",
            ApiError::AuthAcquisitionFailed(_) => "auth_acquisition_failed",
            ApiError::AuthPersistentlyRejected { .. } => "auth_persistently_rejected",
            ApiError::TransientNetworkError { .. } => "transient_network_error",
            ApiError::RemoteServiceError { .. } => "remote_service_error",
            ApiError::MalformedResponse(_) => "malformed_response",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::ValidationError(_) => "validation_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ConfigMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::AuthAcquisitionFailed(_) => StatusCode::BAD_GATEWAY,
            ApiError::AuthPersistentlyRejected { .. } => StatusCode::BAD_GATEWAY,
            ApiError::TransientNetworkError { kind, .. } => {
                if *kind == "timeout" {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::BAD_GATEWAY
                }
            }
            ApiError::RemoteServiceError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Original Smartflo error body, when there was one
    pub fn provider_payload(&self) -> Option<&Value> {
        match self {
            ApiError::AuthPersistentlyRejected { payload, .. }
            | ApiError::RemoteServiceError { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.kind();

        let message = match &self {
            ApiError::Internal(err) => {
                // Log internal errors
                tracing::error!("Internal error: {:?}", err);
                "Internal server error".to_string()
            }
            other => {
                if status.is_server_error() {
                    tracing::error!(error_type, "{}", other);
                }
                other.to_string()
            }
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "message": message,
                "type": error_type,
            },
            "providerError": self.provider_payload(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
