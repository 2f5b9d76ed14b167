//! Error taxonomy and the uniform response envelope.

use axum::{
    Json,
    extract::{multipart::MultipartRejection, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::QueryRejection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Why a request could not be authenticated. Every variant collapses into the same
/// generic 401 for the caller; the variant is only visible in server logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no session token was presented")]
    MissingToken,
    #[error("session token could not be parsed")]
    MalformedToken,
    #[error("session token signature does not match")]
    InvalidSignature,
    #[error("session token has expired")]
    ExpiredToken,
    #[error("invalid username or password")]
    InvalidCredentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthzError {
    #[error("role does not permit this operation")]
    InsufficientRole,
    #[error("caller does not own this record")]
    NotOwner,
}

/// Failures reported by the persistence collaborator.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return RepoError::Conflict(db.constraint().unwrap_or("unique").to_string());
            }
        }
        RepoError::Backend(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload rejected: {0}")]
    Rejected(String),
    #[error("object storage failure: {0}")]
    Backend(String),
}

/// AppError
///
/// The single error type returned by every operation. Converted into the response
/// envelope at the HTTP boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Authz(#[from] AuthzError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// HTTP status and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Auth(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Authz(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// The message shown to the client. Authentication failures are deliberately
    /// indistinguishable and internal details never leave the server.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Auth(AuthError::InvalidCredentials) => {
                AuthError::InvalidCredentials.to_string()
            }
            AppError::Auth(_) => "unauthorized".to_string(),
            AppError::Authz(_) => "operation not permitted".to_string(),
            AppError::Internal(_) => "service busy, please try again later".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict(what) => AppError::Conflict(format!("duplicate {what}")),
            RepoError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Rejected(msg) => AppError::Validation(msg),
            StorageError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

// Extractor rejections carry deserializer detail. It is logged, never returned.

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(detail = %rejection.body_text(), "Rejected request body");
        AppError::validation("invalid request body")
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(detail = %rejection, "Rejected query string");
        AppError::validation("invalid query string")
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        tracing::debug!(detail = %rejection.body_text(), "Rejected multipart request");
        AppError::validation("invalid multipart body")
    }
}

/// ApiResponse
///
/// Envelope wrapped around every response body: a machine code, a human message and
/// the payload (absent on errors).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub code: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: "OK".to_string(),
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

/// Result type returned by handlers.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        match &self {
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal server error");
            }
            AppError::Auth(reason) => {
                tracing::debug!(reason = %reason, "Request rejected as unauthenticated");
            }
            other => {
                tracing::debug!(error = %other, code, "Request failed");
            }
        }

        let body: ApiResponse<()> = ApiResponse {
            code: code.to_string(),
            message: self.public_message(),
            data: None,
        };

        (status, Json(body)).into_response()
    }
}
