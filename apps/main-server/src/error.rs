//! Server error types.

use api_protocol::{ErrorResponse, FieldError};
use auth::AuthError;
use axum::{
    Json,
    body::Body,
    extract::{
        Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, header::CONTENT_LENGTH},
    middleware::Next,
    response::{IntoResponse, Response},
};
use task_store::TaskStoreError;
use validator::ValidationErrors;

use crate::services::storage::StorageError;

/// Message returned for every 500 response.
const INTERNAL_MESSAGE: &str = "Internal server error";

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Malformed or out-of-range input.
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },

    /// No token was presented.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// The presented token is invalid, expired, or its user is gone or inactive.
    #[error("Invalid token")]
    InvalidToken,

    /// Unknown email, wrong password or inactive account.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Password reset token could not be used.
    #[error("Invalid or expired reset token")]
    InvalidOrExpiredToken,

    /// Valid identity without access to the resource.
    #[error("{0}")]
    AccessDenied(String),

    /// Valid identity whose global role is not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Request conflicts with the current state.
    #[error("{0}")]
    Conflict(String),

    /// Request body exceeds the configured limit.
    #[error("Request body too large")]
    PayloadTooLarge,

    /// Store error.
    #[error("Database error: {0}")]
    Database(#[from] TaskStoreError),

    /// Authentication error.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// File storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Creates a validation error for a single field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Validation {
            errors: vec![FieldError::new(field, message.clone())],
            message,
        }
    }

    /// Creates a validation error from failed validation rules.
    pub fn validation(errors: &ValidationErrors) -> Self {
        Self::Validation {
            message: "Validation errors".to_string(),
            errors: crate::validation::field_errors(errors),
        }
    }

    fn store_error_response(err: &TaskStoreError) -> (StatusCode, String) {
        match err {
            TaskStoreError::NotFound { entity_type, .. } => {
                (StatusCode::NOT_FOUND, format!("{entity_type} not found"))
            }
            TaskStoreError::AlreadyExists { entity_type, .. } => {
                let message = match *entity_type {
                    "User" => "User with this email already exists".to_string(),
                    "ProjectMember" => "User is already a member of this project".to_string(),
                    other => format!("{other} already exists"),
                };
                (StatusCode::BAD_REQUEST, message)
            }
            TaskStoreError::HasDependentTasks(_) => (
                StatusCode::BAD_REQUEST,
                "Cannot delete project with existing tasks. Please delete or move tasks first."
                    .to_string(),
            ),
            TaskStoreError::OwnsProjects(_) => (
                StatusCode::BAD_REQUEST,
                "Cannot delete user who owns projects. Please transfer ownership first."
                    .to_string(),
            ),
            TaskStoreError::HasAssignedTasks(_) => (
                StatusCode::BAD_REQUEST,
                "Cannot delete user with assigned tasks. Please reassign tasks first.".to_string(),
            ),
            TaskStoreError::ForeignKeyViolation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            TaskStoreError::Other(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
            }
        }
    }

    /// Returns the status code and public message of this error.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ServerError::Validation { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
            ServerError::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                "Access denied. No token provided.".to_string(),
            ),
            ServerError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),
            ServerError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
            }
            ServerError::InvalidOrExpiredToken => (
                StatusCode::BAD_REQUEST,
                "Invalid or expired reset token".to_string(),
            ),
            ServerError::AccessDenied(msg) | ServerError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, msg.clone())
            }
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ServerError::Conflict(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large".to_string(),
            ),
            ServerError::Database(e) => Self::store_error_response(e),
            ServerError::Auth(e) if e.is_token_rejection() => {
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            }
            ServerError::Storage(StorageError::InvalidName(_)) => {
                (StatusCode::NOT_FOUND, "File not found".to_string())
            }
            ServerError::Auth(_) | ServerError::Storage(_) | ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
            }
        }
    }
}

/// Detailed cause of a 500 response, attached as a response extension.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        let mut body = ErrorResponse::new(message);
        if let ServerError::Validation { errors, .. } = &self {
            body = body.with_errors(errors.clone());
        }

        let mut response = (status, Json(body)).into_response();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            response
                .extensions_mut()
                .insert(ErrorDetail(self.to_string()));
        }
        response
    }
}

impl From<ValidationErrors> for ServerError {
    fn from(errors: ValidationErrors) -> Self {
        ServerError::validation(&errors)
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ServerError::PayloadTooLarge;
        }
        ServerError::Validation {
            message: "Validation errors".to_string(),
            errors: vec![FieldError::new("body", rejection.body_text())],
        }
    }
}

impl From<MultipartRejection> for ServerError {
    fn from(rejection: MultipartRejection) -> Self {
        ServerError::Validation {
            message: "Validation errors".to_string(),
            errors: vec![FieldError::new("files", rejection.body_text())],
        }
    }
}

impl From<MultipartError> for ServerError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ServerError::PayloadTooLarge;
        }
        ServerError::Validation {
            message: "Validation errors".to_string(),
            errors: vec![FieldError::new("files", err.body_text())],
        }
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        ServerError::Validation {
            message: "Validation errors".to_string(),
            errors: vec![FieldError::new("query", rejection.body_text())],
        }
    }
}

impl From<PathRejection> for ServerError {
    fn from(rejection: PathRejection) -> Self {
        ServerError::Validation {
            message: "Validation errors".to_string(),
            errors: vec![FieldError::new("path", rejection.body_text())],
        }
    }
}

/// Adds the detailed cause of 500 responses to their body as `error`.
///
/// Only installed in development mode.
pub async fn expose_error_details(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let Ok(bytes) = axum::body::to_bytes(body, usize::MAX).await else {
        return Response::from_parts(parts, Body::empty());
    };
    let mut payload: ErrorResponse = match serde_json::from_slice(&bytes) {
        Ok(payload) => payload,
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };
    payload.error = Some(detail);

    match serde_json::to_vec(&payload) {
        Ok(encoded) => {
            parts.headers.remove(CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(encoded))
        }
        Err(_) => Response::from_parts(parts, Body::from(bytes)),
    }
}

/// Fallback for unknown routes.
pub async fn route_not_found() -> ServerError {
    ServerError::NotFound("Route not found".to_string())
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_body() {
        let response = ServerError::invalid_field("email", "Please provide a valid email")
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["errors"][0]["field"], "email");
    }

    #[tokio::test]
    async fn test_internal_message_is_redacted() {
        let response = ServerError::Internal("disk on fire".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<ErrorDetail>().is_some());

        let json = body_json(response).await;
        assert_eq!(json["message"], "Internal server error");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_store_error_mapping() {
        let cases = [
            (
                ServerError::from(TaskStoreError::not_found("Project", Uuid::new_v4())),
                StatusCode::NOT_FOUND,
            ),
            (
                ServerError::from(TaskStoreError::HasDependentTasks(Uuid::new_v4())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServerError::from(TaskStoreError::already_exists("User", "a@b.c")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServerError::from(TaskStoreError::Other("boom".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status_and_message().0, status);
        }
    }

    #[test]
    fn test_auth_error_mapping() {
        assert_eq!(
            ServerError::from(AuthError::TokenExpired).status_and_message().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::from(AuthError::PasswordHash("bad".to_string()))
                .status_and_message()
                .0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
