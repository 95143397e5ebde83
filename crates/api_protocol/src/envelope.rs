//! Response envelope shared by every HTTP endpoint.

use serde::{Deserialize, Serialize};

/// Successful response: `{success: true, data, message?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Always true.
    pub success: bool,
    /// Payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Optional human readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Creates a response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    /// Attaches a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// Creates a response carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Field-level validation detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the offending request field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failed response: `{success: false, message, errors?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false.
    pub success: bool,
    /// Human readable message.
    pub message: String,
    /// Field-level validation details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    /// Underlying cause. Only present in development mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorResponse {
    /// Creates an error body with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors: None,
            error: None,
        }
    }

    /// Attaches field-level details.
    pub fn with_errors(mut self, errors: Vec<FieldError>) -> Self {
        if !errors.is_empty() {
            self.errors = Some(errors);
        }
        self
    }
}

/// Pagination block of list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u32,
    pub page: u32,
    pub limit: u32,
    pub pages: u32,
}

impl Pagination {
    /// Creates a pagination block; `pages` is `ceil(total / limit)`.
    pub fn new(total: u32, page: u32, limit: u32) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            total,
            page,
            limit,
            pages,
        }
    }

    /// Zero-based offset of the first item on the page.
    pub fn offset(page: u32, limit: u32) -> u32 {
        page.saturating_sub(1).saturating_mul(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let json = serde_json::to_value(ApiResponse::ok(42).with_message("done")).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert_eq!(json["message"], "done");

        let json = serde_json::to_value(ApiResponse::message("bye")).unwrap();
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_error_envelope() {
        let body = ErrorResponse::new("Validation errors")
            .with_errors(vec![FieldError::new("email", "Please provide a valid email")]);
        let json = serde_json::to_value(body).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["errors"][0]["field"], "email");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_pagination() {
        assert_eq!(Pagination::new(0, 1, 10).pages, 0);
        assert_eq!(Pagination::new(10, 1, 10).pages, 1);
        assert_eq!(Pagination::new(11, 1, 10).pages, 2);
        assert_eq!(Pagination::offset(3, 10), 20);
        assert_eq!(Pagination::offset(0, 10), 0);
    }
}
