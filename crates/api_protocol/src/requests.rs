//! HTTP request bodies and query strings.
//!
//! Bodies derive [`Validate`]; free-text fields are trimmed while they are
//! deserialized, so length rules apply to the trimmed value.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use entities::{
    PreferencesPatch, Priority, ProjectRole, ProjectSettings, ProjectStatus, SubtaskPatch,
    TaskStatus, UserRole,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

mod trimmed {
    use serde::{Deserialize, Deserializer};

    pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        String::deserialize(deserializer).map(|s| s.trim().to_string())
    }

    pub fn option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Option::<String>::deserialize(deserializer).map(|s| s.map(|s| s.trim().to_string()))
    }
}

// ============================================================================
// Auth Requests
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(deserialize_with = "trimmed::string")]
    #[validate(length(min = 2, max = 50, message = "First name must be between 2 and 50 characters"))]
    pub first_name: String,
    #[serde(deserialize_with = "trimmed::string")]
    #[validate(length(min = 2, max = 50, message = "Last name must be between 2 and 50 characters"))]
    pub last_name: String,
    #[serde(deserialize_with = "trimmed::string")]
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(deserialize_with = "trimmed::string")]
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(length(min = 2, max = 50, message = "First name must be between 2 and 50 characters"))]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(length(min = 2, max = 50, message = "Last name must be between 2 and 50 characters"))]
    pub last_name: Option<String>,
    pub avatar: Option<String>,
    pub preferences: Option<PreferencesPatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "New password must be at least 6 characters long"))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[serde(deserialize_with = "trimmed::string")]
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub token: String,
    #[validate(length(min = 6, message = "New password must be at least 6 characters long"))]
    pub new_password: String,
}

// ============================================================================
// Project Requests
// ============================================================================

/// Membership to create, either inline on project creation or through the
/// team endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub role: Option<ProjectRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    #[serde(deserialize_with = "trimmed::string")]
    #[validate(length(min = 3, max = 100, message = "Project name must be between 3 and 100 characters"))]
    pub name: String,
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0.0, message = "Budget must be a non-negative number"))]
    pub budget: Option<f64>,
    pub settings: Option<ProjectSettings>,
    #[serde(default)]
    pub team: Vec<AddMemberRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(length(min = 3, max = 100, message = "Project name must be between 3 and 100 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0.0, message = "Budget must be a non-negative number"))]
    pub budget: Option<f64>,
    pub settings: Option<ProjectSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListProjectsQuery {
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub search: Option<String>,
}

// ============================================================================
// Task Requests
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[serde(deserialize_with = "trimmed::string")]
    #[validate(length(min = 3, max = 200, message = "Task title must be between 3 and 200 characters"))]
    pub title: String,
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,
    pub project_id: Uuid,
    pub assigned_to_id: Option<Uuid>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0.0, message = "Estimated hours must be a non-negative number"))]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(length(min = 3, max = 200, message = "Task title must be between 3 and 200 characters"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assigned_to_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0.0, message = "Estimated hours must be a non-negative number"))]
    pub estimated_hours: Option<f64>,
    #[validate(range(min = 0.0, message = "Actual hours must be a non-negative number"))]
    pub actual_hours: Option<f64>,
    pub labels: Option<BTreeSet<String>>,
    pub position: Option<i32>,
    pub dependencies: Option<BTreeSet<Uuid>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Uuid>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[serde(deserialize_with = "trimmed::string")]
    #[validate(length(min = 1, max = 1000, message = "Comment must be between 1 and 1000 characters"))]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimeEntryRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "trimmed::string")]
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSubtaskRequest {
    #[serde(deserialize_with = "trimmed::string")]
    #[validate(length(min = 1, max = 200, message = "Subtask title must be between 1 and 200 characters"))]
    pub title: String,
    #[serde(default, deserialize_with = "trimmed::string")]
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: String,
}

/// Partial update of a subtask.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateSubtaskRequest {
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(length(min = 1, max = 200, message = "Subtask title must be between 1 and 200 characters"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
    pub completed: Option<bool>,
}

impl From<UpdateSubtaskRequest> for SubtaskPatch {
    fn from(request: UpdateSubtaskRequest) -> Self {
        Self {
            title: request.title,
            description: request.description,
            completed: request.completed,
        }
    }
}

// ============================================================================
// User Requests
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchUsersQuery {
    pub q: Option<String>,
    pub project_id: Option<Uuid>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(length(min = 2, max = 50, message = "First name must be between 2 and 50 characters"))]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(length(min = 2, max = 50, message = "Last name must be between 2 and 50 characters"))]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "trimmed::option")]
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub preferences: Option<PreferencesPatch>,
}

// ============================================================================
// Relay Handshake
// ============================================================================

/// Query string of the relay upgrade request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConnectQuery {
    pub token: Option<String>,
}
