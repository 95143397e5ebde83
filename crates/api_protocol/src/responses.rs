//! HTTP response payloads carried in the `data` field of the envelope.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use entities::{
    ActivityEntry, Attachment, Comment, Project, ProjectMember, ProjectRole, Subtask, Task,
    TimeEntry, User,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Pagination;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Auth Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordResponse {
    /// Only returned in development mode, since email delivery is a stub.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

// ============================================================================
// Project Responses
// ============================================================================

/// Public part of a user shown next to projects, members and tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub avatar: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDetail {
    #[serde(flatten)]
    pub member: ProjectMember,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub project: Project,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectListResponse {
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetailResponse {
    pub project: Project,
    pub owner: Option<UserSummary>,
    pub members: Vec<MemberDetail>,
    pub tasks: Vec<Task>,
    /// Role of the caller as resolved by the access check.
    pub user_role: ProjectRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberResponse {
    pub member: MemberDetail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAnalytics {
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub progress: u8,
    pub tasks_by_status: BTreeMap<String, u32>,
    pub tasks_by_priority: BTreeMap<String, u32>,
    pub overdue_tasks: u32,
    pub recent_tasks: Vec<Task>,
}

// ============================================================================
// Task Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task: Task,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetailResponse {
    pub task: Task,
    pub comments: Vec<Comment>,
    pub time_entries: Vec<TimeEntry>,
    pub subtasks: Vec<Subtask>,
    pub activity: Vec<ActivityEntry>,
    pub can_edit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentResponse {
    pub comment: Comment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntryResponse {
    pub time_entry: TimeEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskResponse {
    pub subtask: Subtask,
}

// ============================================================================
// Upload Responses
// ============================================================================

/// Files stored by an upload to a task, with the updated task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUploadResponse {
    pub files: Vec<Attachment>,
    pub task: Task,
}

/// Files stored by an upload to a project, with the updated project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectUploadResponse {
    pub files: Vec<Attachment>,
    pub project: Project,
}

// ============================================================================
// User Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSearchResponse {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub owned_projects: u32,
    pub member_projects: u32,
    pub assigned_tasks: u32,
    pub completed_tasks: u32,
    pub overdue_tasks: u32,
    /// Percentage of assigned tasks that are completed, 0 when none.
    pub completion_rate: u8,
}
