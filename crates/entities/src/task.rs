//! Task-related entity definitions.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Attachment, Priority};

/// Status of a task, one column per status on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Review => "review",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// A unit of work inside exactly one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier.
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Owning project.
    pub project_id: Uuid,
    /// Assignee; must be the project owner or a member.
    pub assigned_to_id: Option<Uuid>,
    /// Creator, immutable after creation.
    pub created_by_id: Uuid,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: f64,
    pub actual_hours: f64,
    pub labels: BTreeSet<String>,
    /// Ordering inside the status column.
    pub position: i32,
    /// Tasks this one depends on.
    pub dependencies: BTreeSet<Uuid>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
    /// When this record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new task in the `todo` column.
    pub fn new(project_id: Uuid, created_by_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            project_id,
            assigned_to_id: None,
            created_by_id,
            due_date: None,
            estimated_hours: 0.0,
            actual_hours: 0.0,
            labels: BTreeSet::new(),
            position: 0,
            dependencies: BTreeSet::new(),
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the assignee for this task.
    pub fn with_assignee(mut self, user_id: Uuid) -> Self {
        self.assigned_to_id = Some(user_id);
        self
    }

    /// Sets the status for this task.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns true if the task is past its due date and not completed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_completed() && self.due_date.is_some_and(|due| due < now)
    }
}

/// A comment on a task. Comments are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(task_id: Uuid, user_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            user_id,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A logged span of work on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// `end_time - start_time` in hours.
    pub duration: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl TimeEntry {
    /// Creates a time entry, or `None` if `end_time` is not after `start_time`.
    pub fn new(
        task_id: Uuid,
        user_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Option<Self> {
        if end_time <= start_time {
            return None;
        }
        let duration = (end_time - start_time).num_milliseconds() as f64 / 3_600_000.0;
        Some(Self {
            id: Uuid::new_v4(),
            task_id,
            user_id,
            start_time,
            end_time,
            duration,
            description: description.into(),
            created_at: Utc::now(),
        })
    }
}

/// A checklist item inside a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Subtask {
    pub fn new(task_id: Uuid, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            title: title.into(),
            description: description.into(),
            completed: false,
            created_at: Utc::now(),
        }
    }

    /// Applies the fields present in `patch`.
    pub fn apply(&mut self, patch: SubtaskPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
    }
}

/// Partial update of a subtask.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

/// Kind of change recorded in a task's activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Created,
    Updated,
    CommentAdded,
    TimeLogged,
    SubtaskAdded,
    SubtaskUpdated,
}

/// Append-only audit log entry of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub action: ActivityAction,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        task_id: Uuid,
        user_id: Uuid,
        action: ActivityAction,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            user_id,
            action,
            details,
            timestamp: Utc::now(),
        }
    }
}
