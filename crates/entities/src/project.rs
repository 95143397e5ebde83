//! Project and membership entity definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Attachment, Priority};

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    Active,
    OnHold,
    Completed,
    Cancelled,
}

/// Feature switches of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    pub allow_comments: bool,
    pub allow_file_uploads: bool,
    pub allow_time_tracking: bool,
    pub notifications: bool,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            allow_comments: true,
            allow_file_uploads: true,
            allow_time_tracking: true,
            notifications: true,
        }
    }
}

/// Aggregates derived from the project's tasks and team.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetrics {
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub total_hours: f64,
    pub team_size: u32,
}

/// A project owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique identifier.
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Percentage of completed tasks, 0..=100. Derived, never set directly.
    pub progress: u8,
    pub budget: f64,
    /// Owning user.
    pub owner_id: Uuid,
    pub settings: ProjectSettings,
    pub metrics: ProjectMetrics,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
    /// When this record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Creates a new project owned by `owner_id`.
    pub fn new(name: impl Into<String>, owner_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            status: ProjectStatus::Planning,
            priority: Priority::Medium,
            start_date: None,
            end_date: None,
            progress: 0,
            budget: 0.0,
            owner_id,
            settings: ProjectSettings::default(),
            metrics: ProjectMetrics::default(),
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description for this project.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the priority for this project.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Recomputes `progress` and the task counters.
    pub fn apply_task_counts(&mut self, completed: u32, total: u32) {
        self.progress = progress_percent(completed, total);
        self.metrics.completed_tasks = completed;
        self.metrics.total_tasks = total;
    }

    /// Returns true if the project's date range is valid.
    pub fn has_valid_dates(&self) -> bool {
        is_valid_range(self.start_date, self.end_date)
    }
}

/// `round(100 * completed / total)`, or 0 when there are no tasks.
pub fn progress_percent(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    ((f64::from(completed) * 100.0 / f64::from(total)).round()) as u8
}

/// End must be strictly after start when both are present.
pub fn is_valid_range(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
    match (start, end) {
        (Some(start), Some(end)) => end > start,
        _ => true,
    }
}

/// Role of a user inside one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    Owner,
    Manager,
    #[default]
    Member,
    Viewer,
}

impl ProjectRole {
    /// Returns the wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Manager => "manager",
            Self::Member => "member",
            Self::Viewer => "viewer",
        }
    }

    /// Owners and managers may edit the project.
    pub fn can_edit(&self) -> bool {
        matches!(self, Self::Owner | Self::Manager)
    }
}

/// Membership of a user in a project. Unique per `(project_id, user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMember {
    /// Unique identifier.
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: ProjectRole,
    pub joined_at: DateTime<Utc>,
}

impl ProjectMember {
    /// Creates a new membership.
    pub fn new(project_id: Uuid, user_id: Uuid, role: ProjectRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            user_id,
            role,
            joined_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(0, 4), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(1, 8), 13);
        assert_eq!(progress_percent(5, 5), 100);
    }

    #[test]
    fn test_apply_task_counts() {
        let mut project = Project::new("Launch", Uuid::new_v4());
        project.apply_task_counts(1, 2);

        assert_eq!(project.progress, 50);
        assert_eq!(project.metrics.total_tasks, 2);
        assert_eq!(project.metrics.completed_tasks, 1);
    }

    #[test]
    fn test_date_range() {
        let now = Utc::now();
        assert!(is_valid_range(None, Some(now)));
        assert!(is_valid_range(Some(now), Some(now + Duration::days(1))));
        assert!(!is_valid_range(Some(now), Some(now)));
        assert!(!is_valid_range(Some(now), Some(now - Duration::days(1))));

        let mut project = Project::new("Launch", Uuid::new_v4());
        project.start_date = Some(now);
        assert!(project.has_valid_dates());
        project.end_date = Some(now - Duration::hours(1));
        assert!(!project.has_valid_dates());
    }

    #[test]
    fn test_project_serialization() {
        let project = Project::new("Launch", Uuid::new_v4()).with_priority(Priority::High);
        let json = serde_json::to_value(&project).unwrap();

        assert_eq!(json["priority"], "high");
        assert_eq!(json["status"], "planning");
        assert_eq!(json["settings"]["allowComments"], true);
    }

    #[test]
    fn test_project_role_edit() {
        assert!(ProjectRole::Owner.can_edit());
        assert!(ProjectRole::Manager.can_edit());
        assert!(!ProjectRole::Member.can_edit());
        assert!(!ProjectRole::Viewer.can_edit());
    }
}
