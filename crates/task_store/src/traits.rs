//! Task store trait definitions.

use async_trait::async_trait;
use entities::{
    ActivityEntry, Attachment, Comment, Priority, Project, ProjectMember, ProjectStatus,
    Subtask, SubtaskPatch, Task, TaskStatus, TimeEntry, User, UserRole,
};
use uuid::Uuid;

use crate::TaskStoreResult;

/// Filter options for listing users.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Filter by global role.
    pub role: Option<UserRole>,
    /// Filter by active flag.
    pub is_active: Option<bool>,
    /// Case-insensitive match against first name, last name or email.
    pub search: Option<String>,
    /// Users to leave out of the result.
    pub exclude_ids: Vec<Uuid>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
}

/// Filter options for listing projects.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    /// Only projects the user owns or is a member of.
    pub visible_to: Option<Uuid>,
    /// Filter by status.
    pub status: Option<ProjectStatus>,
    /// Filter by priority.
    pub priority: Option<Priority>,
    /// Case-insensitive match against name or description.
    pub search: Option<String>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
}

/// Filter options for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Only tasks created by or assigned to the user.
    pub involving: Option<Uuid>,
    /// Filter by project ID.
    pub project_id: Option<Uuid>,
    /// Filter by status.
    pub status: Option<TaskStatus>,
    /// Filter by priority.
    pub priority: Option<Priority>,
    /// Filter by assignee.
    pub assigned_to_id: Option<Uuid>,
    /// Case-insensitive match against title or description.
    pub search: Option<String>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
}

/// Storage for users, projects, memberships and tasks.
///
/// List operations return the page of results together with the total number
/// of matches before pagination. Listings are ordered newest first.
#[async_trait]
pub trait TaskStore: Send + Sync {
    // =========================================================================
    // User operations
    // =========================================================================

    /// Creates a new user. Fails if the email is already taken.
    async fn create_user(&self, user: User) -> TaskStoreResult<User>;

    /// Gets a user by ID.
    async fn get_user(&self, id: Uuid) -> TaskStoreResult<Option<User>>;

    /// Gets a user by email, ignoring case.
    async fn get_user_by_email(&self, email: &str) -> TaskStoreResult<Option<User>>;

    /// Lists users with optional filtering.
    async fn list_users(&self, filter: UserFilter) -> TaskStoreResult<(Vec<User>, u32)>;

    /// Updates a user. Fails if the new email belongs to another user.
    async fn update_user(&self, user: User) -> TaskStoreResult<User>;

    /// Deletes a user and their memberships.
    ///
    /// Fails while the user owns projects or has tasks assigned.
    async fn delete_user(&self, id: Uuid) -> TaskStoreResult<()>;

    // =========================================================================
    // Project operations
    // =========================================================================

    /// Creates a new project. The owner must exist.
    async fn create_project(&self, project: Project) -> TaskStoreResult<Project>;

    /// Gets a project by ID.
    async fn get_project(&self, id: Uuid) -> TaskStoreResult<Option<Project>>;

    /// Lists projects with optional filtering.
    async fn list_projects(&self, filter: ProjectFilter) -> TaskStoreResult<(Vec<Project>, u32)>;

    /// Updates a project. Derived fields (progress, task metrics) and
    /// attachments are kept.
    async fn update_project(&self, project: Project) -> TaskStoreResult<Project>;

    /// Deletes a project and its memberships. Fails while tasks reference it.
    async fn delete_project(&self, id: Uuid) -> TaskStoreResult<()>;

    /// Recomputes progress, task counters and logged hours from the
    /// project's current tasks.
    async fn recalculate_project_progress(&self, id: Uuid) -> TaskStoreResult<Project>;

    // =========================================================================
    // Membership operations
    // =========================================================================

    /// Adds a member to a project. Fails if the pair already exists.
    async fn add_member(&self, member: ProjectMember) -> TaskStoreResult<ProjectMember>;

    /// Gets the membership of a user in a project.
    async fn get_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> TaskStoreResult<Option<ProjectMember>>;

    /// Lists the members of a project, oldest first.
    async fn list_members(&self, project_id: Uuid) -> TaskStoreResult<Vec<ProjectMember>>;

    /// Lists the memberships of a user.
    async fn list_memberships(&self, user_id: Uuid) -> TaskStoreResult<Vec<ProjectMember>>;

    /// Removes a member from a project.
    async fn remove_member(&self, project_id: Uuid, user_id: Uuid) -> TaskStoreResult<()>;

    // =========================================================================
    // Task operations
    // =========================================================================

    /// Creates a new task. The project must exist.
    async fn create_task(&self, task: Task) -> TaskStoreResult<Task>;

    /// Gets a task by ID.
    async fn get_task(&self, id: Uuid) -> TaskStoreResult<Option<Task>>;

    /// Lists tasks with optional filtering.
    async fn list_tasks(&self, filter: TaskFilter) -> TaskStoreResult<(Vec<Task>, u32)>;

    /// Updates a task. The creator, project and attachments never change.
    async fn update_task(&self, task: Task) -> TaskStoreResult<Task>;

    /// Deletes a task together with its comments, time entries, subtasks and
    /// activity log.
    async fn delete_task(&self, id: Uuid) -> TaskStoreResult<()>;

    /// Counts the tasks of a project.
    async fn count_tasks(&self, project_id: Uuid) -> TaskStoreResult<u32>;

    // =========================================================================
    // Task sub-collection operations
    // =========================================================================

    /// Appends a comment to a task.
    async fn add_comment(&self, comment: Comment) -> TaskStoreResult<Comment>;

    /// Lists the comments of a task in insertion order.
    async fn list_comments(&self, task_id: Uuid) -> TaskStoreResult<Vec<Comment>>;

    /// Appends a time entry to a task and adds its duration to the task's
    /// actual hours.
    async fn add_time_entry(&self, entry: TimeEntry) -> TaskStoreResult<TimeEntry>;

    /// Lists the time entries of a task in insertion order.
    async fn list_time_entries(&self, task_id: Uuid) -> TaskStoreResult<Vec<TimeEntry>>;

    /// Appends a subtask to a task.
    async fn add_subtask(&self, subtask: Subtask) -> TaskStoreResult<Subtask>;

    /// Patches a subtask of a task.
    async fn update_subtask(
        &self,
        task_id: Uuid,
        subtask_id: Uuid,
        patch: SubtaskPatch,
    ) -> TaskStoreResult<Subtask>;

    /// Lists the subtasks of a task in insertion order.
    async fn list_subtasks(&self, task_id: Uuid) -> TaskStoreResult<Vec<Subtask>>;

    /// Appends an entry to a task's activity log.
    async fn add_activity(&self, entry: ActivityEntry) -> TaskStoreResult<ActivityEntry>;

    /// Lists the activity log of a task in insertion order.
    async fn list_activity(&self, task_id: Uuid) -> TaskStoreResult<Vec<ActivityEntry>>;

    // =========================================================================
    // Attachment operations
    // =========================================================================

    /// Appends attachments to a task and returns the updated task.
    async fn add_task_attachments(
        &self,
        task_id: Uuid,
        attachments: Vec<Attachment>,
    ) -> TaskStoreResult<Task>;

    /// Removes a task attachment by filename. `None` if the task has no such
    /// attachment.
    async fn remove_task_attachment(
        &self,
        task_id: Uuid,
        filename: &str,
    ) -> TaskStoreResult<Option<Attachment>>;

    /// Appends attachments to a project and returns the updated project.
    async fn add_project_attachments(
        &self,
        project_id: Uuid,
        attachments: Vec<Attachment>,
    ) -> TaskStoreResult<Project>;

    /// Removes a project attachment by filename. `None` if the project has no
    /// such attachment.
    async fn remove_project_attachment(
        &self,
        project_id: Uuid,
        filename: &str,
    ) -> TaskStoreResult<Option<Attachment>>;
}
