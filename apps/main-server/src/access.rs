//! Project and task access control.
//!
//! Access to a project is granted to its owner and its members. Editing a
//! project requires the owner or manager role. A task is reachable by its
//! creator, its assignee, and the project's owner or managers, all of whom
//! must also have access to the project.

use entities::{Project, ProjectRole, Task};
use task_store::TaskStore;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};

/// Resolved access of a user to a project.
#[derive(Debug, Clone)]
pub struct ProjectAccess {
    pub project: Project,
    pub role: ProjectRole,
}

/// Resolved access of a user to a task.
#[derive(Debug, Clone)]
pub struct TaskAccess {
    pub task: Task,
    pub project: Project,
    pub role: ProjectRole,
    pub can_edit: bool,
}

/// Access checks backed by a task store.
pub struct AccessControl<'a, S: TaskStore> {
    store: &'a S,
    surface_member_roles: bool,
}

impl<'a, S: TaskStore> AccessControl<'a, S> {
    /// Creates an access checker.
    ///
    /// When `surface_member_roles` is false every non-owner member resolves
    /// to [`ProjectRole::Member`], whatever role their membership stores.
    pub fn new(store: &'a S, surface_member_roles: bool) -> Self {
        Self {
            store,
            surface_member_roles,
        }
    }

    /// Resolves the role of `user_id` in a project.
    pub async fn check_project_access(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> ServerResult<ProjectAccess> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| ServerError::NotFound("Project not found".to_string()))?;

        if project.owner_id == user_id {
            return Ok(ProjectAccess {
                project,
                role: ProjectRole::Owner,
            });
        }

        match self.store.get_member(project_id, user_id).await? {
            Some(member) => {
                let role = if self.surface_member_roles {
                    member.role
                } else {
                    ProjectRole::Member
                };
                Ok(ProjectAccess { project, role })
            }
            None => Err(ServerError::AccessDenied(
                "Access denied. You are not a member of this project".to_string(),
            )),
        }
    }

    /// Like [`Self::check_project_access`], but also requires an editing role.
    pub async fn check_project_edit_access(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> ServerResult<ProjectAccess> {
        let access = self.check_project_access(project_id, user_id).await?;
        if !access.role.can_edit() {
            return Err(ServerError::AccessDenied(
                "Access denied. Insufficient permissions".to_string(),
            ));
        }
        Ok(access)
    }

    /// Resolves the access of `user_id` to a task through its project.
    pub async fn check_task_access(&self, task_id: Uuid, user_id: Uuid) -> ServerResult<TaskAccess> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| ServerError::NotFound("Task not found".to_string()))?;

        let ProjectAccess { project, role } =
            self.check_project_access(task.project_id, user_id).await?;

        let can_edit = task.created_by_id == user_id
            || task.assigned_to_id == Some(user_id)
            || role.can_edit();
        if !can_edit {
            return Err(ServerError::AccessDenied(
                "Access denied. You are not authorized to access this task".to_string(),
            ));
        }

        Ok(TaskAccess {
            task,
            project,
            role,
            can_edit,
        })
    }
}
