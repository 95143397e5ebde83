//! In-memory task store implementation.
//!
//! Locks are always taken in the order users, projects, members, tasks,
//! comments, time entries, subtasks, activity.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use entities::{
    ActivityEntry, Attachment, Comment, Project, ProjectMember, Subtask, SubtaskPatch, Task,
    TimeEntry, User, normalize_email, take_attachment,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    ProjectFilter, TaskFilter, TaskStore, TaskStoreError, TaskStoreResult, UserFilter,
};

/// In-memory task store.
///
/// State lives for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    projects: Arc<RwLock<HashMap<Uuid, Project>>>,
    members: Arc<RwLock<HashMap<Uuid, ProjectMember>>>,
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
    comments: Arc<RwLock<HashMap<Uuid, Vec<Comment>>>>,
    time_entries: Arc<RwLock<HashMap<Uuid, Vec<TimeEntry>>>>,
    subtasks: Arc<RwLock<HashMap<Uuid, Vec<Subtask>>>>,
    activity: Arc<RwLock<HashMap<Uuid, Vec<ActivityEntry>>>>,
}

impl MemoryTaskStore {
    /// Creates a new in-memory task store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T>(result: Vec<T>, offset: Option<u32>, limit: Option<u32>) -> (Vec<T>, u32) {
    let total = result.len() as u32;
    let result = result
        .into_iter()
        .skip(offset.unwrap_or(0) as usize)
        .take(limit.map_or(usize::MAX, |l| l as usize))
        .collect();
    (result, total)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn team_size(members: &HashMap<Uuid, ProjectMember>, project_id: Uuid) -> u32 {
    // The owner counts as part of the team.
    1 + members
        .values()
        .filter(|m| m.project_id == project_id)
        .count() as u32
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    // =========================================================================
    // User operations
    // =========================================================================

    async fn create_user(&self, mut user: User) -> TaskStoreResult<User> {
        let mut users = self.users.write().await;
        user.email = normalize_email(&user.email);
        if users.contains_key(&user.id) {
            return Err(TaskStoreError::already_exists("User", user.id));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(TaskStoreError::already_exists("User", &user.email));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> TaskStoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> TaskStoreResult<Option<User>> {
        let email = normalize_email(email);
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, filter: UserFilter) -> TaskStoreResult<(Vec<User>, u32)> {
        let users = self.users.read().await;
        let mut result: Vec<User> = users
            .values()
            .filter(|u| filter.role.is_none_or(|role| u.role == role))
            .filter(|u| filter.is_active.is_none_or(|active| u.is_active == active))
            .filter(|u| !filter.exclude_ids.contains(&u.id))
            .filter(|u| {
                filter.search.as_deref().is_none_or(|q| {
                    contains_ignore_case(&u.first_name, q)
                        || contains_ignore_case(&u.last_name, q)
                        || contains_ignore_case(&u.email, q)
                })
            })
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(result, filter.offset, filter.limit))
    }

    async fn update_user(&self, mut user: User) -> TaskStoreResult<User> {
        let mut users = self.users.write().await;
        user.email = normalize_email(&user.email);
        let Some(existing) = users.get(&user.id) else {
            return Err(TaskStoreError::not_found("User", user.id));
        };
        user.created_at = existing.created_at;
        if users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(TaskStoreError::already_exists("User", &user.email));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete_user(&self, id: Uuid) -> TaskStoreResult<()> {
        let mut users = self.users.write().await;
        let projects = self.projects.read().await;
        let mut members = self.members.write().await;
        let tasks = self.tasks.read().await;

        if !users.contains_key(&id) {
            return Err(TaskStoreError::not_found("User", id));
        }
        if projects.values().any(|p| p.owner_id == id) {
            return Err(TaskStoreError::OwnsProjects(id));
        }
        if tasks.values().any(|t| t.assigned_to_id == Some(id)) {
            return Err(TaskStoreError::HasAssignedTasks(id));
        }

        members.retain(|_, m| m.user_id != id);
        users.remove(&id);
        Ok(())
    }

    // =========================================================================
    // Project operations
    // =========================================================================

    async fn create_project(&self, mut project: Project) -> TaskStoreResult<Project> {
        let users = self.users.read().await;
        let mut projects = self.projects.write().await;
        if !users.contains_key(&project.owner_id) {
            return Err(TaskStoreError::ForeignKeyViolation(format!(
                "project owner {} does not exist",
                project.owner_id
            )));
        }
        if projects.contains_key(&project.id) {
            return Err(TaskStoreError::already_exists("Project", project.id));
        }
        project.progress = 0;
        project.metrics = Default::default();
        project.metrics.team_size = 1;
        projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: Uuid) -> TaskStoreResult<Option<Project>> {
        let projects = self.projects.read().await;
        Ok(projects.get(&id).cloned())
    }

    async fn list_projects(&self, filter: ProjectFilter) -> TaskStoreResult<(Vec<Project>, u32)> {
        let projects = self.projects.read().await;
        let members = self.members.read().await;
        let mut result: Vec<Project> = projects
            .values()
            .filter(|p| {
                filter.visible_to.is_none_or(|user_id| {
                    p.owner_id == user_id
                        || members
                            .values()
                            .any(|m| m.project_id == p.id && m.user_id == user_id)
                })
            })
            .filter(|p| filter.status.is_none_or(|status| p.status == status))
            .filter(|p| filter.priority.is_none_or(|priority| p.priority == priority))
            .filter(|p| {
                filter.search.as_deref().is_none_or(|q| {
                    contains_ignore_case(&p.name, q)
                        || p
                            .description
                            .as_deref()
                            .is_some_and(|d| contains_ignore_case(d, q))
                })
            })
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(result, filter.offset, filter.limit))
    }

    async fn update_project(&self, mut project: Project) -> TaskStoreResult<Project> {
        let mut projects = self.projects.write().await;
        let Some(existing) = projects.get(&project.id) else {
            return Err(TaskStoreError::not_found("Project", project.id));
        };
        project.owner_id = existing.owner_id;
        project.progress = existing.progress;
        project.metrics = existing.metrics.clone();
        project.attachments = existing.attachments.clone();
        project.created_at = existing.created_at;
        project.updated_at = Utc::now();
        projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn delete_project(&self, id: Uuid) -> TaskStoreResult<()> {
        let mut projects = self.projects.write().await;
        let mut members = self.members.write().await;
        let tasks = self.tasks.read().await;

        if !projects.contains_key(&id) {
            return Err(TaskStoreError::not_found("Project", id));
        }
        if tasks.values().any(|t| t.project_id == id) {
            return Err(TaskStoreError::HasDependentTasks(id));
        }

        members.retain(|_, m| m.project_id != id);
        projects.remove(&id);
        Ok(())
    }

    async fn recalculate_project_progress(&self, id: Uuid) -> TaskStoreResult<Project> {
        let mut projects = self.projects.write().await;
        let tasks = self.tasks.read().await;
        let time_entries = self.time_entries.read().await;

        let Some(project) = projects.get_mut(&id) else {
            return Err(TaskStoreError::not_found("Project", id));
        };

        let mut total = 0u32;
        let mut completed = 0u32;
        let mut hours = 0.0;
        for task in tasks.values().filter(|t| t.project_id == id) {
            total += 1;
            if task.status.is_completed() {
                completed += 1;
            }
            hours += time_entries
                .get(&task.id)
                .map_or(0.0, |entries| entries.iter().map(|e| e.duration).sum());
        }

        project.apply_task_counts(completed, total);
        project.metrics.total_hours = hours;
        project.updated_at = Utc::now();

        tracing::debug!(
            project_id = %id,
            progress = project.progress,
            total_tasks = total,
            "Recalculated project progress"
        );

        Ok(project.clone())
    }

    // =========================================================================
    // Membership operations
    // =========================================================================

    async fn add_member(&self, member: ProjectMember) -> TaskStoreResult<ProjectMember> {
        let users = self.users.read().await;
        let mut projects = self.projects.write().await;
        let mut members = self.members.write().await;

        if !users.contains_key(&member.user_id) {
            return Err(TaskStoreError::not_found("User", member.user_id));
        }
        let Some(project) = projects.get_mut(&member.project_id) else {
            return Err(TaskStoreError::not_found("Project", member.project_id));
        };
        if members
            .values()
            .any(|m| m.project_id == member.project_id && m.user_id == member.user_id)
        {
            return Err(TaskStoreError::already_exists(
                "ProjectMember",
                format!("{}/{}", member.project_id, member.user_id),
            ));
        }

        members.insert(member.id, member.clone());
        project.metrics.team_size = team_size(&members, member.project_id);
        Ok(member)
    }

    async fn get_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> TaskStoreResult<Option<ProjectMember>> {
        let members = self.members.read().await;
        Ok(members
            .values()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
            .cloned())
    }

    async fn list_members(&self, project_id: Uuid) -> TaskStoreResult<Vec<ProjectMember>> {
        let members = self.members.read().await;
        let mut result: Vec<ProjectMember> = members
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(result)
    }

    async fn list_memberships(&self, user_id: Uuid) -> TaskStoreResult<Vec<ProjectMember>> {
        let members = self.members.read().await;
        let mut result: Vec<ProjectMember> = members
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(result)
    }

    async fn remove_member(&self, project_id: Uuid, user_id: Uuid) -> TaskStoreResult<()> {
        let mut projects = self.projects.write().await;
        let mut members = self.members.write().await;

        let Some(id) = members
            .values()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
            .map(|m| m.id)
        else {
            return Err(TaskStoreError::not_found(
                "ProjectMember",
                format!("{project_id}/{user_id}"),
            ));
        };

        members.remove(&id);
        if let Some(project) = projects.get_mut(&project_id) {
            project.metrics.team_size = team_size(&members, project_id);
        }
        Ok(())
    }

    // =========================================================================
    // Task operations
    // =========================================================================

    async fn create_task(&self, task: Task) -> TaskStoreResult<Task> {
        let projects = self.projects.read().await;
        let mut tasks = self.tasks.write().await;
        if !projects.contains_key(&task.project_id) {
            return Err(TaskStoreError::ForeignKeyViolation(format!(
                "project {} does not exist",
                task.project_id
            )));
        }
        if tasks.contains_key(&task.id) {
            return Err(TaskStoreError::already_exists("Task", task.id));
        }
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> TaskStoreResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, filter: TaskFilter) -> TaskStoreResult<(Vec<Task>, u32)> {
        let tasks = self.tasks.read().await;
        let mut result: Vec<Task> = tasks
            .values()
            .filter(|t| {
                filter.involving.is_none_or(|user_id| {
                    t.created_by_id == user_id || t.assigned_to_id == Some(user_id)
                })
            })
            .filter(|t| filter.project_id.is_none_or(|id| t.project_id == id))
            .filter(|t| filter.status.is_none_or(|status| t.status == status))
            .filter(|t| filter.priority.is_none_or(|priority| t.priority == priority))
            .filter(|t| {
                filter
                    .assigned_to_id
                    .is_none_or(|id| t.assigned_to_id == Some(id))
            })
            .filter(|t| {
                filter.search.as_deref().is_none_or(|q| {
                    contains_ignore_case(&t.title, q)
                        || t
                            .description
                            .as_deref()
                            .is_some_and(|d| contains_ignore_case(d, q))
                })
            })
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(result, filter.offset, filter.limit))
    }

    async fn update_task(&self, mut task: Task) -> TaskStoreResult<Task> {
        let mut tasks = self.tasks.write().await;
        let Some(existing) = tasks.get(&task.id) else {
            return Err(TaskStoreError::not_found("Task", task.id));
        };
        task.project_id = existing.project_id;
        task.created_by_id = existing.created_by_id;
        task.attachments = existing.attachments.clone();
        task.created_at = existing.created_at;
        task.updated_at = Utc::now();
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn delete_task(&self, id: Uuid) -> TaskStoreResult<()> {
        let mut tasks = self.tasks.write().await;
        let mut comments = self.comments.write().await;
        let mut time_entries = self.time_entries.write().await;
        let mut subtasks = self.subtasks.write().await;
        let mut activity = self.activity.write().await;

        if tasks.remove(&id).is_none() {
            return Err(TaskStoreError::not_found("Task", id));
        }
        comments.remove(&id);
        time_entries.remove(&id);
        subtasks.remove(&id);
        activity.remove(&id);
        Ok(())
    }

    async fn count_tasks(&self, project_id: Uuid) -> TaskStoreResult<u32> {
        let tasks = self.tasks.read().await;
        Ok(tasks.values().filter(|t| t.project_id == project_id).count() as u32)
    }

    // =========================================================================
    // Task sub-collection operations
    // =========================================================================

    async fn add_comment(&self, comment: Comment) -> TaskStoreResult<Comment> {
        let tasks = self.tasks.read().await;
        let mut comments = self.comments.write().await;
        if !tasks.contains_key(&comment.task_id) {
            return Err(TaskStoreError::not_found("Task", comment.task_id));
        }
        comments
            .entry(comment.task_id)
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }

    async fn list_comments(&self, task_id: Uuid) -> TaskStoreResult<Vec<Comment>> {
        let comments = self.comments.read().await;
        Ok(comments.get(&task_id).cloned().unwrap_or_default())
    }

    async fn add_time_entry(&self, entry: TimeEntry) -> TaskStoreResult<TimeEntry> {
        let mut tasks = self.tasks.write().await;
        let mut time_entries = self.time_entries.write().await;
        let Some(task) = tasks.get_mut(&entry.task_id) else {
            return Err(TaskStoreError::not_found("Task", entry.task_id));
        };
        task.actual_hours += entry.duration;
        task.updated_at = Utc::now();
        time_entries
            .entry(entry.task_id)
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    async fn list_time_entries(&self, task_id: Uuid) -> TaskStoreResult<Vec<TimeEntry>> {
        let time_entries = self.time_entries.read().await;
        Ok(time_entries.get(&task_id).cloned().unwrap_or_default())
    }

    async fn add_subtask(&self, subtask: Subtask) -> TaskStoreResult<Subtask> {
        let tasks = self.tasks.read().await;
        let mut subtasks = self.subtasks.write().await;
        if !tasks.contains_key(&subtask.task_id) {
            return Err(TaskStoreError::not_found("Task", subtask.task_id));
        }
        subtasks
            .entry(subtask.task_id)
            .or_default()
            .push(subtask.clone());
        Ok(subtask)
    }

    async fn update_subtask(
        &self,
        task_id: Uuid,
        subtask_id: Uuid,
        patch: SubtaskPatch,
    ) -> TaskStoreResult<Subtask> {
        let mut subtasks = self.subtasks.write().await;
        let Some(subtask) = subtasks
            .get_mut(&task_id)
            .and_then(|list| list.iter_mut().find(|s| s.id == subtask_id))
        else {
            return Err(TaskStoreError::not_found("Subtask", subtask_id));
        };
        subtask.apply(patch);
        Ok(subtask.clone())
    }

    async fn list_subtasks(&self, task_id: Uuid) -> TaskStoreResult<Vec<Subtask>> {
        let subtasks = self.subtasks.read().await;
        Ok(subtasks.get(&task_id).cloned().unwrap_or_default())
    }

    async fn add_activity(&self, entry: ActivityEntry) -> TaskStoreResult<ActivityEntry> {
        let tasks = self.tasks.read().await;
        let mut activity = self.activity.write().await;
        if !tasks.contains_key(&entry.task_id) {
            return Err(TaskStoreError::not_found("Task", entry.task_id));
        }
        activity
            .entry(entry.task_id)
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    async fn list_activity(&self, task_id: Uuid) -> TaskStoreResult<Vec<ActivityEntry>> {
        let activity = self.activity.read().await;
        Ok(activity.get(&task_id).cloned().unwrap_or_default())
    }

    async fn add_task_attachments(
        &self,
        task_id: Uuid,
        attachments: Vec<Attachment>,
    ) -> TaskStoreResult<Task> {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(&task_id) else {
            return Err(TaskStoreError::not_found("Task", task_id));
        };
        task.attachments.extend(attachments);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn remove_task_attachment(
        &self,
        task_id: Uuid,
        filename: &str,
    ) -> TaskStoreResult<Option<Attachment>> {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(&task_id) else {
            return Err(TaskStoreError::not_found("Task", task_id));
        };
        let removed = take_attachment(&mut task.attachments, filename);
        if removed.is_some() {
            task.updated_at = Utc::now();
        }
        Ok(removed)
    }

    async fn add_project_attachments(
        &self,
        project_id: Uuid,
        attachments: Vec<Attachment>,
    ) -> TaskStoreResult<Project> {
        let mut projects = self.projects.write().await;
        let Some(project) = projects.get_mut(&project_id) else {
            return Err(TaskStoreError::not_found("Project", project_id));
        };
        project.attachments.extend(attachments);
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn remove_project_attachment(
        &self,
        project_id: Uuid,
        filename: &str,
    ) -> TaskStoreResult<Option<Attachment>> {
        let mut projects = self.projects.write().await;
        let Some(project) = projects.get_mut(&project_id) else {
            return Err(TaskStoreError::not_found("Project", project_id));
        };
        let removed = take_attachment(&mut project.attachments, filename);
        if removed.is_some() {
            project.updated_at = Utc::now();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use entities::{ActivityAction, ProjectRole, TaskStatus};

    use super::*;

    async fn seed_user(store: &MemoryTaskStore, email: &str) -> User {
        store
            .create_user(User::new("Test", "User", email, "hash"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_user_email_is_unique_ignoring_case() {
        let store = MemoryTaskStore::new();
        seed_user(&store, "ada@example.com").await;

        let result = store
            .create_user(User::new("Ada", "Again", "ADA@example.com", "hash"))
            .await;
        assert!(matches!(result, Err(TaskStoreError::AlreadyExists { .. })));

        let found = store.get_user_by_email("Ada@Example.COM").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_update_user_email_collision() {
        let store = MemoryTaskStore::new();
        seed_user(&store, "ada@example.com").await;
        let mut grace = seed_user(&store, "grace@example.com").await;

        grace.email = "ada@example.com".to_string();
        let result = store.update_user(grace).await;
        assert!(matches!(result, Err(TaskStoreError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_list_users_filters() {
        let store = MemoryTaskStore::new();
        let ada = seed_user(&store, "ada@example.com").await;
        let mut grace = seed_user(&store, "grace@example.com").await;
        grace.is_active = false;
        store.update_user(grace).await.unwrap();

        let (users, total) = store
            .list_users(UserFilter {
                is_active: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(users[0].id, ada.id);

        let (_, total) = store
            .list_users(UserFilter {
                search: Some("GRACE".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_project_crud_and_visibility() {
        let store = MemoryTaskStore::new();
        let owner = seed_user(&store, "owner@example.com").await;
        let member = seed_user(&store, "member@example.com").await;
        let outsider = seed_user(&store, "outsider@example.com").await;

        let project = store
            .create_project(Project::new("Launch", owner.id))
            .await
            .unwrap();
        assert_eq!(project.metrics.team_size, 1);

        store
            .add_member(ProjectMember::new(project.id, member.id, ProjectRole::Member))
            .await
            .unwrap();

        for user_id in [owner.id, member.id] {
            let (projects, total) = store
                .list_projects(ProjectFilter {
                    visible_to: Some(user_id),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(total, 1);
            assert_eq!(projects[0].id, project.id);
        }

        let (_, total) = store
            .list_projects(ProjectFilter {
                visible_to: Some(outsider.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 0);

        let fetched = store.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(fetched.metrics.team_size, 2);
    }

    #[tokio::test]
    async fn test_project_requires_owner() {
        let store = MemoryTaskStore::new();
        let result = store
            .create_project(Project::new("Orphan", Uuid::new_v4()))
            .await;
        assert!(matches!(
            result,
            Err(TaskStoreError::ForeignKeyViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_membership_unique() {
        let store = MemoryTaskStore::new();
        let owner = seed_user(&store, "owner@example.com").await;
        let member = seed_user(&store, "member@example.com").await;
        let project = store
            .create_project(Project::new("Launch", owner.id))
            .await
            .unwrap();

        store
            .add_member(ProjectMember::new(project.id, member.id, ProjectRole::Member))
            .await
            .unwrap();
        let result = store
            .add_member(ProjectMember::new(project.id, member.id, ProjectRole::Viewer))
            .await;
        assert!(matches!(result, Err(TaskStoreError::AlreadyExists { .. })));

        store.remove_member(project.id, member.id).await.unwrap();
        assert!(
            store
                .get_member(project.id, member.id)
                .await
                .unwrap()
                .is_none()
        );
        let project = store.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(project.metrics.team_size, 1);
    }

    #[tokio::test]
    async fn test_project_delete_guard() {
        let store = MemoryTaskStore::new();
        let owner = seed_user(&store, "owner@example.com").await;
        let project = store
            .create_project(Project::new("Launch", owner.id))
            .await
            .unwrap();
        let task = store
            .create_task(Task::new(project.id, owner.id, "Write brief"))
            .await
            .unwrap();

        let result = store.delete_project(project.id).await;
        assert!(matches!(result, Err(TaskStoreError::HasDependentTasks(_))));

        store.delete_task(task.id).await.unwrap();
        store.delete_project(project.id).await.unwrap();
        assert!(store.get_project(project.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_delete_guards() {
        let store = MemoryTaskStore::new();
        let owner = seed_user(&store, "owner@example.com").await;
        let assignee = seed_user(&store, "assignee@example.com").await;
        let project = store
            .create_project(Project::new("Launch", owner.id))
            .await
            .unwrap();
        let task = store
            .create_task(Task::new(project.id, owner.id, "Write brief").with_assignee(assignee.id))
            .await
            .unwrap();

        assert!(matches!(
            store.delete_user(owner.id).await,
            Err(TaskStoreError::OwnsProjects(_))
        ));
        assert!(matches!(
            store.delete_user(assignee.id).await,
            Err(TaskStoreError::HasAssignedTasks(_))
        ));

        store.delete_task(task.id).await.unwrap();
        store.delete_user(assignee.id).await.unwrap();
        assert!(store.get_user(assignee.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recalculate_progress() {
        let store = MemoryTaskStore::new();
        let owner = seed_user(&store, "owner@example.com").await;
        let project = store
            .create_project(Project::new("Launch", owner.id))
            .await
            .unwrap();

        let project_after = store.recalculate_project_progress(project.id).await.unwrap();
        assert_eq!(project_after.progress, 0);

        let mut ids = Vec::new();
        for i in 0..3 {
            let task = store
                .create_task(Task::new(project.id, owner.id, format!("Task {i}")))
                .await
                .unwrap();
            ids.push(task.id);
        }

        let mut task = store.get_task(ids[0]).await.unwrap().unwrap();
        task.status = TaskStatus::Completed;
        store.update_task(task).await.unwrap();

        let project_after = store.recalculate_project_progress(project.id).await.unwrap();
        assert_eq!(project_after.progress, 33);
        assert_eq!(project_after.metrics.total_tasks, 3);
        assert_eq!(project_after.metrics.completed_tasks, 1);

        for id in &ids[1..] {
            let mut task = store.get_task(*id).await.unwrap().unwrap();
            task.status = TaskStatus::Completed;
            store.update_task(task).await.unwrap();
        }
        let project_after = store.recalculate_project_progress(project.id).await.unwrap();
        assert_eq!(project_after.progress, 100);

        // Progress is derived, updates cannot overwrite it.
        let mut edited = project_after.clone();
        edited.progress = 5;
        let edited = store.update_project(edited).await.unwrap();
        assert_eq!(edited.progress, 100);
    }

    #[tokio::test]
    async fn test_list_tasks_pagination() {
        let store = MemoryTaskStore::new();
        let owner = seed_user(&store, "owner@example.com").await;
        let other = seed_user(&store, "other@example.com").await;
        let project = store
            .create_project(Project::new("Launch", owner.id))
            .await
            .unwrap();

        for i in 0..5 {
            store
                .create_task(Task::new(project.id, owner.id, format!("Owner task {i}")))
                .await
                .unwrap();
        }
        store
            .create_task(Task::new(project.id, other.id, "Other task"))
            .await
            .unwrap();

        let (tasks, total) = store
            .list_tasks(TaskFilter {
                involving: Some(owner.id),
                limit: Some(2),
                offset: Some(4),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(tasks.len(), 1);

        let (_, total) = store
            .list_tasks(TaskFilter {
                project_id: Some(project.id),
                search: Some("other".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(store.count_tasks(project.id).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_sub_collections() {
        let store = MemoryTaskStore::new();
        let owner = seed_user(&store, "owner@example.com").await;
        let project = store
            .create_project(Project::new("Launch", owner.id))
            .await
            .unwrap();
        let task = store
            .create_task(Task::new(project.id, owner.id, "Write brief"))
            .await
            .unwrap();

        store
            .add_comment(Comment::new(task.id, owner.id, "first"))
            .await
            .unwrap();
        store
            .add_comment(Comment::new(task.id, owner.id, "second"))
            .await
            .unwrap();
        let comments = store.list_comments(task.id).await.unwrap();
        assert_eq!(
            comments.iter().map(|c| c.content.as_str()).collect::<Vec<_>>(),
            vec!["first", "second"]
        );

        let start = Utc::now();
        let entry = TimeEntry::new(task.id, owner.id, start, start + Duration::hours(2), "")
            .unwrap();
        store.add_time_entry(entry).await.unwrap();
        let task_after = store.get_task(task.id).await.unwrap().unwrap();
        assert!((task_after.actual_hours - 2.0).abs() < 1e-9);
        let project_after = store.recalculate_project_progress(project.id).await.unwrap();
        assert!((project_after.metrics.total_hours - 2.0).abs() < 1e-9);

        let subtask = store
            .add_subtask(Subtask::new(task.id, "Outline", ""))
            .await
            .unwrap();
        let updated = store
            .update_subtask(
                task.id,
                subtask.id,
                SubtaskPatch {
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.completed);
        assert!(matches!(
            store
                .update_subtask(task.id, Uuid::new_v4(), SubtaskPatch::default())
                .await,
            Err(TaskStoreError::NotFound { .. })
        ));

        store
            .add_activity(ActivityEntry::new(
                task.id,
                owner.id,
                ActivityAction::Created,
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(store.list_activity(task.id).await.unwrap().len(), 1);

        store.delete_task(task.id).await.unwrap();
        assert!(store.list_comments(task.id).await.unwrap().is_empty());
        assert!(store.list_subtasks(task.id).await.unwrap().is_empty());
        assert!(store.list_activity(task.id).await.unwrap().is_empty());
        assert!(store.list_time_entries(task.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comment_on_missing_task() {
        let store = MemoryTaskStore::new();
        let result = store
            .add_comment(Comment::new(Uuid::new_v4(), Uuid::new_v4(), "hi"))
            .await;
        assert!(matches!(result, Err(TaskStoreError::NotFound { .. })));
    }

    fn attachment(filename: &str, uploaded_by: Uuid) -> Attachment {
        Attachment {
            filename: filename.to_string(),
            original_name: "notes.txt".to_string(),
            path: format!("uploads/{filename}"),
            size: 5,
            mime_type: "text/plain".to_string(),
            uploaded_by,
            uploaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_task_attachments_survive_updates() {
        let store = MemoryTaskStore::new();
        let owner = seed_user(&store, "ada@example.com").await;
        let project = store
            .create_project(Project::new("Launch", owner.id))
            .await
            .unwrap();
        let task = store
            .create_task(Task::new(project.id, owner.id, "Write brief"))
            .await
            .unwrap();

        let updated = store
            .add_task_attachments(task.id, vec![attachment("files-1.txt", owner.id)])
            .await
            .unwrap();
        assert_eq!(updated.attachments.len(), 1);

        // A stale copy written back keeps the stored attachments.
        let mut stale = task.clone();
        stale.title = "Write the brief".to_string();
        let saved = store.update_task(stale).await.unwrap();
        assert_eq!(saved.attachments.len(), 1);

        let removed = store
            .remove_task_attachment(task.id, "files-1.txt")
            .await
            .unwrap();
        assert_eq!(removed.unwrap().filename, "files-1.txt");
        assert!(
            store
                .remove_task_attachment(task.id, "files-1.txt")
                .await
                .unwrap()
                .is_none()
        );
        assert!(matches!(
            store.remove_task_attachment(Uuid::new_v4(), "x").await,
            Err(TaskStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_project_attachments() {
        let store = MemoryTaskStore::new();
        let owner = seed_user(&store, "ada@example.com").await;
        let project = store
            .create_project(Project::new("Launch", owner.id))
            .await
            .unwrap();

        store
            .add_project_attachments(
                project.id,
                vec![
                    attachment("files-1.txt", owner.id),
                    attachment("files-2.txt", owner.id),
                ],
            )
            .await
            .unwrap();
        store
            .remove_project_attachment(project.id, "files-1.txt")
            .await
            .unwrap();

        let project = store.get_project(project.id).await.unwrap().unwrap();
        let names: Vec<_> = project.attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["files-2.txt"]);
    }
}
