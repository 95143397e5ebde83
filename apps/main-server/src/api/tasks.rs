//! Task management API endpoints.

use std::collections::BTreeSet;
use std::sync::Arc;

use api_protocol::{
    ApiResponse, CommentResponse, CreateCommentRequest, CreateSubtaskRequest, CreateTaskRequest,
    CreateTimeEntryRequest, ListTasksQuery, Pagination, SubtaskResponse, TaskDetailResponse,
    TaskListResponse, TaskResponse, TimeEntryResponse, UpdateSubtaskRequest, UpdateTaskRequest,
};
use axum::{Extension, Json, extract::State, http::StatusCode};
use entities::{
    ActivityAction, ActivityEntry, Comment, Project, Subtask, Task, TimeEntry,
};
use serde_json::json;
use task_store::{TaskFilter, TaskStore};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::extract::{AppPath, AppQuery};
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;
use crate::validation::ValidJson;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// The assignee must exist and be the project owner or a member.
async fn check_assignee<S: TaskStore>(
    store: &S,
    project: &Project,
    assignee_id: Uuid,
) -> ServerResult<()> {
    if store.get_user(assignee_id).await?.is_none() {
        return Err(ServerError::NotFound("Assigned user not found".to_string()));
    }
    if assignee_id != project.owner_id && store.get_member(project.id, assignee_id).await?.is_none()
    {
        return Err(ServerError::invalid_field(
            "assignedToId",
            "Assigned user is not a member of this project",
        ));
    }
    Ok(())
}

/// Dependencies must be other tasks of the same project.
async fn check_dependencies<S: TaskStore>(
    store: &S,
    task: &Task,
    dependencies: &BTreeSet<Uuid>,
) -> ServerResult<()> {
    for dependency_id in dependencies {
        if *dependency_id == task.id {
            return Err(ServerError::invalid_field(
                "dependencies",
                "A task cannot depend on itself",
            ));
        }
        let same_project = store
            .get_task(*dependency_id)
            .await?
            .is_some_and(|dependency| dependency.project_id == task.project_id);
        if !same_project {
            return Err(ServerError::invalid_field(
                "dependencies",
                "Dependencies must be tasks of the same project",
            ));
        }
    }
    Ok(())
}

async fn record<S: TaskStore>(
    store: &S,
    task_id: Uuid,
    user_id: Uuid,
    action: ActivityAction,
    details: serde_json::Value,
) -> ServerResult<()> {
    store
        .add_activity(ActivityEntry::new(task_id, user_id, action, details))
        .await?;
    Ok(())
}

async fn refresh_progress<S: TaskStore>(store: &S, project_id: Uuid) -> ServerResult<()> {
    let project = store.recalculate_project_progress(project_id).await?;
    tracing::debug!(
        project_id = %project_id,
        progress = project.progress,
        "Project progress recalculated"
    );
    Ok(())
}

/// Lists tasks created by or assigned to the caller.
pub async fn list_tasks<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppQuery(query): AppQuery<ListTasksQuery>,
) -> ServerResult<Json<ApiResponse<TaskListResponse>>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let (tasks, total) = state
        .store
        .list_tasks(TaskFilter {
            involving: Some(user.id),
            project_id: query.project_id,
            status: query.status,
            priority: query.priority,
            assigned_to_id: query.assigned_to,
            search: query.search.filter(|s| !s.trim().is_empty()),
            limit: Some(limit),
            offset: Some(Pagination::offset(page, limit)),
        })
        .await?;

    Ok(Json(ApiResponse::ok(TaskListResponse {
        tasks,
        pagination: Pagination::new(total, page, limit),
    })))
}

/// Creates a task in a project the caller has access to.
pub async fn create_task<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidJson(request): ValidJson<CreateTaskRequest>,
) -> ServerResult<(StatusCode, Json<ApiResponse<TaskResponse>>)> {
    let access = state
        .access()
        .check_project_access(request.project_id, user.id)
        .await?;

    if let Some(assignee_id) = request.assigned_to_id {
        check_assignee(&state.store, &access.project, assignee_id).await?;
    }

    let mut task = Task::new(request.project_id, user.id, request.title.trim());
    task.description = request.description.map(|d| d.trim().to_string());
    task.assigned_to_id = request.assigned_to_id;
    task.priority = request.priority.unwrap_or_default();
    task.due_date = request.due_date;
    task.estimated_hours = request.estimated_hours.unwrap_or(0.0);
    task.labels = request.labels;

    let task = state.store.create_task(task).await?;
    record(
        &state.store,
        task.id,
        user.id,
        ActivityAction::Created,
        json!({ "title": task.title }),
    )
    .await?;
    refresh_progress(&state.store, task.project_id).await?;

    tracing::info!(
        task_id = %task.id,
        project_id = %task.project_id,
        user_id = %user.id,
        "Task created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(TaskResponse { task }).with_message("Task created successfully")),
    ))
}

/// Returns a task with its comments, time entries, subtasks and activity.
pub async fn get_task<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(task_id): AppPath<Uuid>,
) -> ServerResult<Json<ApiResponse<TaskDetailResponse>>> {
    let access = state.access().check_task_access(task_id, user.id).await?;

    let comments = state.store.list_comments(task_id).await?;
    let time_entries = state.store.list_time_entries(task_id).await?;
    let subtasks = state.store.list_subtasks(task_id).await?;
    let activity = state.store.list_activity(task_id).await?;

    Ok(Json(ApiResponse::ok(TaskDetailResponse {
        task: access.task,
        comments,
        time_entries,
        subtasks,
        activity,
        can_edit: access.can_edit,
    })))
}

/// Updates a task.
pub async fn update_task<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(task_id): AppPath<Uuid>,
    ValidJson(request): ValidJson<UpdateTaskRequest>,
) -> ServerResult<Json<ApiResponse<TaskResponse>>> {
    let access = state.access().check_task_access(task_id, user.id).await?;
    let mut task = access.task;
    let was_completed = task.status.is_completed();

    if let Some(assignee_id) = request.assigned_to_id {
        if task.assigned_to_id != Some(assignee_id) {
            check_assignee(&state.store, &access.project, assignee_id).await?;
        }
    }
    if let Some(dependencies) = &request.dependencies {
        check_dependencies(&state.store, &task, dependencies).await?;
    }

    let mut changed = Vec::new();
    if let Some(title) = request.title {
        task.title = title.trim().to_string();
        changed.push("title");
    }
    if let Some(description) = request.description {
        task.description = Some(description.trim().to_string());
        changed.push("description");
    }
    if let Some(status) = request.status {
        task.status = status;
        changed.push("status");
    }
    if let Some(priority) = request.priority {
        task.priority = priority;
        changed.push("priority");
    }
    if let Some(assignee_id) = request.assigned_to_id {
        task.assigned_to_id = Some(assignee_id);
        changed.push("assignedToId");
    }
    if let Some(due_date) = request.due_date {
        task.due_date = Some(due_date);
        changed.push("dueDate");
    }
    if let Some(hours) = request.estimated_hours {
        task.estimated_hours = hours;
        changed.push("estimatedHours");
    }
    if let Some(hours) = request.actual_hours {
        task.actual_hours = hours;
        changed.push("actualHours");
    }
    if let Some(labels) = request.labels {
        task.labels = labels;
        changed.push("labels");
    }
    if let Some(position) = request.position {
        task.position = position;
        changed.push("position");
    }
    if let Some(dependencies) = request.dependencies {
        task.dependencies = dependencies;
        changed.push("dependencies");
    }

    let task = state.store.update_task(task).await?;
    record(
        &state.store,
        task.id,
        user.id,
        ActivityAction::Updated,
        json!({ "fields": changed }),
    )
    .await?;

    if was_completed != task.status.is_completed() {
        refresh_progress(&state.store, task.project_id).await?;
    }

    tracing::info!(task_id = %task_id, user_id = %user.id, fields = ?changed, "Task updated");

    Ok(Json(
        ApiResponse::ok(TaskResponse { task }).with_message("Task updated successfully"),
    ))
}

/// Deletes a task and everything attached to it.
pub async fn delete_task<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(task_id): AppPath<Uuid>,
) -> ServerResult<Json<ApiResponse<()>>> {
    let access = state.access().check_task_access(task_id, user.id).await?;

    state.store.delete_task(task_id).await?;
    refresh_progress(&state.store, access.project.id).await?;

    tracing::info!(task_id = %task_id, user_id = %user.id, "Task deleted");

    Ok(Json(ApiResponse::message("Task deleted successfully")))
}

/// Appends a comment to a task.
pub async fn add_comment<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(task_id): AppPath<Uuid>,
    ValidJson(request): ValidJson<CreateCommentRequest>,
) -> ServerResult<(StatusCode, Json<ApiResponse<CommentResponse>>)> {
    let access = state.access().check_task_access(task_id, user.id).await?;
    if !access.project.settings.allow_comments {
        return Err(ServerError::Forbidden(
            "Comments are disabled for this project".to_string(),
        ));
    }

    let comment = state
        .store
        .add_comment(Comment::new(task_id, user.id, request.content.trim()))
        .await?;
    record(
        &state.store,
        task_id,
        user.id,
        ActivityAction::CommentAdded,
        json!({ "commentId": comment.id }),
    )
    .await?;

    tracing::info!(task_id = %task_id, comment_id = %comment.id, "Comment added");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(CommentResponse { comment }).with_message("Comment added successfully")),
    ))
}

/// Logs time against a task.
pub async fn add_time_entry<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(task_id): AppPath<Uuid>,
    ValidJson(request): ValidJson<CreateTimeEntryRequest>,
) -> ServerResult<(StatusCode, Json<ApiResponse<TimeEntryResponse>>)> {
    let entry = TimeEntry::new(
        task_id,
        user.id,
        request.start_time,
        request.end_time,
        request.description.trim(),
    )
    .ok_or_else(|| ServerError::invalid_field("endTime", "End time must be after start time"))?;

    let access = state.access().check_task_access(task_id, user.id).await?;
    if !access.project.settings.allow_time_tracking {
        return Err(ServerError::Forbidden(
            "Time tracking is disabled for this project".to_string(),
        ));
    }

    let time_entry = state.store.add_time_entry(entry).await?;
    record(
        &state.store,
        task_id,
        user.id,
        ActivityAction::TimeLogged,
        json!({ "timeEntryId": time_entry.id, "duration": time_entry.duration }),
    )
    .await?;
    refresh_progress(&state.store, access.project.id).await?;

    tracing::info!(
        task_id = %task_id,
        duration_hours = time_entry.duration,
        "Time entry added"
    );

    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::ok(TimeEntryResponse { time_entry })
                .with_message("Time entry added successfully"),
        ),
    ))
}

/// Adds a subtask to a task.
pub async fn add_subtask<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(task_id): AppPath<Uuid>,
    ValidJson(request): ValidJson<CreateSubtaskRequest>,
) -> ServerResult<(StatusCode, Json<ApiResponse<SubtaskResponse>>)> {
    state.access().check_task_access(task_id, user.id).await?;

    let subtask = state
        .store
        .add_subtask(Subtask::new(
            task_id,
            request.title.trim(),
            request.description.trim(),
        ))
        .await?;
    record(
        &state.store,
        task_id,
        user.id,
        ActivityAction::SubtaskAdded,
        json!({ "subtaskId": subtask.id, "title": subtask.title }),
    )
    .await?;

    tracing::info!(task_id = %task_id, subtask_id = %subtask.id, "Subtask added");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(SubtaskResponse { subtask }).with_message("Subtask added successfully")),
    ))
}

/// Patches a subtask.
pub async fn update_subtask<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath((task_id, subtask_id)): AppPath<(Uuid, Uuid)>,
    ValidJson(request): ValidJson<UpdateSubtaskRequest>,
) -> ServerResult<Json<ApiResponse<SubtaskResponse>>> {
    state.access().check_task_access(task_id, user.id).await?;

    let completed = request.completed;
    let subtask = state
        .store
        .update_subtask(task_id, subtask_id, request.into())
        .await?;
    record(
        &state.store,
        task_id,
        user.id,
        ActivityAction::SubtaskUpdated,
        json!({ "subtaskId": subtask_id, "completed": completed }),
    )
    .await?;

    tracing::info!(task_id = %task_id, subtask_id = %subtask_id, "Subtask updated");

    Ok(Json(
        ApiResponse::ok(SubtaskResponse { subtask }).with_message("Subtask updated successfully"),
    ))
}

#[cfg(test)]
mod tests {
    use entities::User;
    use task_store::MemoryTaskStore;

    use super::*;

    #[tokio::test]
    async fn test_dependencies_stay_in_project() {
        let store = MemoryTaskStore::new();
        let owner = store
            .create_user(User::new("Ada", "Lovelace", "ada@example.com", "hash"))
            .await
            .unwrap();
        let launch = store
            .create_project(Project::new("Launch", owner.id))
            .await
            .unwrap();
        let other = store
            .create_project(Project::new("Other", owner.id))
            .await
            .unwrap();
        let task = store
            .create_task(Task::new(launch.id, owner.id, "Write brief"))
            .await
            .unwrap();
        let sibling = store
            .create_task(Task::new(launch.id, owner.id, "Review brief"))
            .await
            .unwrap();
        let foreign = store
            .create_task(Task::new(other.id, owner.id, "Elsewhere"))
            .await
            .unwrap();

        assert!(
            check_dependencies(&store, &task, &BTreeSet::from([sibling.id]))
                .await
                .is_ok()
        );
        assert!(
            check_dependencies(&store, &task, &BTreeSet::from([task.id]))
                .await
                .is_err()
        );
        assert!(
            check_dependencies(&store, &task, &BTreeSet::from([foreign.id]))
                .await
                .is_err()
        );
        assert!(
            check_dependencies(&store, &task, &BTreeSet::from([Uuid::new_v4()]))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_assignee_must_belong_to_project() {
        let store = MemoryTaskStore::new();
        let owner = store
            .create_user(User::new("Ada", "Lovelace", "ada@example.com", "hash"))
            .await
            .unwrap();
        let outsider = store
            .create_user(User::new("Eve", "Outside", "eve@example.com", "hash"))
            .await
            .unwrap();
        let project = store
            .create_project(Project::new("Launch", owner.id))
            .await
            .unwrap();

        assert!(check_assignee(&store, &project, owner.id).await.is_ok());
        assert!(matches!(
            check_assignee(&store, &project, outsider.id).await,
            Err(ServerError::Validation { .. })
        ));
        assert!(matches!(
            check_assignee(&store, &project, Uuid::new_v4()).await,
            Err(ServerError::NotFound(_))
        ));
    }
}
