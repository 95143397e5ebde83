//! Project management API endpoints.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use api_protocol::{
    AddMemberRequest, ApiResponse, CreateProjectRequest, ListProjectsQuery, MemberDetail,
    MemberResponse, ProjectAnalytics, ProjectDetailResponse, ProjectListResponse, ProjectResponse,
    UpdateProjectRequest, UserSummary,
};
use axum::{Extension, Json, extract::State, http::StatusCode};
use chrono::Utc;
use entities::{Project, ProjectMember, ProjectRole, Task, progress_percent};
use task_store::{ProjectFilter, TaskFilter, TaskStore};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::extract::{AppPath, AppQuery};
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;
use crate::validation::ValidJson;

const RECENT_TASKS: usize = 5;

fn check_dates(project: &Project) -> ServerResult<()> {
    if project.has_valid_dates() {
        Ok(())
    } else {
        Err(ServerError::invalid_field(
            "endDate",
            "End date must be after start date",
        ))
    }
}

async fn member_detail<S: TaskStore>(store: &S, member: ProjectMember) -> ServerResult<MemberDetail> {
    let user = store.get_user(member.user_id).await?;
    Ok(MemberDetail {
        member,
        user: user.as_ref().map(UserSummary::from),
    })
}

async fn project_tasks<S: TaskStore>(store: &S, project_id: Uuid) -> ServerResult<Vec<Task>> {
    let (tasks, _) = store
        .list_tasks(TaskFilter {
            project_id: Some(project_id),
            ..TaskFilter::default()
        })
        .await?;
    Ok(tasks)
}

/// Lists the projects the caller owns or is a member of.
pub async fn list_projects<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppQuery(query): AppQuery<ListProjectsQuery>,
) -> ServerResult<Json<ApiResponse<ProjectListResponse>>> {
    let (projects, _) = state
        .store
        .list_projects(ProjectFilter {
            visible_to: Some(user.id),
            status: query.status,
            priority: query.priority,
            search: query.search.filter(|s| !s.trim().is_empty()),
            ..ProjectFilter::default()
        })
        .await?;

    Ok(Json(ApiResponse::ok(ProjectListResponse { projects })))
}

/// Creates a project owned by the caller, with an optional initial team.
pub async fn create_project<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidJson(request): ValidJson<CreateProjectRequest>,
) -> ServerResult<(StatusCode, Json<ApiResponse<ProjectResponse>>)> {
    let mut project = Project::new(request.name.trim(), user.id);
    project.description = request.description.map(|d| d.trim().to_string());
    project.status = request.status.unwrap_or_default();
    project.priority = request.priority.unwrap_or_default();
    project.start_date = request.start_date;
    project.end_date = request.end_date;
    project.budget = request.budget.unwrap_or(0.0);
    project.settings = request.settings.unwrap_or_default();
    check_dates(&project)?;

    let mut seen = HashSet::new();
    for member in &request.team {
        if member.user_id == user.id {
            return Err(ServerError::Conflict(
                "User is already the project owner".to_string(),
            ));
        }
        if !seen.insert(member.user_id) {
            return Err(ServerError::Conflict(
                "User is already a member of this project".to_string(),
            ));
        }
        if state.store.get_user(member.user_id).await?.is_none() {
            return Err(ServerError::NotFound("User not found".to_string()));
        }
    }

    let project = state.store.create_project(project).await?;
    for member in request.team {
        state
            .store
            .add_member(ProjectMember::new(
                project.id,
                member.user_id,
                member.role.unwrap_or_default(),
            ))
            .await?;
    }

    let project = state
        .store
        .get_project(project.id)
        .await?
        .ok_or_else(|| ServerError::NotFound("Project not found".to_string()))?;

    tracing::info!(
        project_id = %project.id,
        owner_id = %user.id,
        team_size = project.metrics.team_size,
        "Project created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(ProjectResponse { project }).with_message("Project created successfully")),
    ))
}

/// Returns a project with its owner, members, tasks and the caller's role.
pub async fn get_project<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(project_id): AppPath<Uuid>,
) -> ServerResult<Json<ApiResponse<ProjectDetailResponse>>> {
    let access = state.access().check_project_access(project_id, user.id).await?;

    let owner = state
        .store
        .get_user(access.project.owner_id)
        .await?
        .as_ref()
        .map(UserSummary::from);

    let mut members = Vec::new();
    for member in state.store.list_members(project_id).await? {
        members.push(member_detail(&state.store, member).await?);
    }

    let tasks = project_tasks(&state.store, project_id).await?;

    Ok(Json(ApiResponse::ok(ProjectDetailResponse {
        project: access.project,
        owner,
        members,
        tasks,
        user_role: access.role,
    })))
}

/// Updates a project. Requires owner or manager rights.
pub async fn update_project<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(project_id): AppPath<Uuid>,
    ValidJson(request): ValidJson<UpdateProjectRequest>,
) -> ServerResult<Json<ApiResponse<ProjectResponse>>> {
    let mut project = state
        .access()
        .check_project_edit_access(project_id, user.id)
        .await?
        .project;

    if let Some(name) = request.name {
        project.name = name.trim().to_string();
    }
    if let Some(description) = request.description {
        project.description = Some(description.trim().to_string());
    }
    if let Some(status) = request.status {
        project.status = status;
    }
    if let Some(priority) = request.priority {
        project.priority = priority;
    }
    if request.start_date.is_some() {
        project.start_date = request.start_date;
    }
    if request.end_date.is_some() {
        project.end_date = request.end_date;
    }
    if let Some(budget) = request.budget {
        project.budget = budget;
    }
    if let Some(settings) = request.settings {
        project.settings = settings;
    }
    check_dates(&project)?;
    project.updated_at = Utc::now();

    let project = state.store.update_project(project).await?;
    tracing::info!(project_id = %project_id, user_id = %user.id, "Project updated");

    Ok(Json(
        ApiResponse::ok(ProjectResponse { project }).with_message("Project updated successfully"),
    ))
}

/// Deletes a project that has no tasks left.
pub async fn delete_project<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(project_id): AppPath<Uuid>,
) -> ServerResult<Json<ApiResponse<()>>> {
    state
        .access()
        .check_project_edit_access(project_id, user.id)
        .await?;

    state.store.delete_project(project_id).await?;
    tracing::info!(project_id = %project_id, user_id = %user.id, "Project deleted");

    Ok(Json(ApiResponse::message("Project deleted successfully")))
}

/// Adds a user to the project team.
pub async fn add_member<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(project_id): AppPath<Uuid>,
    ValidJson(request): ValidJson<AddMemberRequest>,
) -> ServerResult<Json<ApiResponse<MemberResponse>>> {
    let access = state
        .access()
        .check_project_edit_access(project_id, user.id)
        .await?;

    if state.store.get_user(request.user_id).await?.is_none() {
        return Err(ServerError::NotFound("User not found".to_string()));
    }
    if request.user_id == access.project.owner_id {
        return Err(ServerError::Conflict(
            "User is already the project owner".to_string(),
        ));
    }

    let role = request.role.unwrap_or(ProjectRole::Member);
    let member = state
        .store
        .add_member(ProjectMember::new(project_id, request.user_id, role))
        .await?;

    tracing::info!(
        project_id = %project_id,
        member_id = %request.user_id,
        role = role.as_str(),
        "Team member added"
    );

    let member = member_detail(&state.store, member).await?;
    Ok(Json(
        ApiResponse::ok(MemberResponse { member }).with_message("Team member added successfully"),
    ))
}

/// Removes a user from the project team. The owner cannot be removed.
pub async fn remove_member<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath((project_id, member_id)): AppPath<(Uuid, Uuid)>,
) -> ServerResult<Json<ApiResponse<()>>> {
    let project = state
        .store
        .get_project(project_id)
        .await?
        .ok_or_else(|| ServerError::NotFound("Project not found".to_string()))?;

    // The owner is never removable, whatever the caller's own rights.
    if member_id == project.owner_id {
        if !user.is_admin() {
            state.access().check_project_access(project_id, user.id).await?;
        }
        return Err(ServerError::Conflict("Cannot remove project owner".to_string()));
    }

    state
        .access()
        .check_project_edit_access(project_id, user.id)
        .await?;
    if state.store.get_member(project_id, member_id).await?.is_none() {
        return Err(ServerError::NotFound(
            "User is not a member of this project".to_string(),
        ));
    }

    state.store.remove_member(project_id, member_id).await?;
    state
        .relay
        .evict_user_from_project(member_id, project_id)
        .await;
    tracing::info!(project_id = %project_id, member_id = %member_id, "Team member removed");

    Ok(Json(ApiResponse::message("Team member removed successfully")))
}

/// Summarizes the project's tasks.
pub async fn project_analytics<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(project_id): AppPath<Uuid>,
) -> ServerResult<Json<ApiResponse<ProjectAnalytics>>> {
    state.access().check_project_access(project_id, user.id).await?;

    let tasks = project_tasks(&state.store, project_id).await?;
    Ok(Json(ApiResponse::ok(analytics(tasks))))
}

fn analytics(mut tasks: Vec<Task>) -> ProjectAnalytics {
    let now = Utc::now();
    let mut tasks_by_status = BTreeMap::new();
    let mut tasks_by_priority = BTreeMap::new();
    let mut completed_tasks = 0;
    let mut overdue_tasks = 0;

    for task in &tasks {
        *tasks_by_status
            .entry(task.status.as_str().to_string())
            .or_insert(0) += 1;
        *tasks_by_priority
            .entry(task.priority.as_str().to_string())
            .or_insert(0) += 1;
        if task.status.is_completed() {
            completed_tasks += 1;
        }
        if task.is_overdue(now) {
            overdue_tasks += 1;
        }
    }

    let total_tasks = tasks.len() as u32;
    tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    tasks.truncate(RECENT_TASKS);

    ProjectAnalytics {
        total_tasks,
        completed_tasks,
        progress: progress_percent(completed_tasks, total_tasks),
        tasks_by_status,
        tasks_by_priority,
        overdue_tasks,
        recent_tasks: tasks,
    }
}
