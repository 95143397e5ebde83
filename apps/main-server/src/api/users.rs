//! User management API endpoints.

use std::sync::Arc;

use api_protocol::{
    ApiResponse, ListUsersQuery, Pagination, SearchUsersQuery, UpdateUserRequest,
    UserListResponse, UserResponse, UserSearchResponse, UserStats, UserSummary,
};
use axum::{Extension, Json, extract::State};
use chrono::Utc;
use entities::{User, UserRole, normalize_email, progress_percent};
use task_store::{ProjectFilter, TaskFilter, TaskStore, UserFilter};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::extract::{AppPath, AppQuery};
use crate::middleware::{AuthenticatedUser, require_role};
use crate::state::AppState;
use crate::validation::ValidJson;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;
const MIN_SEARCH_LEN: usize = 2;

fn require_self_or_admin(caller: &AuthenticatedUser, user_id: Uuid) -> ServerResult<()> {
    if caller.id == user_id || caller.is_admin() {
        Ok(())
    } else {
        Err(ServerError::AccessDenied("Access denied".to_string()))
    }
}

async fn load_user<S: TaskStore>(store: &S, user_id: Uuid) -> ServerResult<User> {
    store
        .get_user(user_id)
        .await?
        .ok_or_else(|| ServerError::NotFound("User not found".to_string()))
}

/// Lists all users. Admin only.
pub async fn list_users<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<AuthenticatedUser>,
    AppQuery(query): AppQuery<ListUsersQuery>,
) -> ServerResult<Json<ApiResponse<UserListResponse>>> {
    require_role(Some(&caller), &[UserRole::Admin])?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let (users, total) = state
        .store
        .list_users(UserFilter {
            role: query.role,
            is_active: query.is_active,
            search: query.search.filter(|s| !s.trim().is_empty()),
            exclude_ids: Vec::new(),
            limit: Some(limit),
            offset: Some(Pagination::offset(page, limit)),
        })
        .await?;

    Ok(Json(ApiResponse::ok(UserListResponse {
        users,
        pagination: Pagination::new(total, page, limit),
    })))
}

/// Finds active users to invite, leaving out the caller and, when a project
/// is given, its current owner and members.
pub async fn search_users<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<AuthenticatedUser>,
    AppQuery(query): AppQuery<SearchUsersQuery>,
) -> ServerResult<Json<ApiResponse<UserSearchResponse>>> {
    let q = query.q.unwrap_or_default();
    let q = q.trim();
    if q.chars().count() < MIN_SEARCH_LEN {
        return Err(ServerError::invalid_field(
            "q",
            "Search query must be at least 2 characters",
        ));
    }

    let mut exclude_ids = vec![caller.id];
    if let Some(project_id) = query.project_id {
        if let Some(project) = state.store.get_project(project_id).await? {
            exclude_ids.push(project.owner_id);
        }
        exclude_ids.extend(
            state
                .store
                .list_members(project_id)
                .await?
                .into_iter()
                .map(|m| m.user_id),
        );
    }

    let (users, _) = state
        .store
        .list_users(UserFilter {
            is_active: Some(true),
            search: Some(q.to_string()),
            exclude_ids,
            limit: Some(query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)),
            ..UserFilter::default()
        })
        .await?;

    Ok(Json(ApiResponse::ok(UserSearchResponse {
        users: users.iter().map(UserSummary::from).collect(),
    })))
}

/// Returns a user. Self or admin.
pub async fn get_user<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<AuthenticatedUser>,
    AppPath(user_id): AppPath<Uuid>,
) -> ServerResult<Json<ApiResponse<UserResponse>>> {
    require_self_or_admin(&caller, user_id)?;
    let user = load_user(&state.store, user_id).await?;
    Ok(Json(ApiResponse::ok(UserResponse { user })))
}

/// Updates a user. Only admins may change roles and the active flag.
pub async fn update_user<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<AuthenticatedUser>,
    AppPath(user_id): AppPath<Uuid>,
    ValidJson(request): ValidJson<UpdateUserRequest>,
) -> ServerResult<Json<ApiResponse<UserResponse>>> {
    require_self_or_admin(&caller, user_id)?;
    if !caller.is_admin() && (request.role.is_some() || request.is_active.is_some()) {
        return Err(ServerError::Forbidden(
            "You can only update your own profile information".to_string(),
        ));
    }

    let mut user = load_user(&state.store, user_id).await?;

    if let Some(email) = request.email {
        let email = normalize_email(&email);
        if email != user.email {
            if state.store.get_user_by_email(&email).await?.is_some() {
                return Err(ServerError::Conflict("Email is already taken".to_string()));
            }
            user.email = email;
        }
    }
    if let Some(first_name) = request.first_name {
        user.first_name = first_name.trim().to_string();
    }
    if let Some(last_name) = request.last_name {
        user.last_name = last_name.trim().to_string();
    }
    if let Some(avatar) = request.avatar {
        user.avatar = Some(avatar);
    }
    if let Some(role) = request.role {
        user.role = role;
    }
    if let Some(is_active) = request.is_active {
        user.is_active = is_active;
    }
    if let Some(preferences) = request.preferences {
        user.preferences.merge(preferences);
    }
    user.updated_at = Utc::now();

    let user = state.store.update_user(user).await?;
    tracing::info!(user_id = %user_id, updated_by = %caller.id, "User updated");

    Ok(Json(
        ApiResponse::ok(UserResponse { user }).with_message("User updated successfully"),
    ))
}

/// Deletes a user. Admin only, never the caller.
pub async fn delete_user<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<AuthenticatedUser>,
    AppPath(user_id): AppPath<Uuid>,
) -> ServerResult<Json<ApiResponse<()>>> {
    require_role(Some(&caller), &[UserRole::Admin])?;

    if user_id == caller.id {
        return Err(ServerError::Conflict(
            "You cannot delete your own account".to_string(),
        ));
    }
    load_user(&state.store, user_id).await?;

    state.store.delete_user(user_id).await?;
    tracing::info!(user_id = %user_id, deleted_by = %caller.id, "User deleted");

    Ok(Json(ApiResponse::message("User deleted successfully")))
}

/// Returns project and task counters of a user. Self or admin.
pub async fn user_stats<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<AuthenticatedUser>,
    AppPath(user_id): AppPath<Uuid>,
) -> ServerResult<Json<ApiResponse<UserStats>>> {
    require_self_or_admin(&caller, user_id)?;
    load_user(&state.store, user_id).await?;

    let (visible, _) = state
        .store
        .list_projects(ProjectFilter {
            visible_to: Some(user_id),
            ..ProjectFilter::default()
        })
        .await?;
    let owned_projects = visible.iter().filter(|p| p.owner_id == user_id).count() as u32;
    let member_projects = state.store.list_memberships(user_id).await?.len() as u32;

    let (assigned, _) = state
        .store
        .list_tasks(TaskFilter {
            assigned_to_id: Some(user_id),
            ..TaskFilter::default()
        })
        .await?;

    let now = Utc::now();
    let assigned_tasks = assigned.len() as u32;
    let completed_tasks = assigned.iter().filter(|t| t.status.is_completed()).count() as u32;
    let overdue_tasks = assigned.iter().filter(|t| t.is_overdue(now)).count() as u32;

    Ok(Json(ApiResponse::ok(UserStats {
        owned_projects,
        member_projects,
        assigned_tasks,
        completed_tasks,
        overdue_tasks,
        completion_rate: progress_percent(completed_tasks, assigned_tasks),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_or_admin() {
        let member = AuthenticatedUser::from(&User::new("Ada", "Lovelace", "ada@example.com", "h"));
        let admin = AuthenticatedUser::from(
            &User::new("Grace", "Hopper", "grace@example.com", "h").with_role(UserRole::Admin),
        );

        assert!(require_self_or_admin(&member, member.id).is_ok());
        assert!(require_self_or_admin(&admin, member.id).is_ok());
        assert!(matches!(
            require_self_or_admin(&member, admin.id),
            Err(ServerError::AccessDenied(_))
        ));
    }
}
