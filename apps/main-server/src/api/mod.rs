//! API endpoints.

pub mod auth;
pub mod projects;
pub mod tasks;
pub mod uploads;
pub mod users;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
};
use api_protocol::HealthResponse;
use chrono::Utc;
use task_store::TaskStore;

use crate::error::route_not_found;
use crate::middleware::auth_middleware;
use crate::state::AppState;
use crate::websocket::relay_handler;

/// Slack on top of the file bytes for multipart boundaries and headers.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Creates the API router with all endpoints.
pub fn create_router<S: TaskStore + 'static>(state: Arc<AppState<S>>) -> Router {
    let upload_limit = DefaultBodyLimit::max(
        state
            .config
            .max_file_size
            .saturating_mul(uploads::MAX_FILES)
            .saturating_add(MULTIPART_OVERHEAD),
    );

    let protected = Router::new()
        // Auth endpoints
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/profile", put(auth::update_profile))
        .route("/api/auth/password", put(auth::change_password))
        // Project endpoints
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/api/projects/{id}/team", post(projects::add_member))
        .route(
            "/api/projects/{id}/team/{user_id}",
            delete(projects::remove_member),
        )
        .route("/api/projects/{id}/analytics", get(projects::project_analytics))
        // Task endpoints
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/api/tasks/{id}/comments", post(tasks::add_comment))
        .route("/api/tasks/{id}/time-entries", post(tasks::add_time_entry))
        .route("/api/tasks/{id}/subtasks", post(tasks::add_subtask))
        .route(
            "/api/tasks/{id}/subtasks/{subtask_id}",
            put(tasks::update_subtask),
        )
        // User endpoints
        .route("/api/users", get(users::list_users))
        .route("/api/users/search", get(users::search_users))
        .route(
            "/api/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/users/{id}/stats", get(users::user_stats))
        // Upload endpoints
        .route(
            "/api/uploads/task/{id}",
            post(uploads::upload_task_files).layer(upload_limit.clone()),
        )
        .route(
            "/api/uploads/project/{id}",
            post(uploads::upload_project_files).layer(upload_limit),
        )
        .route(
            "/api/uploads/task/{id}/{filename}",
            delete(uploads::delete_task_file),
        )
        .route(
            "/api/uploads/project/{id}/{filename}",
            delete(uploads::delete_project_file),
        )
        .route("/api/uploads/{filename}", get(uploads::download_file))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::<S>,
        ));

    Router::new()
        // Public endpoints
        .route("/api/health", get(health_check))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/forgot-password", post(auth::forgot_password))
        .route("/api/auth/reset-password", post(auth::reset_password))
        // Relay transport
        .route("/ws", get(relay_handler))
        .merge(protected)
        .fallback(route_not_found)
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        timestamp: Utc::now(),
    })
}
