//! Authentication API endpoints.

use std::sync::Arc;

use api_protocol::{
    ApiResponse, AuthResponse, ChangePasswordRequest, ForgotPasswordRequest,
    ForgotPasswordResponse, LoginRequest, RegisterRequest, ResetPasswordRequest,
    UpdateProfileRequest, UserResponse,
};
use axum::{Extension, Json, extract::State, http::StatusCode};
use task_store::TaskStore;

use crate::error::{ServerError, ServerResult};
use crate::middleware::AuthenticatedUser;
use crate::services::identity;
use crate::state::AppState;
use crate::validation::ValidJson;

/// Registers a new account.
pub async fn register<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    ValidJson(request): ValidJson<RegisterRequest>,
) -> ServerResult<(StatusCode, Json<ApiResponse<AuthResponse>>)> {
    let session = identity::register(&state, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::ok(AuthResponse {
                user: session.user,
                token: session.token,
            })
            .with_message("User registered successfully"),
        ),
    ))
}

/// Logs in with email and password.
pub async fn login<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    ValidJson(request): ValidJson<LoginRequest>,
) -> ServerResult<Json<ApiResponse<AuthResponse>>> {
    let session = identity::authenticate(&state, &request.email, &request.password).await?;

    Ok(Json(
        ApiResponse::ok(AuthResponse {
            user: session.user,
            token: session.token,
        })
        .with_message("Login successful"),
    ))
}

/// Returns the caller's profile.
pub async fn me<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ServerResult<Json<ApiResponse<UserResponse>>> {
    let user = state
        .store
        .get_user(user.id)
        .await?
        .ok_or_else(|| ServerError::NotFound("User not found".to_string()))?;

    Ok(Json(ApiResponse::ok(UserResponse { user })))
}

/// Updates the caller's names, avatar and preferences.
pub async fn update_profile<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidJson(request): ValidJson<UpdateProfileRequest>,
) -> ServerResult<Json<ApiResponse<UserResponse>>> {
    let user = identity::update_profile(&state, user.id, request).await?;

    Ok(Json(
        ApiResponse::ok(UserResponse { user }).with_message("Profile updated successfully"),
    ))
}

/// Changes the caller's password.
pub async fn change_password<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidJson(request): ValidJson<ChangePasswordRequest>,
) -> ServerResult<Json<ApiResponse<()>>> {
    identity::change_password(&state, user.id, request)
        .await
        .map_err(|e| match e {
            ServerError::InvalidCredentials => {
                ServerError::invalid_field("currentPassword", "Current password is incorrect")
            }
            other => other,
        })?;

    Ok(Json(ApiResponse::message("Password changed successfully")))
}

/// Issues a password reset token.
///
/// The token is only echoed back in development mode.
pub async fn forgot_password<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    ValidJson(request): ValidJson<ForgotPasswordRequest>,
) -> ServerResult<Json<ApiResponse<ForgotPasswordResponse>>> {
    let token = identity::forgot_password(&state, &request.email).await?;
    let reset_token = state.config.is_development().then_some(token);

    Ok(Json(
        ApiResponse::ok(ForgotPasswordResponse { reset_token })
            .with_message("Password reset email sent"),
    ))
}

/// Sets a new password with a reset token.
pub async fn reset_password<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    ValidJson(request): ValidJson<ResetPasswordRequest>,
) -> ServerResult<Json<ApiResponse<()>>> {
    identity::reset_password(&state, &request.token, &request.new_password).await?;

    Ok(Json(ApiResponse::message("Password reset successfully")))
}
