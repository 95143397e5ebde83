//! Identity and credential operations.
//!
//! Password hashing is CPU bound and runs on the blocking thread pool.

use api_protocol::{ChangePasswordRequest, RegisterRequest, UpdateProfileRequest};
use auth::PasswordHasher;
use chrono::Utc;
use entities::{User, UserRole, normalize_email};
use task_store::TaskStore;
use uuid::Uuid;

use crate::{
    error::{ServerError, ServerResult},
    middleware::auth::authenticate_token,
    state::AppState,
};

/// A user together with a freshly issued session token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token: String,
}

async fn hash(hasher: &PasswordHasher, password: &str) -> ServerResult<String> {
    let hasher = hasher.clone();
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hasher.hash_password(&password))
        .await
        .map_err(|e| ServerError::Internal(format!("hashing task failed: {e}")))?
        .map_err(ServerError::from)
}

async fn verify(hasher: &PasswordHasher, password: &str, stored: &str) -> ServerResult<bool> {
    let hasher = hasher.clone();
    let password = password.to_string();
    let stored = stored.to_string();
    tokio::task::spawn_blocking(move || hasher.verify_password(&password, &stored))
        .await
        .map_err(|e| ServerError::Internal(format!("verification task failed: {e}")))?
        .map_err(ServerError::from)
}

async fn load_user<S: TaskStore>(state: &AppState<S>, user_id: Uuid) -> ServerResult<User> {
    state
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| ServerError::NotFound("User not found".to_string()))
}

/// Creates an account and signs it in.
pub async fn register<S: TaskStore>(
    state: &AppState<S>,
    request: RegisterRequest,
) -> ServerResult<Session> {
    let email = normalize_email(&request.email);
    if state.store.get_user_by_email(&email).await?.is_some() {
        return Err(ServerError::Conflict(
            "User with this email already exists".to_string(),
        ));
    }

    let password_hash = hash(&state.hasher, &request.password).await?;
    let user = User::new(
        request.first_name.trim(),
        request.last_name.trim(),
        email,
        password_hash,
    )
    .with_role(request.role.unwrap_or(UserRole::Member));

    let user = state.store.create_user(user).await?;
    let token = state.jwt.generate_token(user.id)?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "User registered");

    Ok(Session { user, token })
}

/// Checks credentials and issues a session token.
///
/// Unknown emails, wrong passwords and inactive accounts all fail the same
/// way.
pub async fn authenticate<S: TaskStore>(
    state: &AppState<S>,
    email: &str,
    password: &str,
) -> ServerResult<Session> {
    let Some(mut user) = state.store.get_user_by_email(email).await? else {
        tracing::debug!("Login rejected: unknown email");
        return Err(ServerError::InvalidCredentials);
    };

    if !user.is_active {
        tracing::debug!(user_id = %user.id, "Login rejected: inactive account");
        return Err(ServerError::InvalidCredentials);
    }

    if !verify(&state.hasher, password, &user.password_hash).await? {
        tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
        return Err(ServerError::InvalidCredentials);
    }

    user.last_login = Some(Utc::now());
    let user = state.store.update_user(user).await?;
    let token = state.jwt.generate_token(user.id)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Session { user, token })
}

/// Resolves a session token to the id of an existing, active user.
pub async fn verify_token<S: TaskStore>(state: &AppState<S>, token: &str) -> ServerResult<Uuid> {
    authenticate_token(state, token).await.map(|user| user.id)
}

/// Replaces the password after checking the current one.
pub async fn change_password<S: TaskStore>(
    state: &AppState<S>,
    user_id: Uuid,
    request: ChangePasswordRequest,
) -> ServerResult<()> {
    let mut user = load_user(state, user_id).await?;

    if !verify(&state.hasher, &request.current_password, &user.password_hash).await? {
        return Err(ServerError::InvalidCredentials);
    }

    user.password_hash = hash(&state.hasher, &request.new_password).await?;
    user.updated_at = Utc::now();
    state.store.update_user(user).await?;

    tracing::info!(user_id = %user_id, "Password changed");
    Ok(())
}

/// Issues a password reset token for the account with this email.
///
/// Delivery by email is not wired up; the caller decides whether to hand the
/// token back.
pub async fn forgot_password<S: TaskStore>(state: &AppState<S>, email: &str) -> ServerResult<String> {
    let user = state
        .store
        .get_user_by_email(email)
        .await?
        .ok_or_else(|| ServerError::NotFound("User not found".to_string()))?;

    let token = state.jwt.generate_reset_token(user.id)?;
    tracing::info!(user_id = %user.id, "Password reset requested");
    Ok(token)
}

/// Sets a new password using a reset token. Each token works once.
pub async fn reset_password<S: TaskStore>(
    state: &AppState<S>,
    token: &str,
    new_password: &str,
) -> ServerResult<()> {
    let claims = state.jwt.validate_reset_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected reset token");
        ServerError::InvalidOrExpiredToken
    })?;
    let user_id = claims
        .user_id()
        .map_err(|_| ServerError::InvalidOrExpiredToken)?;

    let mut user = state
        .store
        .get_user(user_id)
        .await?
        .ok_or(ServerError::InvalidOrExpiredToken)?;

    let password_hash = hash(&state.hasher, new_password).await?;

    if !state.consumed_reset_tokens.write().await.consume(&claims) {
        tracing::debug!(user_id = %user_id, "Rejected reused reset token");
        return Err(ServerError::InvalidOrExpiredToken);
    }

    user.password_hash = password_hash;
    user.updated_at = Utc::now();
    state.store.update_user(user).await?;

    tracing::info!(user_id = %user_id, "Password reset");
    Ok(())
}

/// Updates the caller's own names, avatar and preferences.
pub async fn update_profile<S: TaskStore>(
    state: &AppState<S>,
    user_id: Uuid,
    request: UpdateProfileRequest,
) -> ServerResult<User> {
    let mut user = load_user(state, user_id).await?;

    if let Some(first_name) = request.first_name {
        user.first_name = first_name.trim().to_string();
    }
    if let Some(last_name) = request.last_name {
        user.last_name = last_name.trim().to_string();
    }
    if let Some(avatar) = request.avatar {
        user.avatar = Some(avatar);
    }
    if let Some(preferences) = request.preferences {
        user.preferences.merge(preferences);
    }
    user.updated_at = Utc::now();

    let user = state.store.update_user(user).await?;
    tracing::info!(user_id = %user_id, "Profile updated");
    Ok(user)
}
