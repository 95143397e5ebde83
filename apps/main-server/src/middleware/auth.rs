//! Authentication middleware.

use std::sync::Arc;

use api_protocol::Actor;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use entities::{User, UserRole};
use task_store::TaskStore;
use uuid::Uuid;

use crate::{
    error::{ServerError, ServerResult},
    state::AppState,
};

/// Authenticated user information.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// User ID.
    pub id: Uuid,
    /// User email.
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    /// Global role.
    pub role: UserRole,
}

impl From<&User> for AuthenticatedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            avatar: user.avatar.clone(),
            role: user.role,
        }
    }
}

impl AuthenticatedUser {
    /// Returns the identity block stamped on relayed events.
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            name: format!("{} {}", self.first_name, self.last_name),
            avatar: self.avatar.clone(),
        }
    }

    /// Returns true for administrators.
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Extracts the bearer token from the Authorization header.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves a session token to its user.
///
/// The token must be a valid session token whose user still exists and is
/// active.
pub async fn authenticate_token<S: TaskStore>(
    state: &AppState<S>,
    token: &str,
) -> ServerResult<User> {
    let claims = state.jwt.validate_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected session token");
        ServerError::InvalidToken
    })?;
    let user_id = claims.user_id().map_err(|_| ServerError::InvalidToken)?;

    match state.store.get_user(user_id).await? {
        Some(user) if user.is_active => Ok(user),
        _ => Err(ServerError::InvalidToken),
    }
}

/// Authentication middleware.
///
/// Validates the bearer token and stores the [`AuthenticatedUser`] in the
/// request extensions.
pub async fn auth_middleware<S: TaskStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    mut request: Request,
    next: Next,
) -> ServerResult<Response> {
    let token = extract_bearer(request.headers())
        .map(str::to_owned)
        .ok_or(ServerError::AuthenticationRequired)?;

    let user = authenticate_token(&state, &token).await?;
    request
        .extensions_mut()
        .insert(AuthenticatedUser::from(&user));

    Ok(next.run(request).await)
}

/// Requires the caller to hold one of the given global roles.
pub fn require_role(user: Option<&AuthenticatedUser>, roles: &[UserRole]) -> ServerResult<()> {
    let user = user.ok_or(ServerError::AuthenticationRequired)?;
    if roles.contains(&user.role) {
        Ok(())
    } else {
        Err(ServerError::Forbidden(
            "Access denied. Insufficient permissions.".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use task_store::MemoryTaskStore;

    use super::*;
    use crate::{config::Config, state::create_state};

    fn test_state() -> Arc<AppState<MemoryTaskStore>> {
        let config = Config {
            password_memory_kib: Some(1024),
            ..Config::default()
        };
        create_state(config, MemoryTaskStore::new()).unwrap()
    }

    fn user() -> AuthenticatedUser {
        AuthenticatedUser::from(&User::new("Ada", "Lovelace", "ada@example.com", "hash"))
    }

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers), Some("abc.def"));
    }

    #[test]
    fn test_actor_name() {
        let actor = user().actor();
        assert_eq!(actor.name, "Ada Lovelace");
    }

    #[test]
    fn test_require_role() {
        assert!(matches!(
            require_role(None, &[UserRole::Admin]),
            Err(ServerError::AuthenticationRequired)
        ));

        let member = user();
        assert!(matches!(
            require_role(Some(&member), &[UserRole::Admin]),
            Err(ServerError::Forbidden(_))
        ));
        assert!(require_role(Some(&member), &[UserRole::Admin, UserRole::Member]).is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_token() {
        let state = test_state();
        let user = state
            .store
            .create_user(User::new("Ada", "Lovelace", "ada@example.com", "hash"))
            .await
            .unwrap();

        let token = state.jwt.generate_token(user.id).unwrap();
        let resolved = authenticate_token(&state, &token).await.unwrap();
        assert_eq!(resolved.id, user.id);

        let reset = state.jwt.generate_reset_token(user.id).unwrap();
        assert!(matches!(
            authenticate_token(&state, &reset).await,
            Err(ServerError::InvalidToken)
        ));

        let unknown = state.jwt.generate_token(Uuid::new_v4()).unwrap();
        assert!(matches!(
            authenticate_token(&state, &unknown).await,
            Err(ServerError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_inactive_user_is_rejected() {
        let state = test_state();
        let mut user = state
            .store
            .create_user(User::new("Ada", "Lovelace", "ada@example.com", "hash"))
            .await
            .unwrap();
        let token = state.jwt.generate_token(user.id).unwrap();

        user.is_active = false;
        state.store.update_user(user).await.unwrap();

        assert!(matches!(
            authenticate_token(&state, &token).await,
            Err(ServerError::InvalidToken)
        ));
    }
}
