//! Application state.

use std::collections::HashMap;
use std::sync::Arc;

use auth::{
    AuthError, Claims, DEFAULT_PASSWORD_ITERATIONS, JwtConfig, JwtManager, PasswordHasher,
};
use chrono::Utc;
use task_store::TaskStore;
use tokio::sync::RwLock;

use crate::access::AccessControl;
use crate::config::Config;
use crate::services::relay::RelayHub;
use crate::services::storage::{FileStorage, LocalDiskStorage};

/// Password reset tokens that have already been redeemed.
///
/// Entries are keyed by token id and dropped once the token would have
/// expired anyway.
#[derive(Debug, Default)]
pub struct ConsumedTokens {
    /// Map of token id to expiration timestamp.
    tokens: HashMap<String, i64>,
}

impl ConsumedTokens {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token as used. Returns false if it was used before.
    pub fn consume(&mut self, claims: &Claims) -> bool {
        let now = Utc::now().timestamp();
        self.tokens.retain(|_, exp| *exp >= now);
        if self.tokens.contains_key(&claims.jti) {
            return false;
        }
        self.tokens.insert(claims.jti.clone(), claims.exp);
        true
    }
}

/// Shared application state.
pub struct AppState<S: TaskStore> {
    /// Server configuration.
    pub config: Config,
    /// Task store.
    pub store: S,
    /// JWT manager.
    pub jwt: JwtManager,
    /// Password hasher.
    pub hasher: PasswordHasher,
    /// Real-time relay hub.
    pub relay: RelayHub,
    /// Storage of uploaded files.
    pub storage: Arc<dyn FileStorage>,
    /// Redeemed password reset tokens.
    pub consumed_reset_tokens: RwLock<ConsumedTokens>,
}

impl<S: TaskStore> AppState<S> {
    /// Creates new application state around an existing relay hub. Uploads
    /// go to the local directory named by `config.upload_path`.
    pub fn new(
        config: Config,
        store: S,
        jwt: JwtManager,
        hasher: PasswordHasher,
        relay: RelayHub,
    ) -> Self {
        let storage = Arc::new(LocalDiskStorage::new(config.upload_path.clone()));
        Self {
            config,
            store,
            jwt,
            hasher,
            relay,
            storage,
            consumed_reset_tokens: RwLock::new(ConsumedTokens::new()),
        }
    }

    /// Returns the project access checker.
    pub fn access(&self) -> AccessControl<'_, S> {
        AccessControl::new(&self.store, self.config.surface_member_roles)
    }
}

/// Type alias for shared state.
pub type SharedState<S> = Arc<AppState<S>>;

/// Creates shared state from config and store, with a process-local relay.
pub fn create_state<S: TaskStore>(config: Config, store: S) -> Result<SharedState<S>, AuthError> {
    create_state_with_relay(config, store, RelayHub::default())
}

/// Creates shared state whose relay hub was built by the caller, for
/// example on top of a shared [`PresenceRegistry`](crate::services::relay::PresenceRegistry).
pub fn create_state_with_relay<S: TaskStore>(
    config: Config,
    store: S,
    relay: RelayHub,
) -> Result<SharedState<S>, AuthError> {
    let jwt = JwtManager::new(
        JwtConfig::new(config.jwt_secret.clone())
            .with_expiration_hours(config.jwt_expiration_hours)
            .with_reset_expiration_minutes(config.reset_token_minutes),
    );

    let hasher = match config.password_memory_kib {
        Some(memory_kib) => PasswordHasher::new(memory_kib, DEFAULT_PASSWORD_ITERATIONS)?,
        None => PasswordHasher::default(),
    };

    Ok(Arc::new(AppState::new(config, store, jwt, hasher, relay)))
}
