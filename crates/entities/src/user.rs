//! User-related entity definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Global role of a user, independent of any project membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full user management rights.
    Admin,
    Manager,
    /// Regular user.
    #[default]
    Member,
}

impl UserRole {
    /// Returns the wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Member => "member",
        }
    }

    /// Checks if this role has admin privileges.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// UI theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Per-user interface and notification preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub theme: Theme,
    pub notifications: bool,
    pub language: String,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            notifications: true,
            language: "en".to_string(),
        }
    }
}

/// Partial preferences used for merge updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    pub theme: Option<Theme>,
    pub notifications: Option<bool>,
    pub language: Option<String>,
}

impl UserPreferences {
    /// Applies only the keys present in `patch`.
    pub fn merge(&mut self, patch: PreferencesPatch) {
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        if let Some(notifications) = patch.notifications {
            self.notifications = notifications;
        }
        if let Some(language) = patch.language {
            self.language = language;
        }
    }
}

/// A registered user.
///
/// The password hash is never serialized, so a `User` can be returned from
/// the API as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier.
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    /// Email address, stored lower-cased.
    pub email: String,
    /// Salted one-way hash of the password.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: UserRole,
    pub avatar: Option<String>,
    /// Inactive users can neither log in nor use existing tokens.
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub preferences: UserPreferences,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
    /// When this record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Creates a new active member with default preferences.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: normalize_email(&email.into()),
            password_hash: password_hash.into(),
            role: UserRole::Member,
            avatar: None,
            is_active: true,
            last_login: None,
            preferences: UserPreferences::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the global role.
    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }

    /// Returns "First Last".
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Canonical form of an email address used for storage and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
