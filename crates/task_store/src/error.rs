//! Task store error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during task store operations.
#[derive(Debug, Error)]
pub enum TaskStoreError {
    /// Entity not found.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Duplicate entity.
    #[error("{entity_type} already exists: {id}")]
    AlreadyExists {
        entity_type: &'static str,
        id: String,
    },

    /// Project still has tasks.
    #[error("Project {0} still has tasks")]
    HasDependentTasks(Uuid),

    /// User still owns projects.
    #[error("User {0} still owns projects")]
    OwnsProjects(Uuid),

    /// User still has tasks assigned.
    #[error("User {0} still has assigned tasks")]
    HasAssignedTasks(Uuid),

    /// A referenced record does not exist.
    #[error("Foreign key constraint violation: {0}")]
    ForeignKeyViolation(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl TaskStoreError {
    /// Creates a not found error.
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Creates an already exists error.
    pub fn already_exists(entity_type: &'static str, id: impl ToString) -> Self {
        Self::AlreadyExists {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Returns true for errors caused by the current relational state rather
    /// than by a storage failure.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists { .. }
                | Self::HasDependentTasks(_)
                | Self::OwnsProjects(_)
                | Self::HasAssignedTasks(_)
                | Self::ForeignKeyViolation(_)
        )
    }
}

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;
