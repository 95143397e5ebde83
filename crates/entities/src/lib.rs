//! Core entity definitions for Taskboard.
//!
//! This crate defines the data types shared by the store, the access control
//! layer and the HTTP API: users, projects, project memberships and tasks with
//! their sub-collections (comments, time entries, subtasks, activity) and
//! file attachments.

mod attachment;
mod project;
mod task;
mod user;

pub use attachment::*;
pub use project::*;
pub use task::*;
pub use user::*;

/// Priority shared by projects and tasks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Returns the wire name of the priority.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}
