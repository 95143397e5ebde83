//! Storage for Taskboard.
//!
//! This crate provides the [`TaskStore`] abstraction over users, projects,
//! project memberships, tasks and the per-task collections (comments, time
//! entries, subtasks and the activity log), together with an in-memory
//! implementation. Relational invariants such as unique emails, unique
//! memberships and deletion guards are enforced by the store itself.

mod error;
mod memory;
mod traits;

pub use error::*;
pub use memory::*;
pub use traits::*;
