//! Real-time relay events.
//!
//! Every frame is a JSON text message `{"event": "<name>", "data": {...}}`.
//! Clients send [`ClientEvent`]s; the server answers with [`ServerEvent`]s.
//! Payloads such as `task` or `comment` are relayed verbatim and are therefore
//! kept as raw JSON.

use chrono::{DateTime, Utc};
use entities::TaskStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Returns the relay room name of a project.
pub fn project_room(project_id: Uuid) -> String {
    format!("project-{project_id}")
}

/// Identity block stamped on every relayed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    /// "First Last".
    pub name: String,
    pub avatar: Option<String>,
}

/// Presence state announced through `user-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Events sent by a client over the relay connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinProjects(Vec<Uuid>),
    JoinProject(Uuid),
    LeaveProject(Uuid),
    TaskCreated {
        project_id: Uuid,
        #[serde(default)]
        task: Value,
    },
    TaskUpdated {
        project_id: Uuid,
        #[serde(default)]
        task: Value,
        action: Option<String>,
    },
    TaskDeleted {
        project_id: Uuid,
        task_id: Uuid,
    },
    TaskMoved {
        project_id: Uuid,
        task_id: Uuid,
        from_status: TaskStatus,
        to_status: TaskStatus,
        position: i32,
    },
    CommentAdded {
        project_id: Uuid,
        task_id: Uuid,
        #[serde(default)]
        comment: Value,
    },
    FileUploaded {
        project_id: Uuid,
        task_id: Option<Uuid>,
        #[serde(default)]
        file: Value,
    },
    TimeTrackingUpdated {
        project_id: Uuid,
        task_id: Uuid,
        action: Option<String>,
        duration: Option<f64>,
    },
    ProjectUpdated {
        project_id: Uuid,
        #[serde(default)]
        project: Value,
        action: Option<String>,
    },
    TeamUpdated {
        project_id: Uuid,
        action: Option<String>,
        #[serde(default)]
        member: Value,
    },
    TypingStart {
        project_id: Uuid,
        task_id: Uuid,
    },
    TypingStop {
        project_id: Uuid,
        task_id: Uuid,
    },
    UserOnline,
}

impl ClientEvent {
    /// Returns the event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinProjects(_) => "join-projects",
            Self::JoinProject(_) => "join-project",
            Self::LeaveProject(_) => "leave-project",
            Self::TaskCreated { .. } => "task-created",
            Self::TaskUpdated { .. } => "task-updated",
            Self::TaskDeleted { .. } => "task-deleted",
            Self::TaskMoved { .. } => "task-moved",
            Self::CommentAdded { .. } => "comment-added",
            Self::FileUploaded { .. } => "file-uploaded",
            Self::TimeTrackingUpdated { .. } => "time-tracking-updated",
            Self::ProjectUpdated { .. } => "project-updated",
            Self::TeamUpdated { .. } => "team-updated",
            Self::TypingStart { .. } => "typing-start",
            Self::TypingStop { .. } => "typing-stop",
            Self::UserOnline => "user-online",
        }
    }

    /// Returns the project whose room a relayed event targets.
    pub fn project_id(&self) -> Option<Uuid> {
        match self {
            Self::JoinProjects(_) | Self::JoinProject(_) | Self::LeaveProject(_) | Self::UserOnline => {
                None
            }
            Self::TaskCreated { project_id, .. }
            | Self::TaskUpdated { project_id, .. }
            | Self::TaskDeleted { project_id, .. }
            | Self::TaskMoved { project_id, .. }
            | Self::CommentAdded { project_id, .. }
            | Self::FileUploaded { project_id, .. }
            | Self::TimeTrackingUpdated { project_id, .. }
            | Self::ProjectUpdated { project_id, .. }
            | Self::TeamUpdated { project_id, .. }
            | Self::TypingStart { project_id, .. }
            | Self::TypingStop { project_id, .. } => Some(*project_id),
        }
    }

    /// Turns a room-scoped client event into the event its room peers
    /// receive, stamped with the sender and a server timestamp.
    ///
    /// Returns `None` for control events (joins, leaves, presence).
    pub fn into_relayed(self, actor: Actor, timestamp: DateTime<Utc>) -> Option<(Uuid, ServerEvent)> {
        let relayed = match self {
            Self::JoinProjects(_) | Self::JoinProject(_) | Self::LeaveProject(_) | Self::UserOnline => {
                return None;
            }
            Self::TaskCreated { project_id, task } => (
                project_id,
                ServerEvent::TaskCreated {
                    task,
                    created_by: actor,
                    timestamp,
                },
            ),
            Self::TaskUpdated {
                project_id,
                task,
                action,
            } => (
                project_id,
                ServerEvent::TaskUpdated {
                    task,
                    action,
                    updated_by: actor,
                    timestamp,
                },
            ),
            Self::TaskDeleted {
                project_id,
                task_id,
            } => (
                project_id,
                ServerEvent::TaskDeleted {
                    task_id,
                    deleted_by: actor,
                    timestamp,
                },
            ),
            Self::TaskMoved {
                project_id,
                task_id,
                from_status,
                to_status,
                position,
            } => (
                project_id,
                ServerEvent::TaskMoved {
                    task_id,
                    from_status,
                    to_status,
                    position,
                    moved_by: actor,
                    timestamp,
                },
            ),
            Self::CommentAdded {
                project_id,
                task_id,
                comment,
            } => (
                project_id,
                ServerEvent::CommentAdded {
                    task_id,
                    comment,
                    added_by: actor,
                    timestamp,
                },
            ),
            Self::FileUploaded {
                project_id,
                task_id,
                file,
            } => (
                project_id,
                ServerEvent::FileUploaded {
                    task_id,
                    file,
                    uploaded_by: actor,
                    timestamp,
                },
            ),
            Self::TimeTrackingUpdated {
                project_id,
                task_id,
                action,
                duration,
            } => (
                project_id,
                ServerEvent::TimeTrackingUpdated {
                    task_id,
                    action,
                    duration,
                    updated_by: actor,
                    timestamp,
                },
            ),
            Self::ProjectUpdated {
                project_id,
                project,
                action,
            } => (
                project_id,
                ServerEvent::ProjectUpdated {
                    project,
                    action,
                    updated_by: actor,
                    timestamp,
                },
            ),
            Self::TeamUpdated {
                project_id,
                action,
                member,
            } => (
                project_id,
                ServerEvent::TeamUpdated {
                    action,
                    member,
                    updated_by: actor,
                    timestamp,
                },
            ),
            Self::TypingStart {
                project_id,
                task_id,
            } => (
                project_id,
                ServerEvent::UserTyping {
                    task_id,
                    user: actor,
                    is_typing: true,
                },
            ),
            Self::TypingStop {
                project_id,
                task_id,
            } => (
                project_id,
                ServerEvent::UserTyping {
                    task_id,
                    user: actor,
                    is_typing: false,
                },
            ),
        };
        Some(relayed)
    }
}

/// Events sent by the server over the relay connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    TaskCreated {
        #[serde(default)]
        task: Value,
        created_by: Actor,
        timestamp: DateTime<Utc>,
    },
    TaskUpdated {
        #[serde(default)]
        task: Value,
        action: Option<String>,
        updated_by: Actor,
        timestamp: DateTime<Utc>,
    },
    TaskDeleted {
        task_id: Uuid,
        deleted_by: Actor,
        timestamp: DateTime<Utc>,
    },
    TaskMoved {
        task_id: Uuid,
        from_status: TaskStatus,
        to_status: TaskStatus,
        position: i32,
        moved_by: Actor,
        timestamp: DateTime<Utc>,
    },
    CommentAdded {
        task_id: Uuid,
        #[serde(default)]
        comment: Value,
        added_by: Actor,
        timestamp: DateTime<Utc>,
    },
    FileUploaded {
        task_id: Option<Uuid>,
        #[serde(default)]
        file: Value,
        uploaded_by: Actor,
        timestamp: DateTime<Utc>,
    },
    TimeTrackingUpdated {
        task_id: Uuid,
        action: Option<String>,
        duration: Option<f64>,
        updated_by: Actor,
        timestamp: DateTime<Utc>,
    },
    ProjectUpdated {
        #[serde(default)]
        project: Value,
        action: Option<String>,
        updated_by: Actor,
        timestamp: DateTime<Utc>,
    },
    TeamUpdated {
        action: Option<String>,
        #[serde(default)]
        member: Value,
        updated_by: Actor,
        timestamp: DateTime<Utc>,
    },
    UserTyping {
        task_id: Uuid,
        user: Actor,
        is_typing: bool,
    },
    UserStatus {
        user_id: Uuid,
        status: PresenceStatus,
        user: Actor,
        timestamp: DateTime<Utc>,
    },
    /// Sent only to the originating connection.
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Creates an error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Creates a presence event for `user`.
    pub fn user_status(user: Actor, status: PresenceStatus) -> Self {
        Self::UserStatus {
            user_id: user.id,
            status,
            user,
            timestamp: Utc::now(),
        }
    }
}
