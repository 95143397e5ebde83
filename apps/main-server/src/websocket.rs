//! WebSocket transport of the real-time relay.

use std::sync::Arc;

use api_protocol::{ClientEvent, RelayConnectQuery, ServerEvent};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use task_store::TaskStore;
use uuid::Uuid;

use crate::{
    error::{ServerError, ServerResult},
    extract::AppQuery,
    middleware::auth::{AuthenticatedUser, authenticate_token, extract_bearer},
    services::relay::{ConnectionId, RelayConnection},
    state::AppState,
};

/// Handles the relay upgrade request.
///
/// The token comes from the `token` query parameter or the Authorization
/// header. Connections without a valid token are refused before upgrading.
pub async fn relay_handler<S: TaskStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AppQuery(query): AppQuery<RelayConnectQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ServerResult<Response> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| extract_bearer(&headers).map(str::to_owned))
        .ok_or(ServerError::AuthenticationRequired)?;

    let user = authenticate_token(&state, &token).await?;
    let user = AuthenticatedUser::from(&user);

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

/// Runs one relay connection until the peer goes away.
async fn handle_socket<S: TaskStore + 'static>(
    socket: WebSocket,
    state: Arc<AppState<S>>,
    user: AuthenticatedUser,
) {
    let (mut sink, mut stream) = socket.split();
    let RelayConnection { id, mut events } = state.relay.connect(user.actor()).await;

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode relay event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handle_frame(&state, id, &user, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Relay transport error");
                break;
            }
        }
    }

    state.relay.disconnect(id).await;
    send_task.abort();
}

/// Parses one text frame and dispatches it.
pub async fn handle_frame<S: TaskStore>(
    state: &AppState<S>,
    connection_id: ConnectionId,
    user: &AuthenticatedUser,
    text: &str,
) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => handle_client_event(state, connection_id, user, event).await,
        Err(e) => {
            tracing::warn!(connection_id = %connection_id, error = %e, "Malformed relay frame");
            state
                .relay
                .send_to(connection_id, ServerEvent::error(format!("Invalid event: {e}")))
                .await;
        }
    }
}

/// Applies one client event.
pub async fn handle_client_event<S: TaskStore>(
    state: &AppState<S>,
    connection_id: ConnectionId,
    user: &AuthenticatedUser,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinProjects(project_ids) => {
            for project_id in project_ids {
                join(state, connection_id, user.id, project_id).await;
            }
        }
        ClientEvent::JoinProject(project_id) => {
            join(state, connection_id, user.id, project_id).await;
        }
        ClientEvent::LeaveProject(project_id) => {
            state.relay.leave(connection_id, project_id).await;
        }
        ClientEvent::UserOnline => {
            state.relay.announce_online(connection_id).await;
        }
        event => {
            let Some(project_id) = event.project_id() else {
                return;
            };
            if !refresh_actor(state, connection_id, user.id).await {
                return;
            }
            if state.config.relay_enforce_room_access
                && !state.relay.is_in_room(connection_id, project_id).await
            {
                tracing::warn!(
                    connection_id = %connection_id,
                    project_id = %project_id,
                    event = event.name(),
                    "Rejected relay event outside joined room"
                );
                state
                    .relay
                    .send_to(
                        connection_id,
                        ServerEvent::error(format!("Not joined to project {project_id}")),
                    )
                    .await;
                return;
            }
            state.relay.relay(connection_id, event).await;
        }
    }
}

/// Re-reads the sender so relayed events carry its current name and avatar.
///
/// Returns false, after telling the connection why, when the sender can no
/// longer relay.
async fn refresh_actor<S: TaskStore>(
    state: &AppState<S>,
    connection_id: ConnectionId,
    user_id: Uuid,
) -> bool {
    let message = match state.store.get_user(user_id).await {
        Ok(Some(current)) if current.is_active => {
            let actor = AuthenticatedUser::from(&current).actor();
            state.relay.update_actor(connection_id, actor).await;
            return true;
        }
        Ok(_) => "User is no longer active",
        Err(e) => {
            tracing::error!(connection_id = %connection_id, error = %e, "Failed to load relay sender");
            "Internal server error"
        }
    };
    state
        .relay
        .send_to(connection_id, ServerEvent::error(message))
        .await;
    false
}

async fn join<S: TaskStore>(
    state: &AppState<S>,
    connection_id: ConnectionId,
    user_id: Uuid,
    project_id: Uuid,
) {
    if !state.config.relay_enforce_room_access {
        state.relay.join(connection_id, project_id).await;
        return;
    }

    if let Err(e) = state.access().check_project_access(project_id, user_id).await {
        let (_, message) = e.status_and_message();
        tracing::warn!(
            connection_id = %connection_id,
            project_id = %project_id,
            reason = %message,
            "Rejected relay room join"
        );
        state
            .relay
            .send_to(
                connection_id,
                ServerEvent::error(format!("Cannot join project {project_id}: {message}")),
            )
            .await;
        return;
    }
    state.relay.join(connection_id, project_id).await;
}

#[cfg(test)]
mod tests {
    use entities::{Project, User};
    use serde_json::json;
    use task_store::MemoryTaskStore;

    use super::*;
    use crate::{config::Config, state::create_state};

    struct Fixture {
        state: Arc<AppState<MemoryTaskStore>>,
        owner: AuthenticatedUser,
        outsider: AuthenticatedUser,
        project: Project,
    }

    async fn fixture(enforce: bool) -> Fixture {
        let config = Config {
            password_memory_kib: Some(1024),
            relay_enforce_room_access: enforce,
            ..Config::default()
        };
        let state = create_state(config, MemoryTaskStore::new()).unwrap();
        let owner = state
            .store
            .create_user(User::new("Ada", "Lovelace", "ada@example.com", "hash"))
            .await
            .unwrap();
        let outsider = state
            .store
            .create_user(User::new("Eve", "Outside", "eve@example.com", "hash"))
            .await
            .unwrap();
        let project = state
            .store
            .create_project(Project::new("Launch", owner.id))
            .await
            .unwrap();

        Fixture {
            owner: AuthenticatedUser::from(&owner),
            outsider: AuthenticatedUser::from(&outsider),
            state,
            project,
        }
    }

    #[tokio::test]
    async fn test_join_requires_project_access() {
        let f = fixture(true).await;
        let mut conn = f.state.relay.connect(f.outsider.actor()).await;

        handle_client_event(
            &f.state,
            conn.id,
            &f.outsider,
            ClientEvent::JoinProject(f.project.id),
        )
        .await;

        assert!(!f.state.relay.is_in_room(conn.id, f.project.id).await);
        assert!(matches!(
            conn.events.try_recv().unwrap(),
            ServerEvent::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_join_unchecked_when_not_enforced() {
        let f = fixture(false).await;
        let conn = f.state.relay.connect(f.outsider.actor()).await;

        handle_client_event(
            &f.state,
            conn.id,
            &f.outsider,
            ClientEvent::JoinProjects(vec![f.project.id]),
        )
        .await;

        assert!(f.state.relay.is_in_room(conn.id, f.project.id).await);
    }

    #[tokio::test]
    async fn test_owner_relays_to_room_peers() {
        let f = fixture(true).await;
        let a = f.state.relay.connect(f.owner.actor()).await;
        let mut b = f.state.relay.connect(f.owner.actor()).await;

        for conn in [a.id, b.id] {
            handle_client_event(&f.state, conn, &f.owner, ClientEvent::JoinProject(f.project.id))
                .await;
        }

        let frame = json!({
            "event": "task-created",
            "data": {"projectId": f.project.id, "task": {"title": "Write brief"}}
        });
        handle_frame(&f.state, a.id, &f.owner, &frame.to_string()).await;

        match b.events.try_recv().unwrap() {
            ServerEvent::TaskCreated { task, created_by, .. } => {
                assert_eq!(task["title"], "Write brief");
                assert_eq!(created_by.name, "Ada Lovelace");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_outside_room_is_refused() {
        let f = fixture(true).await;
        let mut conn = f.state.relay.connect(f.owner.actor()).await;

        handle_client_event(
            &f.state,
            conn.id,
            &f.owner,
            ClientEvent::TypingStart {
                project_id: f.project.id,
                task_id: Uuid::new_v4(),
            },
        )
        .await;

        assert!(matches!(
            conn.events.try_recv().unwrap(),
            ServerEvent::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_malformed_frame_reports_error() {
        let f = fixture(true).await;
        let mut conn = f.state.relay.connect(f.owner.actor()).await;

        handle_frame(&f.state, conn.id, &f.owner, "{not json").await;

        match conn.events.try_recv().unwrap() {
            ServerEvent::Error { message } => assert!(message.starts_with("Invalid event")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_optional_fields_are_relayed() {
        let f = fixture(true).await;
        let mut a = f.state.relay.connect(f.owner.actor()).await;
        let mut b = f.state.relay.connect(f.owner.actor()).await;
        for conn in [a.id, b.id] {
            handle_client_event(&f.state, conn, &f.owner, ClientEvent::JoinProject(f.project.id))
                .await;
        }

        let task_id = Uuid::new_v4();
        let frames = [
            json!({
                "event": "file-uploaded",
                "data": {"projectId": f.project.id, "file": {"filename": "plan.pdf"}}
            }),
            json!({
                "event": "time-tracking-updated",
                "data": {"projectId": f.project.id, "taskId": task_id}
            }),
            json!({
                "event": "team-updated",
                "data": {"projectId": f.project.id, "member": {"role": "member"}}
            }),
        ];
        for frame in &frames {
            handle_frame(&f.state, a.id, &f.owner, &frame.to_string()).await;
        }

        match b.events.try_recv().unwrap() {
            ServerEvent::FileUploaded { task_id, file, .. } => {
                assert!(task_id.is_none());
                assert_eq!(file["filename"], "plan.pdf");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match b.events.try_recv().unwrap() {
            ServerEvent::TimeTrackingUpdated { action, duration, .. } => {
                assert!(action.is_none());
                assert!(duration.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match b.events.try_recv().unwrap() {
            ServerEvent::TeamUpdated { action, member, .. } => {
                assert!(action.is_none());
                assert_eq!(member["role"], "member");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(a.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relayed_events_carry_current_profile() {
        let f = fixture(true).await;
        let a = f.state.relay.connect(f.owner.actor()).await;
        let mut b = f.state.relay.connect(f.owner.actor()).await;
        for conn in [a.id, b.id] {
            handle_client_event(&f.state, conn, &f.owner, ClientEvent::JoinProject(f.project.id))
                .await;
        }

        let mut renamed = f.state.store.get_user(f.owner.id).await.unwrap().unwrap();
        renamed.last_name = "King".to_string();
        f.state.store.update_user(renamed).await.unwrap();

        let frame = json!({
            "event": "task-deleted",
            "data": {"projectId": f.project.id, "taskId": Uuid::new_v4()}
        });
        handle_frame(&f.state, a.id, &f.owner, &frame.to_string()).await;

        match b.events.try_recv().unwrap() {
            ServerEvent::TaskDeleted { deleted_by, .. } => {
                assert_eq!(deleted_by.name, "Ada King");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deactivated_sender_cannot_relay() {
        let f = fixture(true).await;
        let mut a = f.state.relay.connect(f.owner.actor()).await;
        let mut b = f.state.relay.connect(f.owner.actor()).await;
        for conn in [a.id, b.id] {
            handle_client_event(&f.state, conn, &f.owner, ClientEvent::JoinProject(f.project.id))
                .await;
        }

        let mut user = f.state.store.get_user(f.owner.id).await.unwrap().unwrap();
        user.is_active = false;
        f.state.store.update_user(user).await.unwrap();

        handle_client_event(
            &f.state,
            a.id,
            &f.owner,
            ClientEvent::TypingStart {
                project_id: f.project.id,
                task_id: Uuid::new_v4(),
            },
        )
        .await;

        assert!(matches!(
            a.events.try_recv().unwrap(),
            ServerEvent::Error { .. }
        ));
        assert!(b.events.try_recv().is_err());
    }
}
