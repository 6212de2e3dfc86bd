//! The per-organization actor.
//!
//! An [`OrgActor`] owns everything that must be serialized for one
//! organization: its sessions, its workflow alarm and its queue of messages
//! waiting for agent routing. It runs as a single task fed by an mpsc
//! channel, so every handler (WebSocket frame, admin request, alarm fire,
//! routing job) runs to completion before the next one starts.
//!
//! ```text
//!             ┌───────────────────── OrgActor task ─────────────────────┐
//! Command ───▶│ select! ─┬─ command ──▶ handler ──▶ deferred routing    │
//!             │          ├─ alarm   ──▶ run_due_workflows ──▶ re-arm    │
//!             │          └─ idle    ──▶ evict when nothing is pending   │
//!             └─────────────────────────────────────────────────────────┘
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use agora_core::{ConnectionId, MemberId, OrganizationId, RoomId, UserId, WorkflowId};
use agora_model::LanguageModel;
use agora_scheduler::Alarm;
use agora_store::{ChatRoom, ChatRoomMember, MessageQuery, Store, Workflow};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;
use crate::pipeline::{MessageDraft, RoutingJob};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{Connection, SessionRegistry};
use crate::tools::ToolRegistry;
use crate::types::{ActorConfig, CreateChatRoomRequest, CreateWorkflowRequest, NewMember};

/// A request to an organization actor.
#[derive(Debug)]
pub enum Command {
    /// A WebSocket was upgraded.
    Connect {
        /// The new connection.
        connection: Connection,
    },
    /// A WebSocket closed.
    Disconnect {
        /// The closed connection.
        connection_id: ConnectionId,
    },
    /// A text frame arrived on a WebSocket.
    Frame {
        /// The originating connection.
        connection_id: ConnectionId,
        /// Raw frame.
        text: String,
    },
    /// Create a room.
    CreateChatRoom {
        /// The room to create.
        request: CreateChatRoomRequest,
        /// Reply channel.
        reply: oneshot::Sender<Result<ChatRoom>>,
    },
    /// Add a member to a room.
    AddChatRoomMember {
        /// Target room.
        room_id: RoomId,
        /// The member to add.
        member: NewMember,
        /// Reply channel.
        reply: oneshot::Sender<Result<ChatRoomMember>>,
    },
    /// Remove a member from a room.
    DeleteChatRoomMember {
        /// Target room.
        room_id: RoomId,
        /// The member to remove.
        member_id: MemberId,
        /// Reply channel.
        reply: oneshot::Sender<Result<()>>,
    },
    /// Schedule a workflow.
    CreateWorkflow {
        /// The workflow to schedule.
        request: CreateWorkflowRequest,
        /// Reply channel.
        reply: oneshot::Sender<Result<Workflow>>,
    },
    /// Delete a workflow.
    DeleteWorkflow {
        /// The workflow to delete.
        workflow_id: WorkflowId,
        /// Reply channel.
        reply: oneshot::Sender<Result<()>>,
    },
}

/// State of one organization.
pub struct OrgActor<S: Store + 'static> {
    pub(crate) org_id: OrganizationId,
    pub(crate) store: Arc<S>,
    pub(crate) model: Arc<dyn LanguageModel>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) config: ActorConfig,
    pub(crate) sessions: SessionRegistry,
    pub(crate) alarm: Alarm,
    pub(crate) deferred: VecDeque<RoutingJob>,
}

impl<S: Store + 'static> OrgActor<S> {
    /// Create an actor with no sessions and a disarmed alarm.
    #[must_use]
    pub fn new(
        org_id: OrganizationId,
        store: Arc<S>,
        model: Arc<dyn LanguageModel>,
        tools: Arc<ToolRegistry>,
        config: ActorConfig,
    ) -> Self {
        let sessions = SessionRegistry::new(config.room_scoped_broadcast);
        Self {
            org_id,
            store,
            model,
            tools,
            config,
            sessions,
            alarm: Alarm::new(),
            deferred: VecDeque::new(),
        }
    }

    /// The organization this actor serves.
    #[must_use]
    pub const fn org_id(&self) -> OrganizationId {
        self.org_id
    }

    /// Rebuild sessions from connections that outlived a previous actor.
    pub fn rehydrate(&mut self, connections: impl IntoIterator<Item = Connection>) -> usize {
        let restored = self.sessions.rehydrate(connections);
        if !self.sessions.is_empty() {
            tracing::info!(
                org_id = %self.org_id,
                sessions = self.sessions.len(),
                restored,
                "Sessions rehydrated"
            );
        }
        restored
    }

    /// Start the actor task and return its command channel.
    pub fn spawn(self) -> mpsc::Sender<Command> {
        let (tx, rx) = mpsc::channel(self.config.command_buffer.max(1));
        tokio::spawn(self.run(rx));
        tx
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        tracing::info!(org_id = %self.org_id, "Actor started");

        if let Err(e) = self.arm_on_start(Utc::now()) {
            tracing::error!(org_id = %self.org_id, error = %e, "Failed to arm workflow alarm");
        }

        let idle = Duration::from_secs(self.config.idle_timeout_seconds);
        let idle_timer = tokio::time::sleep(idle);
        tokio::pin!(idle_timer);

        loop {
            self.drain_deferred().await;

            let alarm = self.alarm.wait();
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    self.handle(command).await;
                }
                () = alarm => {
                    self.on_alarm().await;
                }
                () = &mut idle_timer => {
                    if self.is_idle() && commands.is_empty() {
                        // Commands queued before the close still run.
                        commands.close();
                        while let Ok(command) = commands.try_recv() {
                            self.handle(command).await;
                        }
                        self.drain_deferred().await;
                        tracing::info!(org_id = %self.org_id, "Actor evicted after inactivity");
                        break;
                    }
                }
            }

            idle_timer
                .as_mut()
                .reset(tokio::time::Instant::now() + idle);
        }

        tracing::info!(org_id = %self.org_id, "Actor stopped");
    }

    /// No sessions, no alarm and no queued routing.
    pub(crate) fn is_idle(&self) -> bool {
        self.sessions.is_empty() && !self.alarm.is_armed() && self.deferred.is_empty()
    }

    async fn drain_deferred(&mut self) {
        while let Some(job) = self.deferred.pop_front() {
            self.process_routing_job(job).await;
        }
    }

    async fn on_alarm(&mut self) {
        let now = Utc::now();
        if !self.alarm.take_if_due(now) {
            return;
        }

        match self.run_due_workflows(now).await {
            Ok(ran) => tracing::debug!(org_id = %self.org_id, ran, "Alarm handled"),
            Err(e) => {
                tracing::error!(org_id = %self.org_id, error = %e, "Failed to run due workflows");
                if let Err(e) = self.schedule_next_alarm(Utc::now()) {
                    tracing::error!(org_id = %self.org_id, error = %e, "Failed to re-arm alarm");
                }
            }
        }
    }

    /// Handle one command.
    pub(crate) async fn handle(&mut self, command: Command) {
        match command {
            Command::Connect { connection } => {
                let connection_id = connection.id();
                let user_id = connection.user_id();
                self.sessions.register(connection);
                tracing::debug!(
                    org_id = %self.org_id,
                    connection_id = %connection_id,
                    user_id = %user_id,
                    "Session registered"
                );
            }
            Command::Disconnect { connection_id } => {
                if self.sessions.unregister(&connection_id).is_some() {
                    tracing::debug!(
                        org_id = %self.org_id,
                        connection_id = %connection_id,
                        "Session closed"
                    );
                }
            }
            Command::Frame {
                connection_id,
                text,
            } => self.handle_frame(&connection_id, &text),
            Command::CreateChatRoom { request, reply } => {
                let _ = reply.send(self.create_chat_room(request, Utc::now()));
            }
            Command::AddChatRoomMember {
                room_id,
                member,
                reply,
            } => {
                let _ = reply.send(self.add_chat_room_member(&room_id, member));
            }
            Command::DeleteChatRoomMember {
                room_id,
                member_id,
                reply,
            } => {
                let _ = reply.send(self.delete_chat_room_member(&room_id, &member_id));
            }
            Command::CreateWorkflow { request, reply } => {
                let _ = reply.send(self.create_workflow(request, Utc::now()));
            }
            Command::DeleteWorkflow { workflow_id, reply } => {
                let _ = reply.send(self.delete_workflow(&workflow_id, Utc::now()));
            }
        }
    }

    /// Handle a WebSocket text frame. Errors go back to the sender only.
    pub(crate) fn handle_frame(&mut self, connection_id: &ConnectionId, text: &str) {
        let Some(user_id) = self.sessions.get(connection_id).map(|s| s.user_id) else {
            tracing::warn!(connection_id = %connection_id, "Frame from unknown connection");
            return;
        };

        let result = ClientMessage::parse(text)
            .and_then(|message| self.on_client_message(connection_id, user_id, message));

        match result {
            Ok(Some(reply)) => self.sessions.send_to_connection(connection_id, &reply),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(
                    org_id = %self.org_id,
                    connection_id = %connection_id,
                    error = %e,
                    "Frame rejected"
                );
                self.sessions
                    .send_to_connection(connection_id, &ServerMessage::error(&e));
            }
        }
    }

    fn on_client_message(
        &mut self,
        connection_id: &ConnectionId,
        user_id: UserId,
        message: ClientMessage,
    ) -> Result<Option<ServerMessage>> {
        let page = self.config.history_page_size;

        match message {
            ClientMessage::UserInitRequest => Ok(Some(ServerMessage::UserInitResponse {
                chat_rooms: self.rooms_of_user(user_id)?,
            })),

            ClientMessage::ChatRoomInitRequest { room_id } => {
                let room = self.room_for_user(&room_id, user_id)?;
                let members = self.store.get_chat_room_members(&room_id, None)?;
                let messages =
                    self.store
                        .get_chat_room_messages(&room_id, None, MessageQuery::latest(page))?;
                let workflows = self.store.list_workflows_by_room(&room_id)?;

                self.sessions.set_active_room(connection_id, room_id);
                Ok(Some(ServerMessage::ChatRoomInitResponse {
                    room_id,
                    room,
                    members,
                    messages,
                    workflows,
                }))
            }

            ClientMessage::ChatRoomThreadInitRequest { room_id, thread_id } => {
                self.room_for_user(&room_id, user_id)?;
                let root = self.thread_root(&room_id, thread_id)?;
                let messages = self.store.get_chat_room_messages(
                    &room_id,
                    Some(thread_id),
                    MessageQuery::latest(page),
                )?;

                self.sessions.set_active_room(connection_id, room_id);
                Ok(Some(ServerMessage::ChatRoomThreadInitResponse {
                    room_id,
                    thread_id,
                    root,
                    messages,
                }))
            }

            ClientMessage::ChatRoomMessageSend {
                room_id,
                thread_id,
                message,
            } => {
                self.room_for_user(&room_id, user_id)?;
                let draft = MessageDraft::from_client(message, thread_id, Utc::now());
                self.receive_message(user_id.into(), room_id, draft, None, true)?;
                Ok(None)
            }

            ClientMessage::ChatRoomMessagesRequest {
                room_id,
                thread_id,
                before_id,
            } => {
                self.room_for_user(&room_id, user_id)?;
                if let Some(root_id) = thread_id {
                    self.thread_root(&room_id, root_id)?;
                }
                let messages = self.store.get_chat_room_messages(
                    &room_id,
                    thread_id,
                    MessageQuery {
                        limit: Some(page),
                        before: before_id,
                    },
                )?;
                Ok(Some(ServerMessage::ChatRoomMessagesResponse {
                    room_id,
                    thread_id,
                    messages,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_agent, drain, harness, Harness};
    use serde_json::json;

    fn send_frame(text: &str, room_id: RoomId, thread_id: Option<u64>) -> String {
        json!({
            "type": "chat-room-message-send",
            "roomId": room_id.to_string(),
            "threadId": thread_id,
            "message": {"id": "tmp-1", "content": text, "mentions": [], "toolUses": []}
        })
        .to_string()
    }

    #[tokio::test]
    async fn user_init_lists_rooms() {
        let Harness {
            mut actor,
            room,
            user,
            _dir,
            ..
        } = harness();
        let (conn, mut rx) = actor.connect_test(user);

        actor.handle_frame(&conn.id(), r#"{"type":"user-init-request"}"#);

        let frames = drain(&mut rx);
        assert_eq!(frames[0]["type"], "user-init-response");
        assert_eq!(frames[0]["chatRooms"][0]["id"], room.id.to_string());
    }

    #[tokio::test]
    async fn room_init_sets_active_room() {
        let Harness {
            mut actor,
            room,
            user,
            _dir,
            ..
        } = harness();
        let (conn, mut rx) = actor.connect_test(user);

        actor.handle_frame(
            &conn.id(),
            &json!({"type": "chat-room-init-request", "roomId": room.id.to_string()}).to_string(),
        );

        let frames = drain(&mut rx);
        assert_eq!(frames[0]["type"], "chat-room-init-response");
        assert_eq!(frames[0]["members"].as_array().unwrap().len(), 1);
        assert_eq!(
            actor.sessions.get(&conn.id()).unwrap().active_room_id,
            Some(room.id)
        );
        assert_eq!(conn.attachment().unwrap().active_room_id, Some(room.id));
    }

    #[tokio::test]
    async fn errors_go_only_to_the_sender() {
        let Harness {
            mut actor,
            user,
            _dir,
            ..
        } = harness();
        let (conn, mut rx) = actor.connect_test(user);
        let (_other, mut other_rx) = actor.connect_test(UserId::generate());

        actor.handle_frame(&conn.id(), r#"{"type":"chat-room-delete"}"#);
        actor.handle_frame(
            &conn.id(),
            &json!({"type": "chat-room-init-request", "roomId": RoomId::generate().to_string()})
                .to_string(),
        );

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f["type"] == "error"));
        assert!(frames[1]["error"].as_str().unwrap().contains("not found"));
        assert!(drain(&mut other_rx).is_empty());
    }

    #[tokio::test]
    async fn non_members_cannot_post() {
        let Harness {
            mut actor,
            room,
            _dir,
            ..
        } = harness();
        let (conn, mut rx) = actor.connect_test(UserId::generate());

        actor.handle_frame(&conn.id(), &send_frame("hi", room.id, None));

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "error");
        assert!(actor.deferred.is_empty());
    }

    #[tokio::test]
    async fn sent_message_echoes_optimistic_id_and_queues_routing() {
        let Harness {
            mut actor,
            room,
            user,
            _dir,
            ..
        } = harness();
        let (conn, mut rx) = actor.connect_test(user);

        actor.handle_frame(&conn.id(), &send_frame("hello", room.id, None));

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "chat-room-message-broadcast");
        assert_eq!(
            frames[0]["message"]["metadata"]["optimisticData"]["id"],
            "tmp-1"
        );
        assert_eq!(actor.deferred.len(), 1);
    }

    #[tokio::test]
    async fn thread_init_and_history_paging() {
        let Harness {
            mut actor,
            room,
            user,
            _dir,
            ..
        } = harness();
        let (conn, mut rx) = actor.connect_test(user);

        actor.handle_frame(&conn.id(), &send_frame("root", room.id, None));
        let root_id = drain(&mut rx)[0]["message"]["id"].as_u64().unwrap();
        for i in 0..3 {
            actor.handle_frame(&conn.id(), &send_frame(&format!("r{i}"), room.id, Some(root_id)));
        }
        drain(&mut rx);

        actor.handle_frame(
            &conn.id(),
            &json!({
                "type": "chat-room-thread-init-request",
                "roomId": room.id.to_string(),
                "threadId": root_id
            })
            .to_string(),
        );
        let init = drain(&mut rx);
        assert_eq!(init[0]["type"], "chat-room-thread-init-response");
        assert_eq!(init[0]["root"]["threadMetadata"]["messageCount"], 3);
        let replies = init[0]["messages"].as_array().unwrap();
        assert_eq!(replies.len(), 3);
        let last_id = replies[2]["id"].as_u64().unwrap();

        actor.handle_frame(
            &conn.id(),
            &json!({
                "type": "chat-room-messages-request",
                "roomId": room.id.to_string(),
                "threadId": root_id,
                "beforeId": last_id
            })
            .to_string(),
        );
        let page = drain(&mut rx);
        assert_eq!(page[0]["type"], "chat-room-messages-response");
        let older = page[0]["messages"].as_array().unwrap();
        assert_eq!(older.len(), 2);
        assert_eq!(older[1]["content"], "r1");
    }

    #[tokio::test]
    async fn idle_requires_no_sessions_alarm_or_work() {
        let Harness {
            mut actor,
            room,
            user,
            _dir,
            ..
        } = harness();
        assert!(actor.is_idle());

        let (conn, _rx) = actor.connect_test(user);
        assert!(!actor.is_idle());
        actor
            .handle(Command::Disconnect {
                connection_id: conn.id(),
            })
            .await;
        assert!(actor.is_idle());

        let scout = add_agent(&mut actor, &room, "Scout", "Finds sources");
        actor
            .create_workflow(
                CreateWorkflowRequest {
                    chat_room_id: room.id,
                    agent_id: scout.id,
                    goal: "g".into(),
                    steps: Vec::new(),
                    schedule_expression: "0 9 * * 1".into(),
                },
                Utc::now(),
            )
            .unwrap();
        assert!(!actor.is_idle());
    }

    #[tokio::test]
    async fn admin_commands_reply() {
        let Harness {
            mut actor,
            room,
            _dir,
            ..
        } = harness();
        let (tx, rx) = oneshot::channel();
        let member = UserId::generate();

        actor
            .handle(Command::AddChatRoomMember {
                room_id: room.id,
                member: NewMember::user(member, "Grace", agora_store::MemberRole::Member),
                reply: tx,
            })
            .await;

        let added = rx.await.unwrap().unwrap();
        assert_eq!(added.member_id, MemberId::from(member));
    }
}
