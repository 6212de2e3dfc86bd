//! Registry of organization actors.
//!
//! The [`Hub`] is the only way into an actor from outside. It spawns actors
//! on demand and respawns them after eviction, handing each new actor the
//! organization's open connections so sessions survive the restart.
//! Requests that expect an answer travel as a command carrying a oneshot
//! channel and are bounded by `request_timeout_seconds`.
//!
//! ```text
//! HTTP / WS handler ──▶ Hub::dispatch ──▶ mpsc ──▶ OrgActor
//!                          │   send failed (actor evicted)
//!                          └──▶ respawn + rehydrate ──▶ resend
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agora_core::{ConnectionId, MemberId, OrganizationId, RoomId, UserId, WorkflowId};
use agora_model::LanguageModel;
use agora_store::{Agent, ChatRoom, ChatRoomMember, Store, Workflow};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::actor::{Command, OrgActor};
use crate::error::{ActorError, Result};
use crate::session::Connection;
use crate::tools::ToolRegistry;
use crate::types::{
    ActorConfig, CreateAgentRequest, CreateChatRoomRequest, CreateWorkflowRequest, NewMember,
};

#[derive(Default)]
struct Slot {
    sender: Option<mpsc::Sender<Command>>,
    connections: HashMap<ConnectionId, Connection>,
}

/// Entry point to all organization actors.
pub struct Hub<S: Store + 'static> {
    store: Arc<S>,
    model: Arc<dyn LanguageModel>,
    tools: Arc<ToolRegistry>,
    config: ActorConfig,
    slots: Mutex<HashMap<OrganizationId, Slot>>,
}

impl<S: Store + 'static> Hub<S> {
    /// Create a hub with no running actors.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        model: Arc<dyn LanguageModel>,
        tools: Arc<ToolRegistry>,
        config: ActorConfig,
    ) -> Self {
        Self {
            store,
            model,
            tools,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The storage backend.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The actor configuration.
    #[must_use]
    pub const fn config(&self) -> &ActorConfig {
        &self.config
    }

    /// Number of actors whose task is still running.
    #[must_use]
    pub fn active_actors(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.sender.as_ref().is_some_and(|s| !s.is_closed()))
            .count()
    }

    /// Start actors for every organization with active workflows, so their
    /// alarms are armed without waiting for a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the organizations cannot be listed.
    pub fn warm_start(&self) -> Result<usize> {
        let orgs = self.store.list_organizations_with_active_workflows()?;
        for org_id in &orgs {
            self.sender(*org_id);
        }
        tracing::info!(count = orgs.len(), "Actors warm-started");
        Ok(orgs.len())
    }

    // =========================================================================
    // WebSocket Sessions
    // =========================================================================

    /// Register a new WebSocket for a user.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::ActorUnavailable` if the actor cannot be reached.
    pub async fn connect(
        &self,
        org_id: OrganizationId,
        user_id: UserId,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Result<Connection> {
        let connection = Connection::new(user_id, outbound);
        self.slots
            .lock()
            .entry(org_id)
            .or_default()
            .connections
            .insert(connection.id(), connection.clone());

        self.dispatch(
            org_id,
            Command::Connect {
                connection: connection.clone(),
            },
        )
        .await?;
        Ok(connection)
    }

    /// Forward a text frame from a WebSocket.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::ActorUnavailable` if the actor cannot be reached.
    pub async fn frame(
        &self,
        org_id: OrganizationId,
        connection_id: ConnectionId,
        text: String,
    ) -> Result<()> {
        self.dispatch(
            org_id,
            Command::Frame {
                connection_id,
                text,
            },
        )
        .await
    }

    /// Forget a closed WebSocket. Never spawns an actor.
    pub async fn disconnect(&self, org_id: OrganizationId, connection_id: ConnectionId) {
        let sender = {
            let mut slots = self.slots.lock();
            let Some(slot) = slots.get_mut(&org_id) else {
                return;
            };
            slot.connections.remove(&connection_id);
            slot.sender.clone()
        };

        if let Some(sender) = sender {
            let _ = sender.send(Command::Disconnect { connection_id }).await;
        }
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Store an agent profile. Profiles are read-only to actors, so this does
    /// not go through one.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be stored.
    pub fn register_agent(
        &self,
        org_id: OrganizationId,
        request: CreateAgentRequest,
    ) -> Result<Agent> {
        let agent = request.into_agent(org_id, Utc::now());
        self.store.put_agent(&agent)?;
        tracing::info!(org_id = %org_id, agent_id = %agent.id, name = %agent.name, "Agent registered");
        Ok(agent)
    }

    /// Create a room.
    ///
    /// # Errors
    ///
    /// Returns the actor's error, `ActorError::Timeout` or
    /// `ActorError::ActorUnavailable`.
    pub async fn create_chat_room(
        &self,
        org_id: OrganizationId,
        request: CreateChatRoomRequest,
    ) -> Result<ChatRoom> {
        self.request(org_id, |reply| Command::CreateChatRoom { request, reply })
            .await
    }

    /// Add a member to a room.
    ///
    /// # Errors
    ///
    /// Returns the actor's error, `ActorError::Timeout` or
    /// `ActorError::ActorUnavailable`.
    pub async fn add_chat_room_member(
        &self,
        org_id: OrganizationId,
        room_id: RoomId,
        member: NewMember,
    ) -> Result<ChatRoomMember> {
        self.request(org_id, |reply| Command::AddChatRoomMember {
            room_id,
            member,
            reply,
        })
        .await
    }

    /// Remove a member from a room.
    ///
    /// # Errors
    ///
    /// Returns the actor's error, `ActorError::Timeout` or
    /// `ActorError::ActorUnavailable`.
    pub async fn delete_chat_room_member(
        &self,
        org_id: OrganizationId,
        room_id: RoomId,
        member_id: MemberId,
    ) -> Result<()> {
        self.request(org_id, |reply| Command::DeleteChatRoomMember {
            room_id,
            member_id,
            reply,
        })
        .await
    }

    /// Schedule a workflow.
    ///
    /// # Errors
    ///
    /// Returns the actor's error, `ActorError::Timeout` or
    /// `ActorError::ActorUnavailable`.
    pub async fn create_workflow(
        &self,
        org_id: OrganizationId,
        request: CreateWorkflowRequest,
    ) -> Result<Workflow> {
        self.request(org_id, |reply| Command::CreateWorkflow { request, reply })
            .await
    }

    /// Delete a workflow.
    ///
    /// # Errors
    ///
    /// Returns the actor's error, `ActorError::Timeout` or
    /// `ActorError::ActorUnavailable`.
    pub async fn delete_workflow(&self, org_id: OrganizationId, workflow_id: WorkflowId) -> Result<()> {
        self.request(org_id, |reply| Command::DeleteWorkflow { workflow_id, reply })
            .await
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    async fn request<T>(
        &self,
        org_id: OrganizationId,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(org_id, command(tx)).await?;

        let timeout = Duration::from_secs(self.config.request_timeout_seconds);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ActorError::ActorUnavailable(org_id)),
            Err(_) => {
                tracing::warn!(org_id = %org_id, "Actor request timed out");
                Err(ActorError::Timeout)
            }
        }
    }

    /// Send a command, respawning the actor once if it has shut down.
    async fn dispatch(&self, org_id: OrganizationId, command: Command) -> Result<()> {
        let sender = self.sender(org_id);
        let Err(mpsc::error::SendError(command)) = sender.send(command).await else {
            return Ok(());
        };

        tracing::debug!(org_id = %org_id, "Actor gone, respawning");
        let sender = self.respawn(org_id, &sender);
        sender
            .send(command)
            .await
            .map_err(|_| ActorError::ActorUnavailable(org_id))
    }

    /// The running actor's channel, spawning one if needed.
    fn sender(&self, org_id: OrganizationId) -> mpsc::Sender<Command> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(org_id).or_default();
        match &slot.sender {
            Some(sender) if !sender.is_closed() => sender.clone(),
            _ => self.spawn_into(org_id, slot),
        }
    }

    /// Replace a dead channel, unless another caller already did.
    fn respawn(&self, org_id: OrganizationId, dead: &mpsc::Sender<Command>) -> mpsc::Sender<Command> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(org_id).or_default();
        match &slot.sender {
            Some(sender) if !sender.same_channel(dead) && !sender.is_closed() => sender.clone(),
            _ => self.spawn_into(org_id, slot),
        }
    }

    fn spawn_into(&self, org_id: OrganizationId, slot: &mut Slot) -> mpsc::Sender<Command> {
        slot.connections.retain(|_, c| !c.is_closed());

        let mut actor = OrgActor::new(
            org_id,
            Arc::clone(&self.store),
            Arc::clone(&self.model),
            Arc::clone(&self.tools),
            self.config.clone(),
        );
        actor.rehydrate(slot.connections.values().cloned());

        let sender = actor.spawn();
        slot.sender = Some(sender.clone());
        sender
    }
}
