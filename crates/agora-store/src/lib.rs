//! `RocksDB` storage layer for agora.
//!
//! This crate is the persistence port of the real-time actor: the [`Store`]
//! trait describes every read and write the actor performs, and
//! [`RocksStore`] implements it on top of `RocksDB` column families with
//! CBOR-encoded values.
//!
//! # Architecture
//!
//! - `rooms` / `rooms_by_org`: rooms and their organization index
//! - `members` / `memberships`: room members, indexed both ways
//! - `messages` / `messages_by_thread`: messages and a per-room, per-thread
//!   ordered index
//! - `agents`: agent profiles
//! - `workflows` / `workflows_by_org` / `workflows_by_room`: workflows
//! - `meta`: the message id sequence
//!
//! # Example
//!
//! ```no_run
//! use agora_store::{MessageQuery, RocksStore, Store};
//! use agora_core::RoomId;
//!
//! let store = RocksStore::open("/tmp/agora-db").unwrap();
//!
//! // Latest top-level messages of a room
//! let room_id = RoomId::generate();
//! let messages = store
//!     .get_chat_room_messages(&room_id, None, MessageQuery::latest(50))
//!     .unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{
    Agent, ChatRoom, ChatRoomMember, ChatRoomMessage, MemberRole, MemberType, Mention,
    MessageMetadata, MessagePatch, MessageQuery, NewChatRoomMessage, OptimisticData, RoomType,
    ThreadMetadata, ToolUse, ToolUseKind, Workflow, WorkflowPatch, WorkflowStep,
};

use agora_core::{AgentId, MemberId, MessageId, OrganizationId, RoomId, WorkflowId};
use chrono::{DateTime, Utc};

/// The storage trait defining all database operations.
///
/// The actor relies on being the only writer for its organization, so
/// implementations only need to make each individual call atomic.
pub trait Store: Send + Sync {
    // =========================================================================
    // Room Operations
    // =========================================================================

    /// Insert or update a room.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_chat_room(&self, room: &ChatRoom) -> Result<()>;

    /// Get a room by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_chat_room(&self, room_id: &RoomId) -> Result<Option<ChatRoom>>;

    /// List all rooms of an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_chat_rooms_by_org(&self, org_id: &OrganizationId) -> Result<Vec<ChatRoom>>;

    /// List the rooms a member belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_chat_rooms_by_member(&self, member_id: &MemberId) -> Result<Vec<ChatRoom>>;

    // =========================================================================
    // Member Operations
    // =========================================================================

    /// Insert or update a room member.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_chat_room_member(&self, member: &ChatRoomMember) -> Result<()>;

    /// Get one member of a room.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_chat_room_member(
        &self,
        room_id: &RoomId,
        member_id: &MemberId,
    ) -> Result<Option<ChatRoomMember>>;

    /// List the members of a room, optionally only those of one type.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_chat_room_members(
        &self,
        room_id: &RoomId,
        member_type: Option<MemberType>,
    ) -> Result<Vec<ChatRoomMember>>;

    /// Remove a member from a room.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the membership doesn't exist.
    fn delete_chat_room_member(&self, room_id: &RoomId, member_id: &MemberId) -> Result<()>;

    // =========================================================================
    // Message Operations
    // =========================================================================

    /// Insert a message, assigning the next id from the sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_chat_room_message(&self, message: NewChatRoomMessage) -> Result<ChatRoomMessage>;

    /// Apply a patch to an existing message. The id never changes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the message doesn't exist.
    fn update_chat_room_message(
        &self,
        message_id: MessageId,
        patch: MessagePatch,
    ) -> Result<ChatRoomMessage>;

    /// Record a new reply on a thread root: increments the reply count and
    /// replaces the last message, in one atomic step.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the root doesn't exist.
    fn update_thread_metadata(
        &self,
        root_id: MessageId,
        reply: &ChatRoomMessage,
    ) -> Result<ChatRoomMessage>;

    /// Replace the root's last-message snapshot with an edited reply, if
    /// that reply is still the thread's latest. Returns the updated root,
    /// or `None` when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn refresh_thread_last_message(
        &self,
        reply: &ChatRoomMessage,
    ) -> Result<Option<ChatRoomMessage>>;

    /// Get a message by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_chat_room_message(&self, message_id: MessageId) -> Result<Option<ChatRoomMessage>>;

    /// List messages of a room's top level (`thread_id = None`) or of one
    /// thread, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_chat_room_messages(
        &self,
        room_id: &RoomId,
        thread_id: Option<MessageId>,
        query: MessageQuery,
    ) -> Result<Vec<ChatRoomMessage>>;

    // =========================================================================
    // Agent Operations
    // =========================================================================

    /// Insert or update an agent profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_agent(&self, agent: &Agent) -> Result<()>;

    /// Get an agent by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_agent_by_id(&self, agent_id: &AgentId) -> Result<Option<Agent>>;

    /// Get several agents; unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_agents_by_ids(&self, agent_ids: &[AgentId]) -> Result<Vec<Agent>>;

    // =========================================================================
    // Workflow Operations
    // =========================================================================

    /// Insert or update a workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_workflow(&self, workflow: &Workflow) -> Result<()>;

    /// Get a workflow by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<Workflow>>;

    /// List all workflows of a room.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_workflows_by_room(&self, room_id: &RoomId) -> Result<Vec<Workflow>>;

    /// List the active workflows of an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_active_workflows(&self, org_id: &OrganizationId) -> Result<Vec<Workflow>>;

    /// List the organizations that have at least one active workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_organizations_with_active_workflows(&self) -> Result<Vec<OrganizationId>>;

    /// Active workflows of an organization whose next execution is at or
    /// before `now`, ordered by due time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_due_workflows(&self, org_id: &OrganizationId, now: DateTime<Utc>)
        -> Result<Vec<Workflow>>;

    /// Apply the scheduler-owned fields of a patch.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the workflow doesn't exist.
    fn update_workflow(&self, workflow_id: &WorkflowId, patch: WorkflowPatch) -> Result<Workflow>;

    /// Delete a workflow.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the workflow doesn't exist.
    fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<()>;
}
