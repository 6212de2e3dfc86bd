//! Domain types stored in the database.
//!
//! These types are the persisted state of rooms, members, messages, agents and
//! workflows. They serialize as camelCase so the same values can be sent over
//! the WebSocket protocol without a second set of view types.

use agora_core::{AgentId, MemberId, MessageId, OrganizationId, RoomId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A chat room owned by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    /// Unique identifier for the room.
    pub id: RoomId,
    /// Human-readable name.
    pub name: String,
    /// Visibility of the room.
    #[serde(rename = "type")]
    pub room_type: RoomType,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Visibility of a chat room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    /// Listed for everyone in the organization.
    #[default]
    Public,
    /// Visible to its members only.
    Private,
    /// One-to-one conversation.
    Direct,
}

impl RoomType {
    /// The wire name of this room type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Direct => "direct",
        }
    }
}

/// A participant of a chat room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoomMember {
    /// Room this membership belongs to.
    pub room_id: RoomId,
    /// The user or agent id of the participant.
    #[serde(rename = "id")]
    pub member_id: MemberId,
    /// Whether the participant is a human or an agent.
    #[serde(rename = "type")]
    pub member_type: MemberType,
    /// Permissions within the room.
    pub role: MemberRole,
    /// Display name.
    pub name: String,
    /// Contact email, users only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Kind of room participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MemberType {
    /// A human user.
    User = 1,
    /// An AI agent.
    Agent = 2,
}

/// Permissions of a member within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    /// Regular participant.
    #[default]
    Member,
    /// Can manage members.
    Admin,
    /// Created the room.
    Owner,
}

/// A reference to a member inside a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    /// The mentioned member.
    pub id: MemberId,
    /// Display name at the time of mentioning.
    pub name: String,
}

/// Whether a tool use has only been requested or has also produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ToolUseKind {
    /// The model requested the call.
    #[default]
    ToolCall,
    /// The call finished and `result` is populated.
    ToolResult,
}

/// A model-invoked tool call and its eventual result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUse {
    /// Model-assigned call id; the key used to merge stream events.
    pub tool_call_id: String,
    /// Name of the invoked tool. Empty for placeholders created from an
    /// annotation that arrived before its call.
    #[serde(default)]
    pub tool_name: String,
    /// Progress of the call.
    #[serde(rename = "type", default)]
    pub kind: ToolUseKind,
    /// Arguments the model passed.
    #[serde(default)]
    pub args: Value,
    /// Result once available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Annotations streamed alongside the call.
    #[serde(default)]
    pub annotations: Vec<Value>,
}

impl ToolUse {
    /// A fresh tool call with no result or annotations yet.
    #[must_use]
    pub fn call(tool_call_id: impl Into<String>, tool_name: impl Into<String>, args: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            kind: ToolUseKind::ToolCall,
            args,
            result: None,
            annotations: Vec::new(),
        }
    }
}

/// Aggregate state kept on a thread root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMetadata {
    /// The most recently persisted reply.
    pub last_message: Box<ChatRoomMessage>,
    /// Number of persisted replies.
    pub message_count: u32,
}

/// Client-chosen identity of a message, echoed back for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticData {
    /// Id the client rendered the message under.
    pub id: String,
    /// Timestamp the client rendered the message with.
    pub created_at: DateTime<Utc>,
}

/// Free-form message metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Present on messages sent by a client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimistic_data: Option<OptimisticData>,
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoomMessage {
    /// Server-assigned id. Never changes.
    pub id: MessageId,
    /// Room the message was posted in.
    pub room_id: RoomId,
    /// Author.
    pub member_id: MemberId,
    /// Text content.
    pub content: String,
    /// Members referenced by the message.
    #[serde(default)]
    pub mentions: Vec<Mention>,
    /// Tool calls made while producing the message, in order.
    #[serde(default)]
    pub tool_uses: Vec<ToolUse>,
    /// Thread root, `None` for top-level messages.
    pub thread_id: Option<MessageId>,
    /// Reply aggregate, only on thread roots that have replies.
    #[serde(default)]
    pub thread_metadata: Option<ThreadMetadata>,
    /// Reconciliation data.
    #[serde(default)]
    pub metadata: MessageMetadata,
    /// Server timestamp of the insert.
    pub created_at: DateTime<Utc>,
}

/// A message about to be inserted. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChatRoomMessage {
    /// Room the message is posted in.
    pub room_id: RoomId,
    /// Author.
    pub member_id: MemberId,
    /// Text content.
    pub content: String,
    /// Members referenced by the message.
    pub mentions: Vec<Mention>,
    /// Tool calls made so far.
    pub tool_uses: Vec<ToolUse>,
    /// Thread root, `None` for top-level messages.
    pub thread_id: Option<MessageId>,
    /// Reconciliation data.
    pub metadata: MessageMetadata,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
}

/// The mutable part of a message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessagePatch {
    /// Replacement content.
    pub content: Option<String>,
    /// Replacement mentions.
    pub mentions: Option<Vec<Mention>>,
    /// Replacement tool uses.
    pub tool_uses: Option<Vec<ToolUse>>,
}

/// Paging options for message listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageQuery {
    /// Return at most this many of the newest matching messages.
    pub limit: Option<usize>,
    /// Only return messages older than this id.
    pub before: Option<MessageId>,
}

impl MessageQuery {
    /// The newest `limit` messages.
    #[must_use]
    pub const fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            before: None,
        }
    }
}

/// An agent profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Unique identifier for the agent.
    pub id: AgentId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Display name.
    pub name: String,
    /// What the agent is good at; shown to the router.
    #[serde(default)]
    pub description: Option<String>,
    /// Persona: tone of voice.
    #[serde(default)]
    pub tone: Option<String>,
    /// Persona: how much the agent writes.
    #[serde(default)]
    pub verbosity: Option<String>,
    /// Persona: emoji habits.
    #[serde(default)]
    pub emoji_usage: Option<String>,
    /// Persona: register and vocabulary.
    #[serde(default)]
    pub language_style: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One step of a workflow plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// What to do.
    pub description: String,
    /// Tool the step is expected to use, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

/// A scheduled agent task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique identifier for the workflow.
    pub id: WorkflowId,
    /// Organization of the room, denormalized for per-actor queries.
    pub organization_id: OrganizationId,
    /// Room the agent posts into.
    pub chat_room_id: RoomId,
    /// Agent that executes the workflow.
    pub agent_id: AgentId,
    /// What the run should achieve.
    pub goal: String,
    /// Ordered plan.
    pub steps: Vec<WorkflowStep>,
    /// A 5-field cron expression or an absolute timestamp.
    pub schedule_expression: String,
    /// True for cron schedules.
    pub is_recurring: bool,
    /// When the workflow is due next.
    pub next_execution_time: DateTime<Utc>,
    /// When the workflow last ran, successfully or not.
    pub last_execution_time: Option<DateTime<Utc>>,
    /// Inactive workflows are never executed.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Scheduler-owned fields of a workflow.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkflowPatch {
    /// New due time.
    pub next_execution_time: Option<DateTime<Utc>>,
    /// New last-run stamp.
    pub last_execution_time: Option<DateTime<Utc>>,
    /// New activity flag.
    pub is_active: Option<bool>,
}
