//! WebSocket protocol.
//!
//! Every frame is a JSON object discriminated by its `type` field. Inbound
//! frames decode to [`ClientMessage`]; unknown types are rejected with an
//! `error` frame instead of being ignored.

use agora_core::{MessageId, RoomId};
use agora_store::{
    ChatRoom, ChatRoomMember, ChatRoomMessage, Mention, MessageMetadata, OptimisticData, ToolUse,
    Workflow,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ActorError, Result};

/// A frame sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// List the rooms the user belongs to.
    UserInitRequest,
    /// Open a room.
    ChatRoomInitRequest {
        /// Room to open.
        room_id: RoomId,
    },
    /// Open a thread.
    ChatRoomThreadInitRequest {
        /// Room of the thread.
        room_id: RoomId,
        /// Root message of the thread.
        thread_id: MessageId,
    },
    /// Post a message.
    ChatRoomMessageSend {
        /// Target room.
        room_id: RoomId,
        /// Thread root, `None` for the top level.
        #[serde(default)]
        thread_id: Option<MessageId>,
        /// The message as the client rendered it.
        message: ClientChatMessage,
    },
    /// Fetch a page of older messages.
    ChatRoomMessagesRequest {
        /// Room to page through.
        room_id: RoomId,
        /// Thread root, `None` for the top level.
        #[serde(default)]
        thread_id: Option<MessageId>,
        /// Only messages older than this one.
        #[serde(default)]
        before_id: Option<MessageId>,
    },
}

impl ClientMessage {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::InvalidFrame` for malformed JSON, missing fields
    /// or an unknown `type`.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ActorError::InvalidFrame(e.to_string()))
    }
}

/// A message as sent by a client, before the server assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientChatMessage {
    /// Client-side optimistic id.
    pub id: String,
    /// Text content.
    #[serde(default)]
    pub content: String,
    /// Members referenced by the message.
    #[serde(default)]
    pub mentions: Vec<Mention>,
    /// Tool uses, normally empty for people.
    #[serde(default)]
    pub tool_uses: Vec<ToolUse>,
    /// When the client rendered the message.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ClientChatMessage {
    /// Metadata echoing the optimistic identity back to the client.
    #[must_use]
    pub fn metadata(&self, now: DateTime<Utc>) -> MessageMetadata {
        MessageMetadata {
            optimistic_data: Some(OptimisticData {
                id: self.id.clone(),
                created_at: self.created_at.unwrap_or(now),
            }),
        }
    }
}

/// A frame sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Rooms of the user, answering `user-init-request`.
    UserInitResponse {
        /// The user's rooms.
        chat_rooms: Vec<ChatRoom>,
    },
    /// The user's room list changed.
    ChatRoomsUpdate {
        /// The user's rooms.
        chat_rooms: Vec<ChatRoom>,
    },
    /// Room snapshot, answering `chat-room-init-request`.
    ChatRoomInitResponse {
        /// The room id.
        room_id: RoomId,
        /// The room.
        room: ChatRoom,
        /// Its members.
        members: Vec<ChatRoomMember>,
        /// The latest top-level messages, oldest first.
        messages: Vec<ChatRoomMessage>,
        /// Its workflows.
        workflows: Vec<Workflow>,
    },
    /// Thread snapshot, answering `chat-room-thread-init-request`.
    ChatRoomThreadInitResponse {
        /// The room id.
        room_id: RoomId,
        /// The thread root id.
        thread_id: MessageId,
        /// The thread root.
        root: ChatRoomMessage,
        /// The latest replies, oldest first.
        messages: Vec<ChatRoomMessage>,
    },
    /// A page of history, answering `chat-room-messages-request`.
    ChatRoomMessagesResponse {
        /// The room id.
        room_id: RoomId,
        /// The thread root id, `None` for the top level.
        thread_id: Option<MessageId>,
        /// The page, oldest first.
        messages: Vec<ChatRoomMessage>,
    },
    /// A message was created or changed.
    ChatRoomMessageBroadcast {
        /// The room id.
        room_id: RoomId,
        /// The thread the message belongs to.
        thread_id: Option<MessageId>,
        /// The persisted message.
        message: ChatRoomMessage,
    },
    /// The room's member list changed.
    ChatRoomMembersUpdate {
        /// The room id.
        room_id: RoomId,
        /// All members.
        members: Vec<ChatRoomMember>,
    },
    /// The room's workflows changed.
    ChatRoomWorkflowsUpdate {
        /// The room id.
        room_id: RoomId,
        /// All workflows of the room.
        workflows: Vec<Workflow>,
    },
    /// A request from this socket failed.
    Error {
        /// Human-readable description.
        error: String,
    },
}

impl ServerMessage {
    /// The broadcast for a persisted message.
    #[must_use]
    pub fn broadcast(message: &ChatRoomMessage) -> Self {
        Self::ChatRoomMessageBroadcast {
            room_id: message.room_id,
            thread_id: message.thread_id,
            message: message.clone(),
        }
    }

    /// An error frame.
    #[must_use]
    pub fn error(error: &ActorError) -> Self {
        Self::Error {
            error: error.to_string(),
        }
    }

    /// The wire form of this frame.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::Internal` if serialization fails.
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ActorError::Internal(e.to_string()))
    }
}
