//! Message pipeline.
//!
//! Every message write, from people and agents alike, goes through
//! [`OrgActor::receive_message`]: persist, maintain the thread root, broadcast,
//! and queue agent routing when asked.

use agora_core::{MemberId, MessageId, RoomId};
use agora_store::{
    ChatRoomMessage, Mention, MessageMetadata, MessagePatch, NewChatRoomMessage, Store,
    StoreError, ToolUse,
};
use chrono::{DateTime, Utc};

use crate::actor::OrgActor;
use crate::error::{ActorError, Result};
use crate::protocol::{ClientChatMessage, ServerMessage};

/// The writable part of a message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageDraft {
    /// Text content.
    pub content: String,
    /// Members referenced by the message.
    pub mentions: Vec<Mention>,
    /// Tool uses so far.
    pub tool_uses: Vec<ToolUse>,
    /// Thread root for inserts. Ignored on update.
    pub thread_id: Option<MessageId>,
    /// Reconciliation data for inserts.
    pub metadata: MessageMetadata,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
}

impl MessageDraft {
    /// A draft from a client frame, echoing its optimistic identity.
    #[must_use]
    pub fn from_client(
        message: ClientChatMessage,
        thread_id: Option<MessageId>,
        now: DateTime<Utc>,
    ) -> Self {
        let metadata = message.metadata(now);
        Self {
            content: message.content,
            mentions: message.mentions,
            tool_uses: message.tool_uses,
            thread_id,
            metadata,
            created_at: now,
        }
    }

    /// A plain text draft.
    #[must_use]
    pub fn text(content: impl Into<String>, thread_id: Option<MessageId>, now: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            thread_id,
            created_at: now,
            ..Self::default()
        }
    }
}

/// A message waiting for agent routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingJob {
    /// Room of the message.
    pub room_id: RoomId,
    /// Thread of the message.
    pub thread_id: Option<MessageId>,
    /// The message to route.
    pub message_id: MessageId,
}

impl<S: Store + 'static> OrgActor<S> {
    /// Persist and broadcast a message.
    ///
    /// With `existing` set, the message is updated in place and keeps its id;
    /// if it is its thread's latest reply, the root's snapshot follows.
    /// Otherwise a new message is inserted; thread replies also bump the
    /// root's reply aggregate. Fresh inserts with `notify_agents` set are
    /// queued for routing once the current handler completes.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::MessageNotFound` for an unknown `existing` id,
    /// `ActorError::ThreadRootNotFound` if the thread root is missing, lives
    /// in another room or is itself a reply.
    pub fn receive_message(
        &mut self,
        member_id: MemberId,
        room_id: RoomId,
        draft: MessageDraft,
        existing: Option<MessageId>,
        notify_agents: bool,
    ) -> Result<ChatRoomMessage> {
        if let Some(message_id) = existing {
            let patch = MessagePatch {
                content: Some(draft.content),
                mentions: Some(draft.mentions),
                tool_uses: Some(draft.tool_uses),
            };
            let message = self
                .store
                .update_chat_room_message(message_id, patch)
                .map_err(|e| match e {
                    StoreError::NotFound => ActorError::MessageNotFound(message_id),
                    other => ActorError::Store(other),
                })?;

            if let Some(root) = self.store.refresh_thread_last_message(&message)? {
                self.sessions
                    .broadcast_to_room(&root.room_id, &ServerMessage::broadcast(&root), None);
            }
            self.sessions
                .broadcast_to_room(&message.room_id, &ServerMessage::broadcast(&message), None);
            return Ok(message);
        }

        if let Some(root_id) = draft.thread_id {
            self.thread_root(&room_id, root_id)?;
        }

        let message = self.store.insert_chat_room_message(NewChatRoomMessage {
            room_id,
            member_id,
            content: draft.content,
            mentions: draft.mentions,
            tool_uses: draft.tool_uses,
            thread_id: draft.thread_id,
            metadata: draft.metadata,
            created_at: draft.created_at,
        })?;

        tracing::debug!(
            org_id = %self.org_id,
            room_id = %room_id,
            message_id = %message.id,
            thread_id = ?message.thread_id,
            "Message inserted"
        );

        if let Some(root_id) = message.thread_id {
            let root = self.store.update_thread_metadata(root_id, &message)?;
            self.sessions
                .broadcast_to_room(&room_id, &ServerMessage::broadcast(&root), None);
        }

        self.sessions
            .broadcast_to_room(&room_id, &ServerMessage::broadcast(&message), None);

        if notify_agents {
            self.deferred.push_back(RoutingJob {
                room_id,
                thread_id: message.thread_id,
                message_id: message.id,
            });
        }

        Ok(message)
    }

    /// Load a top-level message of the room to use as a thread root.
    pub(crate) fn thread_root(&self, room_id: &RoomId, root_id: MessageId) -> Result<ChatRoomMessage> {
        self.store
            .get_chat_room_message(root_id)?
            .filter(|root| root.room_id == *room_id && root.thread_id.is_none())
            .ok_or(ActorError::ThreadRootNotFound(root_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, harness, Harness};
    use agora_core::UserId;
    use agora_store::MessageQuery;

    #[tokio::test]
    async fn top_level_message_reaches_every_session() {
        let Harness {
            mut actor,
            room,
            user,
            _dir,
            ..
        } = harness();
        let (_a, mut rx_a) = actor.connect_test(user);
        let (_b, mut rx_b) = actor.connect_test(UserId::generate());

        let message = actor
            .receive_message(
                user.into(),
                room.id,
                MessageDraft::text("hello", None, Utc::now()),
                None,
                false,
            )
            .unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let frames = drain(rx);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0]["type"], "chat-room-message-broadcast");
            assert_eq!(frames[0]["message"]["id"], message.id.get());
        }
    }

    #[tokio::test]
    async fn thread_reply_updates_root_aggregate() {
        let Harness {
            mut actor,
            room,
            user,
            _dir,
            ..
        } = harness();
        let (_conn, mut rx) = actor.connect_test(user);

        let root = actor
            .receive_message(user.into(), room.id, MessageDraft::text("root", None, Utc::now()), None, false)
            .unwrap();
        let reply = actor
            .receive_message(
                user.into(),
                room.id,
                MessageDraft::text("reply", Some(root.id), Utc::now()),
                None,
                false,
            )
            .unwrap();

        let stored = actor.store.get_chat_room_message(root.id).unwrap().unwrap();
        let meta = stored.thread_metadata.unwrap();
        assert_eq!(meta.message_count, 1);
        assert_eq!(meta.last_message.id, reply.id);

        let frames = drain(&mut rx);
        // root insert, updated root, reply
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1]["message"]["id"], root.id.get());
        assert_eq!(frames[1]["message"]["threadMetadata"]["messageCount"], 1);
        assert_eq!(frames[2]["threadId"], root.id.get());
    }

    #[tokio::test]
    async fn update_keeps_id_and_does_not_count_as_reply() {
        let Harness {
            mut actor,
            room,
            user,
            _dir,
            ..
        } = harness();

        let root = actor
            .receive_message(user.into(), room.id, MessageDraft::text("root", None, Utc::now()), None, false)
            .unwrap();
        let reply = actor
            .receive_message(
                user.into(),
                room.id,
                MessageDraft::text("dra", Some(root.id), Utc::now()),
                None,
                false,
            )
            .unwrap();
        let updated = actor
            .receive_message(
                user.into(),
                room.id,
                MessageDraft::text("draft", Some(root.id), Utc::now()),
                Some(reply.id),
                false,
            )
            .unwrap();

        assert_eq!(updated.id, reply.id);
        assert_eq!(updated.content, "draft");
        let replies = actor
            .store
            .get_chat_room_messages(&room.id, Some(root.id), MessageQuery::default())
            .unwrap();
        assert_eq!(replies.len(), 1);
        let meta = actor
            .store
            .get_chat_room_message(root.id)
            .unwrap()
            .unwrap()
            .thread_metadata
            .unwrap();
        assert_eq!(meta.message_count, 1);
    }

    #[tokio::test]
    async fn updating_latest_reply_refreshes_root_snapshot() {
        let Harness {
            mut actor,
            room,
            user,
            _dir,
            ..
        } = harness();

        let root = actor
            .receive_message(user.into(), room.id, MessageDraft::text("root", None, Utc::now()), None, false)
            .unwrap();
        let reply = actor
            .receive_message(
                user.into(),
                room.id,
                MessageDraft::text("Look", Some(root.id), Utc::now()),
                None,
                false,
            )
            .unwrap();
        let (_conn, mut rx) = actor.connect_test(user);

        actor
            .receive_message(
                user.into(),
                room.id,
                MessageDraft::text("Looking into it", Some(root.id), Utc::now()),
                Some(reply.id),
                false,
            )
            .unwrap();

        let meta = actor
            .store
            .get_chat_room_message(root.id)
            .unwrap()
            .unwrap()
            .thread_metadata
            .unwrap();
        assert_eq!(meta.last_message.content, "Looking into it");
        assert_eq!(meta.message_count, 1);

        let frames = drain(&mut rx);
        // refreshed root, then the reply
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["message"]["id"], root.id.get());
        assert_eq!(
            frames[0]["message"]["threadMetadata"]["lastMessage"]["content"],
            "Looking into it"
        );
        assert_eq!(frames[1]["message"]["id"], reply.id.get());
    }

    #[tokio::test]
    async fn unknown_existing_id_is_rejected() {
        let Harness {
            mut actor,
            room,
            user,
            _dir,
            ..
        } = harness();
        let err = actor
            .receive_message(
                user.into(),
                room.id,
                MessageDraft::text("x", None, Utc::now()),
                Some(MessageId::new(999)),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, ActorError::MessageNotFound(_)));
    }

    #[tokio::test]
    async fn reply_to_missing_or_nested_root_is_rejected() {
        let Harness {
            mut actor,
            room,
            user,
            _dir,
            ..
        } = harness();

        let err = actor
            .receive_message(
                user.into(),
                room.id,
                MessageDraft::text("x", Some(MessageId::new(42)), Utc::now()),
                None,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, ActorError::ThreadRootNotFound(_)));

        let root = actor
            .receive_message(user.into(), room.id, MessageDraft::text("root", None, Utc::now()), None, false)
            .unwrap();
        let reply = actor
            .receive_message(
                user.into(),
                room.id,
                MessageDraft::text("reply", Some(root.id), Utc::now()),
                None,
                false,
            )
            .unwrap();
        let err = actor
            .receive_message(
                user.into(),
                room.id,
                MessageDraft::text("nested", Some(reply.id), Utc::now()),
                None,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, ActorError::ThreadRootNotFound(id) if id == reply.id));
    }

    #[tokio::test]
    async fn only_fresh_inserts_are_routed() {
        let Harness {
            mut actor,
            room,
            user,
            _dir,
            ..
        } = harness();

        let message = actor
            .receive_message(user.into(), room.id, MessageDraft::text("hi", None, Utc::now()), None, true)
            .unwrap();
        actor
            .receive_message(
                user.into(),
                room.id,
                MessageDraft::text("hi!", None, Utc::now()),
                Some(message.id),
                true,
            )
            .unwrap();

        assert_eq!(actor.deferred.len(), 1);
        assert_eq!(actor.deferred[0].message_id, message.id);
    }
}
