//! Room administration and membership checks.

use agora_core::{MemberId, RoomId, UserId};
use agora_store::{ChatRoom, ChatRoomMember, MemberRole, MemberType, Store, StoreError};
use chrono::{DateTime, Utc};

use crate::actor::OrgActor;
use crate::error::{ActorError, Result};
use crate::protocol::ServerMessage;
use crate::types::{CreateChatRoomRequest, NewMember};

impl<S: Store + 'static> OrgActor<S> {
    /// Load a room of this organization.
    pub(crate) fn room(&self, room_id: &RoomId) -> Result<ChatRoom> {
        self.store
            .get_chat_room(room_id)?
            .filter(|room| room.organization_id == self.org_id)
            .ok_or(ActorError::RoomNotFound(*room_id))
    }

    /// Load a room the user belongs to.
    pub(crate) fn room_for_user(&self, room_id: &RoomId, user_id: UserId) -> Result<ChatRoom> {
        let room = self.room(room_id)?;
        let member_id = MemberId::from(user_id);
        if self.store.get_chat_room_member(room_id, &member_id)?.is_none() {
            return Err(ActorError::MemberNotFound {
                room_id: *room_id,
                member_id,
            });
        }
        Ok(room)
    }

    /// The user's rooms in this organization.
    pub(crate) fn rooms_of_user(&self, user_id: UserId) -> Result<Vec<ChatRoom>> {
        let mut rooms = self.store.list_chat_rooms_by_member(&user_id.into())?;
        rooms.retain(|room| room.organization_id == self.org_id);
        Ok(rooms)
    }

    /// Create a room with its creator as owner.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::AgentConfigNotFound` if the creator is an agent
    /// without a profile.
    pub fn create_chat_room(
        &mut self,
        request: CreateChatRoomRequest,
        now: DateTime<Utc>,
    ) -> Result<ChatRoom> {
        let room = ChatRoom {
            id: RoomId::generate(),
            name: request.name,
            room_type: request.room_type,
            organization_id: self.org_id,
            created_at: now,
        };
        let mut creator = request.creator;
        creator.role = MemberRole::Owner;
        let owner = self.build_member(room.id, creator)?;

        self.store.put_chat_room(&room)?;
        self.store.put_chat_room_member(&owner)?;

        tracing::info!(
            org_id = %self.org_id,
            room_id = %room.id,
            name = %room.name,
            "Chat room created"
        );

        self.notify_room_list(&owner)?;
        Ok(room)
    }

    /// Add a member to a room.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::RoomNotFound` if the room is not in this
    /// organization, `ActorError::AgentConfigNotFound` for an agent without a
    /// profile.
    pub fn add_chat_room_member(
        &mut self,
        room_id: &RoomId,
        member: NewMember,
    ) -> Result<ChatRoomMember> {
        self.room(room_id)?;
        let member = self.build_member(*room_id, member)?;
        self.store.put_chat_room_member(&member)?;

        tracing::info!(
            org_id = %self.org_id,
            room_id = %room_id,
            member_id = %member.member_id,
            member_type = ?member.member_type,
            "Member added"
        );

        self.broadcast_members(room_id)?;
        self.notify_room_list(&member)?;
        Ok(member)
    }

    /// Remove a member from a room.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::RoomNotFound` if the room is not in this
    /// organization, `ActorError::MemberNotFound` if the member is not in it.
    pub fn delete_chat_room_member(&mut self, room_id: &RoomId, member_id: &MemberId) -> Result<()> {
        self.room(room_id)?;
        let member = self
            .store
            .get_chat_room_member(room_id, member_id)?
            .ok_or(ActorError::MemberNotFound {
                room_id: *room_id,
                member_id: *member_id,
            })?;

        self.store
            .delete_chat_room_member(room_id, member_id)
            .map_err(|e| match e {
                StoreError::NotFound => ActorError::MemberNotFound {
                    room_id: *room_id,
                    member_id: *member_id,
                },
                other => ActorError::Store(other),
            })?;

        tracing::info!(
            org_id = %self.org_id,
            room_id = %room_id,
            member_id = %member_id,
            "Member removed"
        );

        self.broadcast_members(room_id)?;
        self.notify_room_list(&member)?;
        Ok(())
    }

    fn build_member(&self, room_id: RoomId, member: NewMember) -> Result<ChatRoomMember> {
        let name = match member.member_type {
            MemberType::Agent => {
                let agent_id = member.id.as_agent();
                let profile = self
                    .store
                    .get_agent_by_id(&agent_id)?
                    .filter(|agent| agent.organization_id == self.org_id)
                    .ok_or(ActorError::AgentConfigNotFound(agent_id))?;
                member.name.unwrap_or(profile.name)
            }
            MemberType::User => member.name.unwrap_or_else(|| member.id.to_string()),
        };

        Ok(ChatRoomMember {
            room_id,
            member_id: member.id,
            member_type: member.member_type,
            role: member.role,
            name,
            email: member.email,
            image: member.image,
        })
    }

    fn broadcast_members(&self, room_id: &RoomId) -> Result<()> {
        let members = self.store.get_chat_room_members(room_id, None)?;
        self.sessions.broadcast_to_room(
            room_id,
            &ServerMessage::ChatRoomMembersUpdate {
                room_id: *room_id,
                members,
            },
            None,
        );
        Ok(())
    }

    /// Push a fresh room list to a user whose memberships changed.
    fn notify_room_list(&self, member: &ChatRoomMember) -> Result<()> {
        if member.member_type != MemberType::User {
            return Ok(());
        }
        let user_id = member.member_id.as_user();
        let chat_rooms = self.rooms_of_user(user_id)?;
        self.sessions
            .send_to_user(&user_id, &ServerMessage::ChatRoomsUpdate { chat_rooms });
        Ok(())
    }
}
