//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use agora_core::{AgentId, MemberId, MessageId, OrganizationId, RoomId, WorkflowId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf, MESSAGE_SEQUENCE_KEY};
use crate::types::{
    Agent, ChatRoom, ChatRoomMember, ChatRoomMessage, MemberType, MessagePatch, MessageQuery,
    NewChatRoomMessage, ThreadMetadata, Workflow, WorkflowPatch,
};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Last assigned message id. Also serializes read-modify-write cycles on
    /// message records.
    sequence: Mutex<u64>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self {
            db: Arc::new(db),
            sequence: Mutex::new(0),
        };
        let last = store.load_sequence()?;
        *store.sequence.lock() = last;

        tracing::debug!(last_message_id = last, "Opened store");
        Ok(store)
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::MissingColumnFamily(name.to_string()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Read a single CBOR value.
    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Collect every key under `prefix` in a column family.
    fn scan_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut found = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            // Stop if we're past the prefix
            if !key.starts_with(prefix) {
                break;
            }
            found.push(key);
        }
        Ok(found)
    }

    fn load_sequence(&self) -> Result<u64> {
        let cf = self.cf(cf::META)?;
        let Some(raw) = self
            .db
            .get_cf(&cf, MESSAGE_SEQUENCE_KEY)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(0);
        };

        let bytes: [u8; 8] = raw
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::CorruptSequence { len: raw.len() })?;
        Ok(u64::from_be_bytes(bytes))
    }

    fn put_message(&self, message: &ChatRoomMessage) -> Result<()> {
        let cf = self.cf(cf::MESSAGES)?;
        let value = Self::serialize(message)?;
        self.db
            .put_cf(&cf, keys::message_key(message.id), value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn workflows_under(&self, cf_name: &str, owner: &[u8; 16]) -> Result<Vec<Workflow>> {
        let mut workflows = Vec::new();
        for key in self.scan_keys(cf_name, owner)? {
            let workflow_id = WorkflowId::from_bytes(keys::second_uuid(&key));
            if let Some(workflow) = self.get_workflow(&workflow_id)? {
                workflows.push(workflow);
            }
        }
        Ok(workflows)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Room Operations
    // =========================================================================

    fn put_chat_room(&self, room: &ChatRoom) -> Result<()> {
        let cf_rooms = self.cf(cf::ROOMS)?;
        let cf_by_org = self.cf(cf::ROOMS_BY_ORG)?;

        let value = Self::serialize(room)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_rooms, keys::room_key(&room.id), &value);
        batch.put_cf(
            &cf_by_org,
            keys::org_room_key(&room.organization_id, &room.id),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_chat_room(&self, room_id: &RoomId) -> Result<Option<ChatRoom>> {
        self.get_value(cf::ROOMS, &keys::room_key(room_id))
    }

    fn list_chat_rooms_by_org(&self, org_id: &OrganizationId) -> Result<Vec<ChatRoom>> {
        let mut rooms = Vec::new();
        for key in self.scan_keys(cf::ROOMS_BY_ORG, &keys::org_prefix(org_id))? {
            let room_id = RoomId::from_bytes(keys::second_uuid(&key));
            if let Some(room) = self.get_chat_room(&room_id)? {
                rooms.push(room);
            }
        }
        Ok(rooms)
    }

    fn list_chat_rooms_by_member(&self, member_id: &MemberId) -> Result<Vec<ChatRoom>> {
        let mut rooms = Vec::new();
        for key in self.scan_keys(cf::MEMBERSHIPS, &keys::member_prefix(member_id))? {
            let room_id = RoomId::from_bytes(keys::second_uuid(&key));
            if let Some(room) = self.get_chat_room(&room_id)? {
                rooms.push(room);
            }
        }
        Ok(rooms)
    }

    // =========================================================================
    // Member Operations
    // =========================================================================

    fn put_chat_room_member(&self, member: &ChatRoomMember) -> Result<()> {
        let cf_members = self.cf(cf::MEMBERS)?;
        let cf_memberships = self.cf(cf::MEMBERSHIPS)?;

        let value = Self::serialize(member)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_members,
            keys::member_key(&member.room_id, &member.member_id),
            &value,
        );
        batch.put_cf(
            &cf_memberships,
            keys::membership_key(&member.member_id, &member.room_id),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_chat_room_member(
        &self,
        room_id: &RoomId,
        member_id: &MemberId,
    ) -> Result<Option<ChatRoomMember>> {
        self.get_value(cf::MEMBERS, &keys::member_key(room_id, member_id))
    }

    fn get_chat_room_members(
        &self,
        room_id: &RoomId,
        member_type: Option<MemberType>,
    ) -> Result<Vec<ChatRoomMember>> {
        let cf = self.cf(cf::MEMBERS)?;
        let prefix = keys::room_prefix(room_id);

        let mut members = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            let member: ChatRoomMember = Self::deserialize(&value)?;
            if member_type.map_or(true, |t| t == member.member_type) {
                members.push(member);
            }
        }

        Ok(members)
    }

    fn delete_chat_room_member(&self, room_id: &RoomId, member_id: &MemberId) -> Result<()> {
        let cf_members = self.cf(cf::MEMBERS)?;
        let cf_memberships = self.cf(cf::MEMBERSHIPS)?;

        if self.get_chat_room_member(room_id, member_id)?.is_none() {
            return Err(StoreError::NotFound);
        }

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_members, keys::member_key(room_id, member_id));
        batch.delete_cf(&cf_memberships, keys::membership_key(member_id, room_id));

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    // =========================================================================
    // Message Operations
    // =========================================================================

    fn insert_chat_room_message(&self, message: NewChatRoomMessage) -> Result<ChatRoomMessage> {
        let cf_messages = self.cf(cf::MESSAGES)?;
        let cf_by_thread = self.cf(cf::MESSAGES_BY_THREAD)?;
        let cf_meta = self.cf(cf::META)?;

        let mut sequence = self.sequence.lock();
        let next = *sequence + 1;
        let id = MessageId::new(next);

        let message = ChatRoomMessage {
            id,
            room_id: message.room_id,
            member_id: message.member_id,
            content: message.content,
            mentions: message.mentions,
            tool_uses: message.tool_uses,
            thread_id: message.thread_id,
            thread_metadata: None,
            metadata: message.metadata,
            created_at: message.created_at,
        };
        let value = Self::serialize(&message)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_messages, keys::message_key(id), &value);
        batch.put_cf(
            &cf_by_thread,
            keys::thread_message_key(&message.room_id, message.thread_id, id),
            [],
        );
        batch.put_cf(&cf_meta, MESSAGE_SEQUENCE_KEY, next.to_be_bytes());

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        *sequence = next;
        Ok(message)
    }

    fn update_chat_room_message(
        &self,
        message_id: MessageId,
        patch: MessagePatch,
    ) -> Result<ChatRoomMessage> {
        let _guard = self.sequence.lock();

        let mut message = self
            .get_chat_room_message(message_id)?
            .ok_or(StoreError::NotFound)?;

        if let Some(content) = patch.content {
            message.content = content;
        }
        if let Some(mentions) = patch.mentions {
            message.mentions = mentions;
        }
        if let Some(tool_uses) = patch.tool_uses {
            message.tool_uses = tool_uses;
        }

        self.put_message(&message)?;
        Ok(message)
    }

    fn update_thread_metadata(
        &self,
        root_id: MessageId,
        reply: &ChatRoomMessage,
    ) -> Result<ChatRoomMessage> {
        let _guard = self.sequence.lock();

        let mut root = self
            .get_chat_room_message(root_id)?
            .ok_or(StoreError::NotFound)?;

        let mut last = reply.clone();
        last.thread_metadata = None;

        let message_count = root
            .thread_metadata
            .as_ref()
            .map_or(0, |meta| meta.message_count)
            + 1;
        root.thread_metadata = Some(ThreadMetadata {
            last_message: Box::new(last),
            message_count,
        });

        self.put_message(&root)?;
        Ok(root)
    }

    fn refresh_thread_last_message(
        &self,
        reply: &ChatRoomMessage,
    ) -> Result<Option<ChatRoomMessage>> {
        let Some(root_id) = reply.thread_id else {
            return Ok(None);
        };
        let _guard = self.sequence.lock();

        let Some(mut root) = self.get_chat_room_message(root_id)? else {
            return Ok(None);
        };
        let Some(meta) = root.thread_metadata.as_mut() else {
            return Ok(None);
        };
        if meta.last_message.id != reply.id {
            return Ok(None);
        }

        let mut last = reply.clone();
        last.thread_metadata = None;
        meta.last_message = Box::new(last);

        self.put_message(&root)?;
        Ok(Some(root))
    }

    fn get_chat_room_message(&self, message_id: MessageId) -> Result<Option<ChatRoomMessage>> {
        self.get_value(cf::MESSAGES, &keys::message_key(message_id))
    }

    fn get_chat_room_messages(
        &self,
        room_id: &RoomId,
        thread_id: Option<MessageId>,
        query: MessageQuery,
    ) -> Result<Vec<ChatRoomMessage>> {
        let cf = self.cf(cf::MESSAGES_BY_THREAD)?;
        let prefix = keys::thread_prefix(room_id, thread_id);

        // Walk backwards from just below `before` so `limit` picks the newest.
        let upper = query
            .before
            .map_or(u64::MAX, |before| before.get().saturating_sub(1));
        if query.before.is_some() && upper == 0 {
            return Ok(Vec::new());
        }
        let start = keys::thread_message_key(room_id, thread_id, MessageId::new(upper));

        let limit = query.limit.unwrap_or(usize::MAX);
        let mut messages = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start, Direction::Reverse));

        for item in iter {
            if messages.len() >= limit {
                break;
            }

            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            let message_id = keys::extract_message_id_from_thread_key(&key);
            if let Some(message) = self.get_chat_room_message(message_id)? {
                messages.push(message);
            }
        }

        messages.reverse();
        Ok(messages)
    }

    // =========================================================================
    // Agent Operations
    // =========================================================================

    fn put_agent(&self, agent: &Agent) -> Result<()> {
        let cf = self.cf(cf::AGENTS)?;
        let value = Self::serialize(agent)?;

        self.db
            .put_cf(&cf, agent.id.as_bytes(), value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_agent_by_id(&self, agent_id: &AgentId) -> Result<Option<Agent>> {
        self.get_value(cf::AGENTS, agent_id.as_bytes())
    }

    fn get_agents_by_ids(&self, agent_ids: &[AgentId]) -> Result<Vec<Agent>> {
        let mut agents = Vec::with_capacity(agent_ids.len());
        for agent_id in agent_ids {
            if let Some(agent) = self.get_agent_by_id(agent_id)? {
                agents.push(agent);
            }
        }
        Ok(agents)
    }

    // =========================================================================
    // Workflow Operations
    // =========================================================================

    fn put_workflow(&self, workflow: &Workflow) -> Result<()> {
        let cf_workflows = self.cf(cf::WORKFLOWS)?;
        let cf_by_org = self.cf(cf::WORKFLOWS_BY_ORG)?;
        let cf_by_room = self.cf(cf::WORKFLOWS_BY_ROOM)?;

        let value = Self::serialize(workflow)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_workflows, keys::workflow_key(&workflow.id), &value);
        batch.put_cf(
            &cf_by_org,
            keys::owned_workflow_key(workflow.organization_id.as_bytes(), &workflow.id),
            [],
        );
        batch.put_cf(
            &cf_by_room,
            keys::owned_workflow_key(workflow.chat_room_id.as_bytes(), &workflow.id),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<Workflow>> {
        self.get_value(cf::WORKFLOWS, &keys::workflow_key(workflow_id))
    }

    fn list_workflows_by_room(&self, room_id: &RoomId) -> Result<Vec<Workflow>> {
        self.workflows_under(cf::WORKFLOWS_BY_ROOM, room_id.as_bytes())
    }

    fn list_active_workflows(&self, org_id: &OrganizationId) -> Result<Vec<Workflow>> {
        let mut workflows = self.workflows_under(cf::WORKFLOWS_BY_ORG, org_id.as_bytes())?;
        workflows.retain(|w| w.is_active);
        Ok(workflows)
    }

    fn list_organizations_with_active_workflows(&self) -> Result<Vec<OrganizationId>> {
        let cf = self.cf(cf::WORKFLOWS)?;

        let mut orgs = BTreeSet::new();
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        for item in iter {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let workflow: Workflow = Self::deserialize(&value)?;
            if workflow.is_active {
                orgs.insert(workflow.organization_id);
            }
        }

        Ok(orgs.into_iter().collect())
    }

    fn get_due_workflows(
        &self,
        org_id: &OrganizationId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Workflow>> {
        let mut due = self.list_active_workflows(org_id)?;
        due.retain(|w| w.next_execution_time <= now);
        due.sort_by_key(|w| w.next_execution_time);
        Ok(due)
    }

    fn update_workflow(&self, workflow_id: &WorkflowId, patch: WorkflowPatch) -> Result<Workflow> {
        let mut workflow = self.get_workflow(workflow_id)?.ok_or(StoreError::NotFound)?;

        if let Some(next) = patch.next_execution_time {
            workflow.next_execution_time = next;
        }
        if let Some(last) = patch.last_execution_time {
            workflow.last_execution_time = Some(last);
        }
        if let Some(active) = patch.is_active {
            workflow.is_active = active;
        }

        self.put_workflow(&workflow)?;
        Ok(workflow)
    }

    fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<()> {
        let cf_workflows = self.cf(cf::WORKFLOWS)?;
        let cf_by_org = self.cf(cf::WORKFLOWS_BY_ORG)?;
        let cf_by_room = self.cf(cf::WORKFLOWS_BY_ROOM)?;

        let workflow = self.get_workflow(workflow_id)?.ok_or(StoreError::NotFound)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_workflows, keys::workflow_key(workflow_id));
        batch.delete_cf(
            &cf_by_org,
            keys::owned_workflow_key(workflow.organization_id.as_bytes(), workflow_id),
        );
        batch.delete_cf(
            &cf_by_room,
            keys::owned_workflow_key(workflow.chat_room_id.as_bytes(), workflow_id),
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }
}
