//! Key encoding utilities for `RocksDB`.
//!
//! Keys are fixed-width concatenations of raw id bytes so that every index
//! supports ordered prefix scans. Message ids are encoded big-endian, which
//! makes lexicographic key order equal to insertion order.

use agora_core::{MemberId, MessageId, OrganizationId, RoomId, WorkflowId};

/// Width of a UUID-backed id.
const UUID_LEN: usize = 16;

/// Width of a message id.
const MESSAGE_ID_LEN: usize = 8;

/// Concatenate two fixed-width key parts.
fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(a.len() + b.len());
    key.extend_from_slice(a);
    key.extend_from_slice(b);
    key
}

/// Copy a UUID-sized slice out of a key.
///
/// # Panics
///
/// Panics if the key is shorter than `offset + 16`.
fn uuid_at(key: &[u8], offset: usize) -> [u8; UUID_LEN] {
    let mut bytes = [0u8; UUID_LEN];
    bytes.copy_from_slice(&key[offset..offset + UUID_LEN]);
    bytes
}

/// Encode a room key.
#[must_use]
pub fn room_key(room_id: &RoomId) -> Vec<u8> {
    room_id.as_bytes().to_vec()
}

/// Encode an organization-room index key: `organization_id || room_id`.
#[must_use]
pub fn org_room_key(org_id: &OrganizationId, room_id: &RoomId) -> Vec<u8> {
    concat(org_id.as_bytes(), room_id.as_bytes())
}

/// Encode an organization prefix.
#[must_use]
pub fn org_prefix(org_id: &OrganizationId) -> Vec<u8> {
    org_id.as_bytes().to_vec()
}

/// Extract the trailing UUID-sized id from a two-part index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn second_uuid(key: &[u8]) -> [u8; UUID_LEN] {
    uuid_at(key, UUID_LEN)
}

/// Encode a member key: `room_id || member_id`.
#[must_use]
pub fn member_key(room_id: &RoomId, member_id: &MemberId) -> Vec<u8> {
    concat(room_id.as_bytes(), member_id.as_bytes())
}

/// Encode a room prefix for scanning members or workflows of a room.
#[must_use]
pub fn room_prefix(room_id: &RoomId) -> Vec<u8> {
    room_id.as_bytes().to_vec()
}

/// Encode a membership index key: `member_id || room_id`.
#[must_use]
pub fn membership_key(member_id: &MemberId, room_id: &RoomId) -> Vec<u8> {
    concat(member_id.as_bytes(), room_id.as_bytes())
}

/// Encode a member prefix for scanning the rooms of a member.
#[must_use]
pub fn member_prefix(member_id: &MemberId) -> Vec<u8> {
    member_id.as_bytes().to_vec()
}

/// Encode a message key.
#[must_use]
pub fn message_key(message_id: MessageId) -> Vec<u8> {
    message_id.to_be_bytes().to_vec()
}

/// Encode a thread prefix: `room_id || thread_id`, where top-level messages
/// use thread id zero.
#[must_use]
pub fn thread_prefix(room_id: &RoomId, thread_id: Option<MessageId>) -> Vec<u8> {
    let thread = thread_id.map_or(0, MessageId::get).to_be_bytes();
    concat(room_id.as_bytes(), &thread)
}

/// Encode a thread index key: `room_id || thread_id || message_id`.
#[must_use]
pub fn thread_message_key(
    room_id: &RoomId,
    thread_id: Option<MessageId>,
    message_id: MessageId,
) -> Vec<u8> {
    concat(&thread_prefix(room_id, thread_id), &message_id.to_be_bytes())
}

/// Extract the message id from a thread index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_message_id_from_thread_key(key: &[u8]) -> MessageId {
    let offset = UUID_LEN + MESSAGE_ID_LEN;
    let mut bytes = [0u8; MESSAGE_ID_LEN];
    bytes.copy_from_slice(&key[offset..offset + MESSAGE_ID_LEN]);
    MessageId::from_be_bytes(bytes)
}

/// Encode a workflow key.
#[must_use]
pub fn workflow_key(workflow_id: &WorkflowId) -> Vec<u8> {
    workflow_id.as_bytes().to_vec()
}

/// Encode a workflow index key under an owner id (organization or room).
#[must_use]
pub fn owned_workflow_key(owner: &[u8; UUID_LEN], workflow_id: &WorkflowId) -> Vec<u8> {
    concat(owner, workflow_id.as_bytes())
}
