//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary room records, keyed by `room_id`.
    pub const ROOMS: &str = "rooms";

    /// Index: rooms by organization, keyed by `organization_id || room_id`.
    pub const ROOMS_BY_ORG: &str = "rooms_by_org";

    /// Member records, keyed by `room_id || member_id`.
    pub const MEMBERS: &str = "members";

    /// Index: memberships by member, keyed by `member_id || room_id`.
    pub const MEMBERSHIPS: &str = "memberships";

    /// Primary message records, keyed by big-endian `message_id`.
    pub const MESSAGES: &str = "messages";

    /// Index: messages by room and thread, keyed by `room_id || thread_id || message_id`.
    pub const MESSAGES_BY_THREAD: &str = "messages_by_thread";

    /// Agent profiles, keyed by `agent_id`.
    pub const AGENTS: &str = "agents";

    /// Primary workflow records, keyed by `workflow_id`.
    pub const WORKFLOWS: &str = "workflows";

    /// Index: workflows by organization, keyed by `organization_id || workflow_id`.
    pub const WORKFLOWS_BY_ORG: &str = "workflows_by_org";

    /// Index: workflows by room, keyed by `room_id || workflow_id`.
    pub const WORKFLOWS_BY_ROOM: &str = "workflows_by_room";

    /// Store-wide counters.
    pub const META: &str = "meta";
}

/// Key under [`cf::META`] holding the last assigned message id.
pub const MESSAGE_SEQUENCE_KEY: &[u8] = b"message_sequence";

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ROOMS,
        cf::ROOMS_BY_ORG,
        cf::MEMBERS,
        cf::MEMBERSHIPS,
        cf::MESSAGES,
        cf::MESSAGES_BY_THREAD,
        cf::AGENTS,
        cf::WORKFLOWS,
        cf::WORKFLOWS_BY_ORG,
        cf::WORKFLOWS_BY_ROOM,
        cf::META,
    ]
}
