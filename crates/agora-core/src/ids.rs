//! Core identifier types for agora.
//!
//! Every entity gets its own strongly-typed identifier so a room id can never be
//! passed where a workflow id is expected. UUID-backed ids serialize as their
//! hyphenated string form; [`MessageId`] is a server-assigned sequence number and
//! serializes as a plain JSON number.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Create the identifier from a UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Return the bytes of the UUID.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Rebuild the identifier from raw UUID bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(uuid::Uuid::from_bytes(bytes))
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
                Ok(Self(uuid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }
    };
}

uuid_id! {
    /// An organization. Each organization is served by exactly one actor.
    OrganizationId
}

uuid_id! {
    /// A human user, as asserted by the upstream identity provider.
    UserId
}

uuid_id! {
    /// An AI agent profile.
    AgentId
}

uuid_id! {
    /// A chat room participant, either a user or an agent.
    ///
    /// Members reuse the id of the user or agent they stand for, so the
    /// conversions below are lossless.
    MemberId
}

uuid_id! {
    /// A chat room.
    RoomId
}

uuid_id! {
    /// A scheduled workflow.
    WorkflowId
}

uuid_id! {
    /// A live WebSocket connection. Never persisted.
    ConnectionId
}

impl From<UserId> for MemberId {
    fn from(id: UserId) -> Self {
        Self(id.0)
    }
}

impl From<AgentId> for MemberId {
    fn from(id: AgentId) -> Self {
        Self(id.0)
    }
}

impl MemberId {
    /// Reinterpret this member as an agent id.
    ///
    /// Only meaningful when the member's type is `agent`.
    #[must_use]
    pub const fn as_agent(&self) -> AgentId {
        AgentId(self.0)
    }

    /// Reinterpret this member as a user id.
    #[must_use]
    pub const fn as_user(&self) -> UserId {
        UserId(self.0)
    }
}

/// A chat message identifier.
///
/// Assigned by the store from a monotonically increasing sequence; never
/// changes once assigned. Zero is never handed out, which lets key encodings
/// use it as the "no thread" marker.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Create a `MessageId` from its sequence number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Return the sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Big-endian encoding, so byte order matches numeric order.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decode a big-endian encoded id.
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl FromStr for MessageId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| IdError::InvalidMessageId)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The input is not a valid message sequence number.
    #[error("invalid message id")]
    InvalidMessageId,
}
