//! Core types for agora.
//!
//! This crate provides the strongly-typed identifiers shared by every other
//! crate in the workspace: organizations, users, agents, room members, rooms,
//! workflows, live connections and chat messages.
//!
//! # Example
//!
//! ```
//! use agora_core::{AgentId, MemberId, MessageId, RoomId};
//!
//! let room_id = RoomId::generate();
//! let agent_id = AgentId::generate();
//!
//! // Agents and users participate in rooms under their own id
//! let member_id = MemberId::from(agent_id);
//! assert_eq!(member_id.as_agent(), agent_id);
//!
//! // Message ids are server-assigned sequence numbers
//! let first = MessageId::new(1);
//! assert!(first < MessageId::new(2));
//! # let _ = room_id;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;

pub use ids::{
    AgentId, ConnectionId, IdError, MemberId, MessageId, OrganizationId, RoomId, UserId,
    WorkflowId,
};
