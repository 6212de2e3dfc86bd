//! Per-organization real-time chat actor for agora.
//!
//! Each organization is served by one [`OrgActor`] that owns its WebSocket
//! sessions, persists and fans out messages, routes new messages to AI
//! agents, runs agent turns against the language model and executes
//! scheduled workflows on a single timer. All of it runs on one task, one
//! handler at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   Command    ┌──────────────────────────────────────────┐
//! │     Hub      │─────────────▶│                OrgActor                  │
//! │ (per-org     │              │                                          │
//! │  registry)   │              │  SessionRegistry ◀── broadcast ──┐       │
//! └──────────────┘              │                                  │       │
//!                               │  frame ──▶ Message Pipeline ─────┤       │
//!                               │                 │ deferred       │       │
//!                               │                 ▼                │       │
//!                               │         Routing Engine           │       │
//!                               │                 │                │       │
//!                               │                 ▼                │       │
//!                               │         Agent Invoker ──▶ StreamDecoder  │
//!                               │          │        ▲                      │
//!                               │   tools  │        │ Workflow run         │
//!                               │          ▼        │                      │
//!                               │   ToolRegistry   Alarm ◀── Workflows     │
//!                               └──────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use agora_actor::{ActorConfig, CreateChatRoomRequest, Hub, NewMember, ToolRegistry};
//! use agora_core::{OrganizationId, UserId};
//! use agora_model::{HttpModel, ModelConfig};
//! use agora_store::{MemberRole, RocksStore, RoomType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/agora-db")?);
//! let model = Arc::new(HttpModel::new(ModelConfig::default())?);
//! let tools = Arc::new(ToolRegistry::new(None)?);
//! let hub = Hub::new(store, model, tools, ActorConfig::default());
//!
//! let org_id = OrganizationId::generate();
//! let user_id = UserId::generate();
//! let room = hub
//!     .create_chat_room(
//!         org_id,
//!         CreateChatRoomRequest {
//!             name: "general".to_string(),
//!             room_type: RoomType::Public,
//!             creator: NewMember::user(user_id, "Ada", MemberRole::Owner),
//!         },
//!     )
//!     .await?;
//! println!("created {}", room.id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod actor;
pub mod error;
pub mod hub;
pub mod invoker;
pub mod pipeline;
pub mod protocol;
mod rooms;
pub mod routing;
pub mod session;
pub mod stream;
pub mod tools;
pub mod types;
mod workflows;

#[cfg(test)]
mod testing;

pub use actor::{Command, OrgActor};
pub use error::{ActorError, Result};
pub use hub::Hub;
pub use invoker::{TurnMode, TurnOutcome};
pub use pipeline::{MessageDraft, RoutingJob};
pub use protocol::{ClientChatMessage, ClientMessage, ServerMessage};
pub use session::{Connection, Session, SessionRegistry};
pub use stream::{StreamDecoder, StreamEffect};
pub use tools::{RemoteTool, ToolRegistry, CREATE_MESSAGE_THREAD, SCHEDULE_WORKFLOW};
pub use types::{
    ActorConfig, CreateAgentRequest, CreateChatRoomRequest, CreateWorkflowRequest, NewMember,
};
pub use workflows::advance;
