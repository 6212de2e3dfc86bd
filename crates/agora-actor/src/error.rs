//! Error types for the organization actor.
//!
//! WebSocket handler errors are reported to the originating socket only;
//! routing and agent-turn failures are logged and never reach a client.

use agora_core::{AgentId, MemberId, MessageId, OrganizationId, RoomId, WorkflowId};
use thiserror::Error;

/// A result type using `ActorError`.
pub type Result<T> = std::result::Result<T, ActorError>;

/// Errors that can occur in actor operations.
#[derive(Debug, Error)]
pub enum ActorError {
    /// The room does not exist or belongs to another organization.
    #[error("chat room not found: {0}")]
    RoomNotFound(RoomId),

    /// The member is not part of the room.
    #[error("member {member_id} not found in room {room_id}")]
    MemberNotFound {
        /// The room that was checked.
        room_id: RoomId,
        /// The missing member.
        member_id: MemberId,
    },

    /// No agent profile exists for the id.
    #[error("agent configuration not found: {0}")]
    AgentConfigNotFound(AgentId),

    /// A schedule expression could not be accepted.
    #[error("invalid schedule: {0}")]
    ScheduleParse(#[from] agora_scheduler::ScheduleError),

    /// A thread reply or thread request referenced a missing root.
    #[error("thread root not found: {0}")]
    ThreadRootNotFound(MessageId),

    /// An update referenced a message that does not exist.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// Agent selection failed.
    #[error("routing failed: {0}")]
    Routing(String),

    /// A workflow run failed.
    #[error("workflow {workflow_id} failed: {reason}")]
    WorkflowExecution {
        /// The workflow that ran.
        workflow_id: WorkflowId,
        /// What went wrong.
        reason: String,
    },

    /// The workflow does not exist or belongs to another organization.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    /// An inbound WebSocket frame could not be understood.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The actor did not answer in time.
    #[error("actor request timed out")]
    Timeout,

    /// The actor for the organization could not be reached.
    #[error("actor unavailable for organization {0}")]
    ActorUnavailable(OrganizationId),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] agora_store::StoreError),

    /// Language model error.
    #[error("model error: {0}")]
    Model(#[from] agora_model::ModelError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ActorError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::RoomNotFound(_)
            | Self::MemberNotFound { .. }
            | Self::AgentConfigNotFound(_)
            | Self::ThreadRootNotFound(_)
            | Self::MessageNotFound(_)
            | Self::WorkflowNotFound(_) => 404,
            Self::ScheduleParse(_) | Self::InvalidFrame(_) => 400,
            Self::Routing(_) | Self::Model(_) => 502,
            Self::ActorUnavailable(_) => 503,
            Self::Timeout => 504,
            Self::WorkflowExecution { .. } | Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Timeout | Self::ActorUnavailable(_) | Self::Store(_) => true,
            Self::Model(e) => e.is_retriable(),
            _ => false,
        }
    }
}
