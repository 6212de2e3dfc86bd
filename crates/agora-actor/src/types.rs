//! Request types and configuration for actor operations.
//!
//! These types define the contracts of the operations the HTTP layer invokes
//! on an organization's actor.

use agora_core::{AgentId, MemberId, OrganizationId, RoomId, UserId};
use agora_store::{Agent, MemberRole, MemberType, RoomType, WorkflowStep};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to register an agent profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    /// Display name.
    pub name: String,
    /// What the agent is good at.
    #[serde(default)]
    pub description: Option<String>,
    /// Persona: tone of voice.
    #[serde(default)]
    pub tone: Option<String>,
    /// Persona: how much the agent writes.
    #[serde(default)]
    pub verbosity: Option<String>,
    /// Persona: emoji habits.
    #[serde(default)]
    pub emoji_usage: Option<String>,
    /// Persona: register and vocabulary.
    #[serde(default)]
    pub language_style: Option<String>,
}

impl CreateAgentRequest {
    /// The profile this request describes.
    #[must_use]
    pub fn into_agent(self, organization_id: OrganizationId, now: DateTime<Utc>) -> Agent {
        Agent {
            id: AgentId::generate(),
            organization_id,
            name: self.name,
            description: self.description,
            tone: self.tone,
            verbosity: self.verbosity,
            emoji_usage: self.emoji_usage,
            language_style: self.language_style,
            created_at: now,
        }
    }
}

/// Request to create a chat room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRoomRequest {
    /// Human-readable name.
    pub name: String,
    /// Visibility.
    #[serde(default, rename = "type")]
    pub room_type: RoomType,
    /// The creating user, added as the room owner.
    pub creator: NewMember,
}

/// A member to add to a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    /// The user or agent id.
    pub id: MemberId,
    /// Whether the member is a user or an agent.
    #[serde(rename = "type")]
    pub member_type: MemberType,
    /// Role in the room.
    #[serde(default)]
    pub role: MemberRole,
    /// Display name. Agents default to their profile name.
    #[serde(default)]
    pub name: Option<String>,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub image: Option<String>,
}

impl NewMember {
    /// A user member with the given role.
    #[must_use]
    pub fn user(user_id: UserId, name: impl Into<String>, role: MemberRole) -> Self {
        Self {
            id: user_id.into(),
            member_type: MemberType::User,
            role,
            name: Some(name.into()),
            email: None,
            image: None,
        }
    }

    /// An agent member named after its profile.
    #[must_use]
    pub fn agent(agent_id: AgentId) -> Self {
        Self {
            id: agent_id.into(),
            member_type: MemberType::Agent,
            role: MemberRole::Member,
            name: None,
            email: None,
            image: None,
        }
    }
}

/// Request to schedule a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    /// Room the agent posts into.
    pub chat_room_id: RoomId,
    /// Agent that runs the workflow.
    pub agent_id: AgentId,
    /// What the run should achieve.
    pub goal: String,
    /// Ordered plan.
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    /// A cron expression or a future timestamp.
    pub schedule_expression: String,
}

/// Configuration for organization actors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorConfig {
    /// Trailing messages given to the router and to agent turns.
    pub context_window: usize,
    /// Messages per history page sent to clients.
    pub history_page_size: usize,
    /// Model steps allowed in one agent turn.
    pub max_steps: usize,
    /// How long an actor with nothing to do stays alive (seconds).
    pub idle_timeout_seconds: u64,
    /// How long the HTTP layer waits for an actor reply (seconds).
    pub request_timeout_seconds: u64,
    /// Capacity of an actor's command queue.
    pub command_buffer: usize,
    /// Deliver room broadcasts only to sessions whose active room matches.
    pub room_scoped_broadcast: bool,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            context_window: 20,
            history_page_size: 50,
            max_steps: 5,
            idle_timeout_seconds: 300, // 5 minutes
            request_timeout_seconds: 30,
            command_buffer: 64,
            room_scoped_broadcast: false,
        }
    }
}
