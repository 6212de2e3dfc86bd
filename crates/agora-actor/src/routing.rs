//! Routing engine.
//!
//! Decides which agents of a room answer a new message. Mentioned agents
//! always answer and skip the model entirely; otherwise a structured-output
//! call classifies the message against the room's agents.
//!
//! ```text
//! new message ──▶ candidates (room agents minus author)
//!                    │
//!          mentions? ├── yes ──▶ mentioned candidates
//!                    └── no  ──▶ generate_object {agentIds} ──▶ filter to candidates
//! ```
//!
//! Routing never fails outward: any error is logged and routes to nobody.

use std::collections::HashSet;

use agora_core::AgentId;
use agora_model::ObjectRequest;
use agora_store::{ChatRoom, ChatRoomMessage, MemberType, MessageQuery, Store};
use serde_json::{json, Value};

use crate::actor::OrgActor;
use crate::error::{ActorError, Result};
use crate::invoker::TurnMode;
use crate::pipeline::RoutingJob;

/// An agent that may answer a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The agent.
    pub agent_id: AgentId,
    /// Display name in the room.
    pub name: String,
    /// Profile description.
    pub description: Option<String>,
}

/// Mentioned candidates, in candidate order.
#[must_use]
pub fn mentioned(message: &ChatRoomMessage, candidates: &[Candidate]) -> Vec<AgentId> {
    let mentions: HashSet<_> = message.mentions.iter().map(|m| m.id.as_agent()).collect();
    candidates
        .iter()
        .filter(|c| mentions.contains(&c.agent_id))
        .map(|c| c.agent_id)
        .collect()
}

/// Extract the routed ids from a classifier answer, in candidate order.
///
/// Ids that are not candidates are dropped, as are duplicates.
///
/// # Errors
///
/// Returns `ActorError::Routing` if the answer has no `agentIds` array.
pub fn parse_routed(answer: &Value, candidates: &[Candidate]) -> Result<Vec<AgentId>> {
    let ids = answer
        .get("agentIds")
        .and_then(Value::as_array)
        .ok_or_else(|| ActorError::Routing(format!("classifier answered {answer}")))?;

    let answered: HashSet<AgentId> = ids
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|id| id.parse().ok())
        .collect();

    Ok(candidates
        .iter()
        .filter(|c| answered.contains(&c.agent_id))
        .map(|c| c.agent_id)
        .collect())
}

fn routing_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "agentIds": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Ids of the agents that should respond, possibly none"
            }
        },
        "required": ["agentIds"]
    })
}

fn routing_system_prompt(room: &ChatRoom, candidates: &[Candidate]) -> String {
    let mut prompt = format!(
        "You route messages in the {} chat room \"{}\" to the AI agents that should respond.\n\
         Select only agents whose expertise is clearly relevant to the new message. \
         Select no agent when the message is addressed to people or needs no answer.\n\n\
         Agents:\n",
        room.room_type.as_str(),
        room.name,
    );
    for candidate in candidates {
        prompt.push_str(&format!("- id: {}, name: {}", candidate.agent_id, candidate.name));
        if let Some(description) = &candidate.description {
            prompt.push_str(&format!(", description: {description}"));
        }
        prompt.push('\n');
    }
    prompt
}

impl<S: Store + 'static> OrgActor<S> {
    /// Route one queued message and run every selected agent, one after
    /// the other.
    pub(crate) async fn process_routing_job(&mut self, job: RoutingJob) {
        let routed = match self.route(&job).await {
            Ok(routed) => routed,
            Err(e) => {
                tracing::warn!(
                    org_id = %self.org_id,
                    room_id = %job.room_id,
                    message_id = %job.message_id,
                    error = %e,
                    "Routing failed"
                );
                return;
            }
        };

        if routed.is_empty() {
            return;
        }

        let Ok(room) = self.room(&job.room_id) else {
            return;
        };

        for agent_id in routed {
            let agent = match self.store.get_agent_by_id(&agent_id) {
                Ok(Some(agent)) => agent,
                Ok(None) => {
                    tracing::warn!(agent_id = %agent_id, "Routed agent has no profile");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(agent_id = %agent_id, error = %e, "Failed to load agent");
                    continue;
                }
            };

            if let Err(e) = self
                .invoke_agent(&agent, &room, job.thread_id, TurnMode::Reply)
                .await
            {
                tracing::warn!(
                    org_id = %self.org_id,
                    room_id = %room.id,
                    agent_id = %agent.id,
                    error = %e,
                    "Agent turn failed"
                );
            }
        }
    }

    /// Select the agents that answer the message of a routing job.
    ///
    /// # Errors
    ///
    /// Returns an error if the room or message cannot be loaded. Classifier
    /// failures are not errors; they route to nobody.
    pub(crate) async fn route(&self, job: &RoutingJob) -> Result<Vec<AgentId>> {
        let room = self.room(&job.room_id)?;
        let message = self
            .store
            .get_chat_room_message(job.message_id)?
            .ok_or(ActorError::MessageNotFound(job.message_id))?;
        let candidates = self.candidates(&room, &message)?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mentioned = mentioned(&message, &candidates);
        if !mentioned.is_empty() {
            tracing::debug!(room_id = %room.id, count = mentioned.len(), "Routed by mention");
            return Ok(mentioned);
        }

        match self.classify(&room, &message, &candidates).await {
            Ok(routed) => {
                tracing::debug!(room_id = %room.id, count = routed.len(), "Routed by classifier");
                Ok(routed)
            }
            Err(e) => {
                tracing::warn!(
                    org_id = %self.org_id,
                    room_id = %room.id,
                    message_id = %message.id,
                    error = %e,
                    "Classifier failed, routing to nobody"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Agent members of the room other than the author.
    fn candidates(&self, room: &ChatRoom, message: &ChatRoomMessage) -> Result<Vec<Candidate>> {
        let members: Vec<_> = self
            .store
            .get_chat_room_members(&room.id, Some(MemberType::Agent))?
            .into_iter()
            .filter(|m| m.member_id != message.member_id)
            .collect();

        let ids: Vec<_> = members.iter().map(|m| m.member_id.as_agent()).collect();
        let profiles = self.store.get_agents_by_ids(&ids)?;

        Ok(members
            .into_iter()
            .map(|member| {
                let agent_id = member.member_id.as_agent();
                let description = profiles
                    .iter()
                    .find(|p| p.id == agent_id)
                    .and_then(|p| p.description.clone());
                Candidate {
                    agent_id,
                    name: member.name,
                    description,
                }
            })
            .collect())
    }

    async fn classify(
        &self,
        room: &ChatRoom,
        message: &ChatRoomMessage,
        candidates: &[Candidate],
    ) -> Result<Vec<AgentId>> {
        let mut context = self.store.get_chat_room_messages(
            &room.id,
            message.thread_id,
            MessageQuery {
                limit: Some(self.config.context_window),
                before: Some(message.id),
            },
        )?;
        if let Some(root_id) = message.thread_id {
            if let Some(root) = self.store.get_chat_room_message(root_id)? {
                context.insert(0, root);
            }
        }

        let prompt = json!({
            "context": context,
            "newMessages": [message],
        });

        let request = ObjectRequest {
            system: routing_system_prompt(room, candidates),
            prompt: prompt.to_string(),
            schema: routing_schema(),
        };

        let answer = self.model.generate_object(&request).await?;
        parse_routed(&answer, candidates)
    }
}
