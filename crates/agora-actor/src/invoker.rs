//! Agent invoker.
//!
//! Runs one agent turn: builds the prompt, streams model steps through the
//! [`StreamDecoder`], persists what the decoder asks for, and executes the
//! tools the model calls. Tool results are fed back to the model until a
//! step makes no tool call or `max_steps` is reached.
//!
//! The turn's current thread is a mutable binding: `create-message-thread`
//! switches it, and every message inserted afterwards lands in the new
//! thread.

use std::collections::HashMap;
use std::sync::Arc;

use agora_core::{MemberId, MessageId};
use agora_model::{ModelError, PromptMessage, StepRequest, StreamEvent, ToolCallPart, ToolDefinition};
use agora_store::{Agent, ChatRoom, ChatRoomMessage, MessageQuery, Store, Workflow};
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::actor::OrgActor;
use crate::error::Result;
use crate::pipeline::MessageDraft;
use crate::stream::{StreamDecoder, StreamEffect, Upsert};
use crate::tools::{self, CREATE_MESSAGE_THREAD, SCHEDULE_WORKFLOW};
use crate::types::CreateWorkflowRequest;

/// Why an agent is running.
#[derive(Debug, Clone, Copy)]
pub enum TurnMode<'a> {
    /// Answering the conversation.
    Reply,
    /// Executing a scheduled workflow.
    Workflow(&'a Workflow),
}

/// Summary of a finished turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Model steps taken.
    pub steps: usize,
    /// Messages inserted during the turn, including thread roots.
    pub messages: Vec<MessageId>,
    /// Thread the turn ended in.
    pub thread_id: Option<MessageId>,
}

/// Mutable state of a running turn.
struct TurnContext<'a> {
    agent: &'a Agent,
    room: &'a ChatRoom,
    member_id: MemberId,
    thread_id: Option<MessageId>,
    outcome: TurnOutcome,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleWorkflowArgs {
    schedule_expression: String,
    goal: String,
    #[serde(default)]
    steps: Vec<agora_store::WorkflowStep>,
}

#[derive(Debug, Deserialize)]
struct CreateThreadArgs {
    #[serde(default)]
    title: String,
}

/// The system prompt of a turn.
#[must_use]
pub fn system_prompt(
    agent: &Agent,
    room: &ChatRoom,
    thread_id: Option<MessageId>,
    mode: TurnMode<'_>,
) -> String {
    let mut prompt = format!(
        "You are {}, an AI agent in the chat room \"{}\" (room id {}).\n",
        agent.name, room.name, room.id
    );

    if let Some(description) = &agent.description {
        prompt.push_str(description);
        prompt.push('\n');
    }

    let persona = [
        ("Tone", &agent.tone),
        ("Verbosity", &agent.verbosity),
        ("Emoji usage", &agent.emoji_usage),
        ("Language style", &agent.language_style),
    ];
    for (label, value) in persona {
        if let Some(value) = value {
            prompt.push_str(label);
            prompt.push_str(": ");
            prompt.push_str(value);
            prompt.push('\n');
        }
    }

    match thread_id {
        Some(thread_id) => {
            prompt.push_str(&format!("You are replying in thread {thread_id}.\n"));
        }
        None => prompt.push_str(
            "You are posting at the top level of the room. Call create-message-thread \
             first if your answer deserves its own thread.\n",
        ),
    }

    match mode {
        TurnMode::Reply => prompt.push_str(
            "Reply to the latest message. Messages from others are prefixed with their name.\n",
        ),
        TurnMode::Workflow(workflow) => prompt.push_str(&format!(
            "You are running scheduled workflow {}. Nobody is waiting on a reply; \
             carry out the task and post the results in the room.\n",
            workflow.id
        )),
    }

    prompt
}

/// The synthetic user turn of a workflow run.
#[must_use]
pub fn workflow_prompt(workflow: &Workflow) -> String {
    let mut prompt = format!("Goal: {}\n", workflow.goal);
    if !workflow.steps.is_empty() {
        prompt.push_str("Steps:\n");
        for (i, step) in workflow.steps.iter().enumerate() {
            prompt.push_str(&format!("{}. {}", i + 1, step.description));
            if let Some(tool) = &step.tool {
                prompt.push_str(&format!(" (use {tool})"));
            }
            prompt.push('\n');
        }
    }
    prompt
}

impl<S: Store + 'static> OrgActor<S> {
    /// Run one agent turn in a room.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::Model` if the model call fails or the stream
    /// reports an error, and storage errors from persisting the output.
    pub async fn invoke_agent(
        &mut self,
        agent: &Agent,
        room: &ChatRoom,
        thread_id: Option<MessageId>,
        mode: TurnMode<'_>,
    ) -> Result<TurnOutcome> {
        let mut ctx = TurnContext {
            agent,
            room,
            member_id: agent.id.into(),
            thread_id,
            outcome: TurnOutcome::default(),
        };
        let mut messages = match mode {
            TurnMode::Reply => self.history(&ctx)?,
            TurnMode::Workflow(workflow) => vec![PromptMessage::user(workflow_prompt(workflow))],
        };
        let mut decoder = StreamDecoder::new([CREATE_MESSAGE_THREAD]);

        tracing::debug!(
            org_id = %self.org_id,
            room_id = %room.id,
            agent_id = %agent.id,
            thread_id = ?thread_id,
            "Agent turn started"
        );

        while ctx.outcome.steps < self.config.max_steps {
            ctx.outcome.steps += 1;

            let request = StepRequest {
                system: system_prompt(agent, room, ctx.thread_id, mode),
                messages: messages.clone(),
                tools: self.tool_definitions(ctx.thread_id.is_none()),
            };
            let mut events = self.model.stream_step(&request).await?;

            let mut text = String::new();
            let mut calls = Vec::new();
            let mut streamed_results: HashMap<String, Value> = HashMap::new();

            while let Some(event) = events.next().await {
                let event = event?;
                match &event {
                    StreamEvent::TextDelta(delta) => text.push_str(delta),
                    StreamEvent::ToolCall {
                        tool_call_id,
                        tool_name,
                        args,
                    } => calls.push(ToolCallPart {
                        tool_call_id: tool_call_id.clone(),
                        tool_name: tool_name.clone(),
                        args: args.clone(),
                    }),
                    StreamEvent::ToolResult {
                        tool_call_id,
                        result,
                    } => {
                        streamed_results.insert(tool_call_id.clone(), result.clone());
                    }
                    _ => {}
                }

                match decoder.apply(event, Utc::now()) {
                    Some(StreamEffect::Upsert(upsert)) => {
                        self.persist(&mut decoder, upsert, &mut ctx)?;
                    }
                    Some(StreamEffect::Finished { reason }) => {
                        tracing::debug!(agent_id = %agent.id, reason = %reason, "Step finished");
                    }
                    Some(StreamEffect::Failed(error)) => {
                        tracing::warn!(agent_id = %agent.id, error = %error, "Model stream failed");
                        return Err(ModelError::Stream(error).into());
                    }
                    None => {}
                }
            }

            if calls.is_empty() {
                break;
            }

            messages.push(PromptMessage::Assistant {
                content: text,
                tool_calls: calls.clone(),
            });

            for call in calls {
                let result = if let Some(result) = streamed_results.remove(&call.tool_call_id) {
                    result
                } else {
                    let result = self.execute_tool(&call, &mut ctx).await;
                    let effect = decoder.apply(
                        StreamEvent::ToolResult {
                            tool_call_id: call.tool_call_id.clone(),
                            result: result.clone(),
                        },
                        Utc::now(),
                    );
                    if let Some(StreamEffect::Upsert(upsert)) = effect {
                        self.persist(&mut decoder, upsert, &mut ctx)?;
                    }
                    result
                };

                messages.push(PromptMessage::Tool {
                    tool_call_id: call.tool_call_id,
                    tool_name: call.tool_name,
                    result,
                });
            }
        }

        ctx.outcome.thread_id = ctx.thread_id;
        tracing::debug!(
            agent_id = %agent.id,
            steps = ctx.outcome.steps,
            messages = ctx.outcome.messages.len(),
            "Agent turn finished"
        );
        Ok(ctx.outcome)
    }

    /// Tools offered for one step.
    fn tool_definitions(&self, top_level: bool) -> Vec<ToolDefinition> {
        let mut definitions = self.tools.definitions();
        definitions.push(tools::schedule_workflow_definition());
        if top_level {
            definitions.push(tools::create_message_thread_definition());
        }
        definitions
    }

    /// Persist one decoder upsert through the pipeline, without routing.
    fn persist(
        &mut self,
        decoder: &mut StreamDecoder,
        upsert: Upsert,
        ctx: &mut TurnContext<'_>,
    ) -> Result<()> {
        let draft = MessageDraft {
            content: upsert.content,
            mentions: upsert.mentions,
            tool_uses: upsert.tool_uses,
            thread_id: ctx.thread_id,
            metadata: agora_store::MessageMetadata::default(),
            created_at: upsert.created_at,
        };
        let message = self.receive_message(ctx.member_id, ctx.room.id, draft, upsert.existing, false)?;
        if upsert.existing.is_none() {
            decoder.confirm(upsert.slot, message.id);
            ctx.outcome.messages.push(message.id);
        }
        Ok(())
    }

    async fn execute_tool(&mut self, call: &ToolCallPart, ctx: &mut TurnContext<'_>) -> Value {
        tracing::debug!(
            agent_id = %ctx.agent.id,
            tool = %call.tool_name,
            tool_call_id = %call.tool_call_id,
            "Executing tool"
        );

        match call.tool_name.as_str() {
            SCHEDULE_WORKFLOW => self.schedule_workflow_tool(&call.args, ctx),
            CREATE_MESSAGE_THREAD => self.create_thread_tool(&call.args, ctx),
            name => {
                let registry = Arc::clone(&self.tools);
                registry.execute(name, &call.args).await
            }
        }
    }

    fn schedule_workflow_tool(&mut self, args: &Value, ctx: &TurnContext<'_>) -> Value {
        let args: ScheduleWorkflowArgs = match serde_json::from_value(args.clone()) {
            Ok(args) => args,
            Err(e) => return tools::failure(format!("invalid arguments: {e}")),
        };

        let request = CreateWorkflowRequest {
            chat_room_id: ctx.room.id,
            agent_id: ctx.agent.id,
            goal: args.goal,
            steps: args.steps,
            schedule_expression: args.schedule_expression,
        };

        match self.create_workflow(request, Utc::now()) {
            Ok(workflow) => json!({
                "success": true,
                "workflowId": workflow.id,
                "isRecurring": workflow.is_recurring,
                "nextExecutionTime": workflow.next_execution_time,
            }),
            Err(e) => tools::failure(e.to_string()),
        }
    }

    fn create_thread_tool(&mut self, args: &Value, ctx: &mut TurnContext<'_>) -> Value {
        if let Some(thread_id) = ctx.thread_id {
            return tools::failure(format!("already replying in thread {thread_id}"));
        }

        let title = serde_json::from_value::<CreateThreadArgs>(args.clone())
            .map(|a| a.title)
            .unwrap_or_default();

        let draft = MessageDraft::text(title, None, Utc::now());
        match self.receive_message(ctx.member_id, ctx.room.id, draft, None, false) {
            Ok(root) => {
                ctx.thread_id = Some(root.id);
                ctx.outcome.messages.push(root.id);
                json!({"success": true, "threadId": root.id})
            }
            Err(e) => tools::failure(e.to_string()),
        }
    }

    /// Conversation leading up to a reply, as prompt messages.
    fn history(&self, ctx: &TurnContext<'_>) -> Result<Vec<PromptMessage>> {
        let mut context: Vec<ChatRoomMessage> = self.store.get_chat_room_messages(
            &ctx.room.id,
            ctx.thread_id,
            MessageQuery::latest(self.config.context_window),
        )?;
        if let Some(root_id) = ctx.thread_id {
            let root = self.thread_root(&ctx.room.id, root_id)?;
            context.insert(0, root);
        }

        let names: HashMap<MemberId, String> = self
            .store
            .get_chat_room_members(&ctx.room.id, None)?
            .into_iter()
            .map(|m| (m.member_id, m.name))
            .collect();

        Ok(context
            .into_iter()
            .map(|message| {
                if message.member_id == ctx.member_id {
                    PromptMessage::assistant(message.content)
                } else {
                    let name = names
                        .get(&message.member_id)
                        .map_or("unknown", String::as_str);
                    PromptMessage::user(format!("{name}: {}", message.content))
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActorError;
    use crate::testing::{add_agent, frames, harness, Harness};
    use agora_store::{ToolUseKind, WorkflowStep};

    #[tokio::test]
    async fn reply_streams_into_one_message() {
        let Harness {
            mut actor,
            model,
            room,
            user,
            _dir,
        } = harness();
        let scout = add_agent(&mut actor, &room, "Scout", "Finds sources");
        actor
            .receive_message(user.into(), room.id, MessageDraft::text("hi", None, Utc::now()), None, false)
            .unwrap();
        let (_conn, mut rx) = actor.connect_test(user);

        model.push_step(frames(&[
            r#"f:{"messageId":"m1"}"#,
            r#"0:"Hel""#,
            r#"0:"lo""#,
            r#"0:"!""#,
            r#"d:{"finishReason":"stop"}"#,
        ]));

        let outcome = actor
            .invoke_agent(&scout, &room, None, TurnMode::Reply)
            .await
            .unwrap();

        assert_eq!(outcome.steps, 1);
        assert_eq!(outcome.messages.len(), 1);
        let message = actor
            .store
            .get_chat_room_message(outcome.messages[0])
            .unwrap()
            .unwrap();
        assert_eq!(message.content, "Hello!");
        assert_eq!(message.member_id, MemberId::from(scout.id));

        let broadcasts = crate::testing::drain(&mut rx);
        assert_eq!(broadcasts.len(), 3);
        assert!(broadcasts
            .iter()
            .all(|b| b["message"]["id"] == outcome.messages[0].get()));

        // agent turns never queue routing
        assert!(actor.deferred.is_empty());

        let request = &model.step_requests()[0];
        assert!(request.system.contains("Scout"));
        assert_eq!(request.messages.len(), 1);
        assert!(request
            .tools
            .iter()
            .any(|t| t.name == CREATE_MESSAGE_THREAD));
    }

    #[tokio::test]
    async fn tool_calls_are_executed_and_fed_back() {
        let Harness {
            mut actor,
            model,
            room,
            _dir,
            ..
        } = harness();
        let scout = add_agent(&mut actor, &room, "Scout", "Finds sources");

        model.push_step(frames(&[
            r#"f:{"messageId":"m1"}"#,
            r#"0:"Scheduling""#,
            r#"9:{"toolCallId":"c1","toolName":"schedule-workflow","args":{"scheduleExpression":"0 9 * * 1","goal":"Weekly digest"}}"#,
            r#"d:{"finishReason":"tool-calls"}"#,
        ]));
        model.push_step(frames(&[
            r#"f:{"messageId":"m2"}"#,
            r#"0:"Done""#,
            r#"d:{"finishReason":"stop"}"#,
        ]));

        let outcome = actor
            .invoke_agent(&scout, &room, None, TurnMode::Reply)
            .await
            .unwrap();
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.messages.len(), 2);

        let workflows = actor.store.list_workflows_by_room(&room.id).unwrap();
        assert_eq!(workflows.len(), 1);
        assert!(workflows[0].is_recurring);
        assert!(actor.alarm.is_armed());

        let first = actor
            .store
            .get_chat_room_message(outcome.messages[0])
            .unwrap()
            .unwrap();
        assert_eq!(first.tool_uses.len(), 1);
        assert_eq!(first.tool_uses[0].kind, ToolUseKind::ToolResult);
        assert_eq!(first.tool_uses[0].result.as_ref().unwrap()["success"], true);

        let second = &model.step_requests()[1];
        let Some(PromptMessage::Tool { result, .. }) = second.messages.last() else {
            panic!("expected a tool result");
        };
        assert_eq!(result["isRecurring"], true);
    }

    #[tokio::test]
    async fn streamed_tool_result_is_fed_back_unchanged() {
        let Harness {
            mut actor,
            model,
            room,
            _dir,
            ..
        } = harness();
        let scout = add_agent(&mut actor, &room, "Scout", "Finds sources");

        model.push_step(frames(&[
            r#"f:{"messageId":"m1"}"#,
            r#"9:{"toolCallId":"s1","toolName":"search","args":{"query":"rust actors"}}"#,
            r#"a:{"toolCallId":"s1","result":{"hits":3}}"#,
            r#"d:{"finishReason":"tool-calls"}"#,
        ]));
        model.push_step(frames(&[
            r#"f:{"messageId":"m2"}"#,
            r#"0:"Found three""#,
            r#"d:{"finishReason":"stop"}"#,
        ]));

        let outcome = actor
            .invoke_agent(&scout, &room, None, TurnMode::Reply)
            .await
            .unwrap();
        assert_eq!(outcome.steps, 2);

        let second = &model.step_requests()[1];
        let Some(PromptMessage::Tool {
            tool_call_id,
            result,
            ..
        }) = second.messages.last()
        else {
            panic!("expected a tool result");
        };
        assert_eq!(tool_call_id, "s1");
        assert_eq!(result, &json!({"hits": 3}));

        let first = actor
            .store
            .get_chat_room_message(outcome.messages[0])
            .unwrap()
            .unwrap();
        assert_eq!(first.tool_uses[0].result.as_ref().unwrap(), &json!({"hits": 3}));
    }

    #[tokio::test]
    async fn invalid_schedule_is_reported_to_the_model() {
        let Harness {
            mut actor,
            model,
            room,
            _dir,
            ..
        } = harness();
        let scout = add_agent(&mut actor, &room, "Scout", "Finds sources");

        model.push_step(frames(&[
            r#"f:{"messageId":"m1"}"#,
            r#"9:{"toolCallId":"c1","toolName":"schedule-workflow","args":{"scheduleExpression":"2001-01-01T00:00:00Z","goal":"Too late"}}"#,
        ]));
        model.push_step(frames(&[r#"f:{"messageId":"m2"}"#, r#"0:"Sorry""#]));

        actor
            .invoke_agent(&scout, &room, None, TurnMode::Reply)
            .await
            .unwrap();

        let Some(PromptMessage::Tool { result, .. }) = model.step_requests()[1].messages.last().cloned()
        else {
            panic!("expected a tool result");
        };
        assert_eq!(result["success"], false);
        assert!(result["error"].is_string());
        assert!(actor.store.list_workflows_by_room(&room.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_thread_redirects_later_messages() {
        let Harness {
            mut actor,
            model,
            room,
            _dir,
            ..
        } = harness();
        let scout = add_agent(&mut actor, &room, "Scout", "Finds sources");

        model.push_step(frames(&[
            r#"f:{"messageId":"m1"}"#,
            r#"9:{"toolCallId":"t1","toolName":"create-message-thread","args":{"title":"Findings"}}"#,
        ]));
        model.push_step(frames(&[
            r#"f:{"messageId":"m2"}"#,
            r#"0:"Details in thread""#,
        ]));

        let outcome = actor
            .invoke_agent(&scout, &room, None, TurnMode::Reply)
            .await
            .unwrap();

        let root_id = outcome.thread_id.unwrap();
        let root = actor.store.get_chat_room_message(root_id).unwrap().unwrap();
        assert_eq!(root.content, "Findings");
        assert!(root.tool_uses.is_empty());
        assert_eq!(root.thread_metadata.unwrap().message_count, 1);

        let replies = actor
            .store
            .get_chat_room_messages(&room.id, Some(root_id), MessageQuery::default())
            .unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].content, "Details in thread");

        // the thread tool is no longer offered once a thread is set
        let second = &model.step_requests()[1];
        assert!(second.tools.iter().all(|t| t.name != CREATE_MESSAGE_THREAD));
    }

    #[tokio::test]
    async fn stream_error_fails_the_turn() {
        let Harness {
            mut actor,
            model,
            room,
            _dir,
            ..
        } = harness();
        let scout = add_agent(&mut actor, &room, "Scout", "Finds sources");
        model.push_step(frames(&[r#"f:{"messageId":"m1"}"#, r#"3:"rate limited""#]));

        let err = actor
            .invoke_agent(&scout, &room, None, TurnMode::Reply)
            .await
            .unwrap_err();
        assert!(matches!(err, ActorError::Model(ModelError::Stream(_))));
    }

    #[test]
    fn workflow_prompt_lists_steps() {
        let workflow = Workflow {
            id: agora_core::WorkflowId::generate(),
            organization_id: agora_core::OrganizationId::generate(),
            chat_room_id: agora_core::RoomId::generate(),
            agent_id: agora_core::AgentId::generate(),
            goal: "Weekly digest".into(),
            steps: vec![
                WorkflowStep {
                    description: "Collect news".into(),
                    tool: Some("search".into()),
                },
                WorkflowStep {
                    description: "Summarize".into(),
                    tool: None,
                },
            ],
            schedule_expression: "0 9 * * 1".into(),
            is_recurring: true,
            next_execution_time: Utc::now(),
            last_execution_time: None,
            is_active: true,
            created_at: Utc::now(),
        };

        let prompt = workflow_prompt(&workflow);
        assert!(prompt.starts_with("Goal: Weekly digest"));
        assert!(prompt.contains("1. Collect news (use search)"));
        assert!(prompt.contains("2. Summarize\n"));
    }
}
