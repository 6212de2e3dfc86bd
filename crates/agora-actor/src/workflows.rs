//! Workflow scheduler.
//!
//! Each actor owns a single [`Alarm`](agora_scheduler::Alarm). Every
//! workflow mutation recomputes the earliest upcoming execution and re-arms
//! it. When the alarm fires, every due workflow runs through the agent
//! invoker and is advanced:
//!
//! | outcome | recurring                      | one-off            |
//! |---------|--------------------------------|--------------------|
//! | success | `next = cron.next(prev next)`  | `is_active = false`|
//! | failure | stamp `last_execution_time`    | stamp `last_execution_time` |

use std::collections::BTreeSet;

use agora_core::{RoomId, WorkflowId};
use agora_scheduler::{AlarmChange, CronExpr, Schedule, ScheduleError};
use agora_store::{Store, StoreError, Workflow, WorkflowPatch};
use chrono::{DateTime, Utc};

use crate::actor::OrgActor;
use crate::error::{ActorError, Result};
use crate::invoker::TurnMode;
use crate::protocol::ServerMessage;
use crate::types::CreateWorkflowRequest;

/// The patch applied after a run.
///
/// Recurring workflows advance from their previous due time. When the
/// process was down long enough that the following occurrence is already in
/// the past, the missed occurrences collapse into this run and the schedule
/// resumes from `ran_at`.
#[must_use]
pub fn advance(workflow: &Workflow, succeeded: bool, ran_at: DateTime<Utc>) -> WorkflowPatch {
    let mut patch = WorkflowPatch {
        last_execution_time: Some(ran_at),
        ..WorkflowPatch::default()
    };
    if !succeeded {
        return patch;
    }

    let next = if workflow.is_recurring {
        CronExpr::parse(&workflow.schedule_expression)
            .ok()
            .and_then(|cron| {
                cron.next_after(workflow.next_execution_time)
                    .filter(|next| *next > ran_at)
                    .or_else(|| cron.next_after(ran_at))
            })
    } else {
        None
    };

    match next {
        Some(next) => patch.next_execution_time = Some(next),
        None => patch.is_active = Some(false),
    }
    patch
}

impl<S: Store + 'static> OrgActor<S> {
    /// Schedule a workflow.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::RoomNotFound` for a room outside this
    /// organization, `ActorError::AgentConfigNotFound` for an unknown agent
    /// and `ActorError::ScheduleParse` for an unacceptable expression.
    pub fn create_workflow(
        &mut self,
        request: CreateWorkflowRequest,
        now: DateTime<Utc>,
    ) -> Result<Workflow> {
        let room = self.room(&request.chat_room_id)?;
        self.store
            .get_agent_by_id(&request.agent_id)?
            .filter(|agent| agent.organization_id == self.org_id)
            .ok_or(ActorError::AgentConfigNotFound(request.agent_id))?;

        let schedule = Schedule::parse(&request.schedule_expression, now)?;
        let next_execution_time = schedule
            .first_execution(now)
            .ok_or_else(|| ScheduleError::NeverFires(request.schedule_expression.clone()))?;

        let workflow = Workflow {
            id: WorkflowId::generate(),
            organization_id: self.org_id,
            chat_room_id: room.id,
            agent_id: request.agent_id,
            goal: request.goal,
            steps: request.steps,
            schedule_expression: request.schedule_expression,
            is_recurring: schedule.is_recurring(),
            next_execution_time,
            last_execution_time: None,
            is_active: true,
            created_at: now,
        };
        self.store.put_workflow(&workflow)?;

        tracing::info!(
            org_id = %self.org_id,
            workflow_id = %workflow.id,
            room_id = %room.id,
            recurring = workflow.is_recurring,
            next = %workflow.next_execution_time,
            "Workflow scheduled"
        );

        self.schedule_next_alarm(now)?;
        self.broadcast_workflows(&room.id)?;
        Ok(workflow)
    }

    /// Delete a workflow.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::WorkflowNotFound` if the workflow does not exist
    /// in this organization.
    pub fn delete_workflow(&mut self, workflow_id: &WorkflowId, now: DateTime<Utc>) -> Result<()> {
        let workflow = self
            .store
            .get_workflow(workflow_id)?
            .filter(|w| w.organization_id == self.org_id)
            .ok_or(ActorError::WorkflowNotFound(*workflow_id))?;

        self.store.delete_workflow(workflow_id).map_err(|e| match e {
            StoreError::NotFound => ActorError::WorkflowNotFound(*workflow_id),
            other => ActorError::Store(other),
        })?;

        tracing::info!(org_id = %self.org_id, workflow_id = %workflow_id, "Workflow deleted");

        self.schedule_next_alarm(now)?;
        self.broadcast_workflows(&workflow.chat_room_id)?;
        Ok(())
    }

    /// Arm the alarm at the earliest upcoming execution, or disarm it.
    ///
    /// Workflows already overdue are not considered; they are picked up by
    /// the catch-up run when the actor starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflows cannot be listed.
    pub fn schedule_next_alarm(&mut self, now: DateTime<Utc>) -> Result<()> {
        let next = self
            .store
            .list_active_workflows(&self.org_id)?
            .into_iter()
            .map(|w| w.next_execution_time)
            .filter(|at| *at >= now)
            .min();

        match self.alarm.set(next) {
            AlarmChange::Armed(at) => {
                tracing::debug!(org_id = %self.org_id, at = %at, "Alarm armed");
            }
            AlarmChange::Rearmed { from, to } => {
                tracing::debug!(org_id = %self.org_id, from = %from, to = %to, "Alarm rearmed");
            }
            AlarmChange::Disarmed(at) => {
                tracing::debug!(org_id = %self.org_id, was = %at, "Alarm disarmed");
            }
            AlarmChange::Unchanged => {}
        }
        Ok(())
    }

    /// Arm for the first time after the actor starts.
    ///
    /// Overdue workflows arm the alarm immediately so they run once.
    pub(crate) fn arm_on_start(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.store.get_due_workflows(&self.org_id, now)?.is_empty() {
            return self.schedule_next_alarm(now);
        }
        tracing::info!(org_id = %self.org_id, "Catching up on overdue workflows");
        self.alarm.set(Some(now));
        Ok(())
    }

    /// Run every due workflow, advance their schedules and re-arm.
    ///
    /// Returns the number of workflows that ran.
    ///
    /// # Errors
    ///
    /// Returns an error only if the due workflows cannot be loaded or
    /// updated. Individual run failures are logged and stamped.
    pub async fn run_due_workflows(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.store.get_due_workflows(&self.org_id, now)?;
        let mut rooms = BTreeSet::new();

        for workflow in &due {
            let succeeded = match self.run_workflow(workflow).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(
                        org_id = %self.org_id,
                        workflow_id = %workflow.id,
                        room_id = %workflow.chat_room_id,
                        agent_id = %workflow.agent_id,
                        error = %e,
                        "Workflow execution failed"
                    );
                    false
                }
            };

            let patch = advance(workflow, succeeded, Utc::now().max(now));
            let updated = self.store.update_workflow(&workflow.id, patch)?;
            tracing::info!(
                workflow_id = %updated.id,
                succeeded,
                active = updated.is_active,
                next = %updated.next_execution_time,
                "Workflow advanced"
            );
            rooms.insert(workflow.chat_room_id);
        }

        self.schedule_next_alarm(Utc::now().max(now))?;
        for room_id in &rooms {
            self.broadcast_workflows(room_id)?;
        }
        Ok(due.len())
    }

    async fn run_workflow(&mut self, workflow: &Workflow) -> Result<()> {
        let failed = |reason: String| ActorError::WorkflowExecution {
            workflow_id: workflow.id,
            reason,
        };

        let room = self.room(&workflow.chat_room_id).map_err(|e| failed(e.to_string()))?;
        let agent = self
            .store
            .get_agent_by_id(&workflow.agent_id)?
            .ok_or_else(|| failed(ActorError::AgentConfigNotFound(workflow.agent_id).to_string()))?;

        self.invoke_agent(&agent, &room, None, TurnMode::Workflow(workflow))
            .await
            .map_err(|e| failed(e.to_string()))?;
        Ok(())
    }

    pub(crate) fn broadcast_workflows(&self, room_id: &RoomId) -> Result<()> {
        let workflows = self.store.list_workflows_by_room(room_id)?;
        self.sessions.broadcast_to_room(
            room_id,
            &ServerMessage::ChatRoomWorkflowsUpdate {
                room_id: *room_id,
                workflows,
            },
            None,
        );
        Ok(())
    }
}
