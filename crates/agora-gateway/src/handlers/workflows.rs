//! Workflow scheduling endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use agora_actor::CreateWorkflowRequest;
use agora_core::{AgentId, RoomId, WorkflowId};
use agora_store::{Store, Workflow, WorkflowStep};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::parse_id;
use crate::state::GatewayState;

/// Request to schedule a workflow in a room.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowBody {
    /// Agent that runs the workflow.
    pub agent_id: AgentId,
    /// What the run should achieve.
    pub goal: String,
    /// Ordered plan.
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    /// A 5-field cron expression or a future RFC 3339 timestamp.
    pub schedule_expression: String,
}

/// Schedule a workflow.
///
/// ```text
/// POST /v1/rooms/:room_id/workflows
/// { "agentId": "...", "goal": "Morning digest", "scheduleExpression": "0 9 * * 1" }
///
/// Response: 201 Created, the stored workflow with its first due time
/// ```
///
/// # Errors
///
/// Returns `ApiError::BadRequest` for an unparseable or past schedule and
/// `ApiError::NotFound` for an unknown room or agent.
pub async fn create_workflow<S: Store + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    user: AuthUser,
    Path(room_id): Path<String>,
    Json(body): Json<CreateWorkflowBody>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let room_id: RoomId = parse_id("room", &room_id)?;
    let request = CreateWorkflowRequest {
        chat_room_id: room_id,
        agent_id: body.agent_id,
        goal: body.goal,
        steps: body.steps,
        schedule_expression: body.schedule_expression,
    };

    let workflow = state
        .hub
        .create_workflow(user.organization_id, request)
        .await?;

    tracing::info!(
        org_id = %user.organization_id,
        workflow_id = %workflow.id,
        next_execution_time = %workflow.next_execution_time,
        "Workflow scheduled"
    );
    Ok((StatusCode::CREATED, Json(workflow)))
}

/// Delete a workflow.
///
/// # Errors
///
/// Returns `ApiError::NotFound` if the workflow is not in the caller's
/// organization.
pub async fn delete_workflow<S: Store + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    user: AuthUser,
    Path(workflow_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let workflow_id: WorkflowId = parse_id("workflow", &workflow_id)?;

    state
        .hub
        .delete_workflow(user.organization_id, workflow_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
