//! Agent profile registration.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use agora_actor::CreateAgentRequest;
use agora_store::{Agent, Store};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Register an agent profile in the caller's organization.
///
/// ```text
/// POST /v1/agents
/// { "name": "Scout", "description": "Finds things on the web" }
///
/// Response: 201 Created, the stored profile
/// ```
///
/// # Errors
///
/// Returns an error if the name is blank or the profile cannot be stored.
pub async fn create_agent<S: Store + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    user: AuthUser,
    Json(body): Json<CreateAgentRequest>,
) -> Result<(StatusCode, Json<Agent>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("agent name is required".to_string()));
    }

    let agent = state.hub.register_agent(user.organization_id, body)?;
    Ok((StatusCode::CREATED, Json(agent)))
}
