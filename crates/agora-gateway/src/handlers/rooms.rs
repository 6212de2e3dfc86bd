//! Chat room administration endpoints.
//!
//! Each handler is a request to the organization's actor, which persists
//! the change and pushes the matching update to connected clients.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use agora_actor::{CreateChatRoomRequest, NewMember};
use agora_core::{MemberId, RoomId};
use agora_store::{ChatRoom, ChatRoomMember, MemberRole, RoomType, Store};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::parse_id;
use crate::state::GatewayState;

/// Request to create a room. The caller becomes its owner.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomBody {
    /// Human-readable name.
    pub name: String,
    /// Visibility.
    #[serde(default, rename = "type")]
    pub room_type: RoomType,
    /// How the caller appears in the member list. Defaults to the user id.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Create a room owned by the caller.
///
/// # Errors
///
/// Returns an error if the name is blank or the actor rejects the request.
pub async fn create_room<S: Store + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    user: AuthUser,
    Json(body): Json<CreateRoomBody>,
) -> Result<(StatusCode, Json<ChatRoom>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("room name is required".to_string()));
    }

    let display_name = body
        .display_name
        .unwrap_or_else(|| user.user_id.to_string());
    let request = CreateChatRoomRequest {
        name: body.name,
        room_type: body.room_type,
        creator: NewMember::user(user.user_id, display_name, MemberRole::Owner),
    };

    let room = state
        .hub
        .create_chat_room(user.organization_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// Add a user or agent to a room.
///
/// # Errors
///
/// Returns `ApiError::NotFound` for an unknown room or agent profile.
pub async fn add_member<S: Store + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    user: AuthUser,
    Path(room_id): Path<String>,
    Json(member): Json<NewMember>,
) -> Result<(StatusCode, Json<ChatRoomMember>), ApiError> {
    let room_id: RoomId = parse_id("room", &room_id)?;

    let member = state
        .hub
        .add_chat_room_member(user.organization_id, room_id, member)
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

/// Remove a member from a room.
///
/// # Errors
///
/// Returns `ApiError::NotFound` if the room or the membership is missing.
pub async fn delete_member<S: Store + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    user: AuthUser,
    Path((room_id, member_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let room_id: RoomId = parse_id("room", &room_id)?;
    let member_id: MemberId = parse_id("member", &member_id)?;

    state
        .hub
        .delete_chat_room_member(user.organization_id, room_id, member_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
