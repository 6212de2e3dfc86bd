//! WebSocket endpoint.
//!
//! Each socket becomes a connection on its organization's actor. Frames
//! from the client are forwarded to the actor as they arrive; frames the
//! actor queues for the connection are written back by a dedicated task.
//!
//! ```text
//! client ──text──▶ reader ──Hub::frame──▶ OrgActor
//! client ◀──text── writer ◀──unbounded── Connection
//! ```

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use agora_actor::{Hub, ServerMessage};
use agora_core::ConnectionId;
use agora_store::Store;

use crate::auth::AuthUser;
use crate::state::GatewayState;

/// Upgrade to a WebSocket bound to the caller's organization.
pub async fn websocket_handler<S: Store + 'static>(
    user: AuthUser,
    State(state): State<Arc<GatewayState<S>>>,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::info!(
        org_id = %user.organization_id,
        user_id = %user.user_id,
        "WebSocket connection initiated"
    );

    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_websocket(socket, hub, user))
}

/// Drive one upgraded socket until either side closes.
async fn handle_websocket<S: Store + 'static>(socket: WebSocket, hub: Arc<Hub<S>>, user: AuthUser) {
    let org_id = user.organization_id;
    let (mut sink, stream) = socket.split();
    let (outbound, mut queued) = mpsc::unbounded_channel::<String>();

    let connection = match hub.connect(org_id, user.user_id, outbound).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::error!(org_id = %org_id, error = %e, "Failed to register connection");
            if let Ok(text) = ServerMessage::error(&e).to_text() {
                let _ = sink.send(Message::Text(text)).await;
            }
            let _ = sink.close().await;
            return;
        }
    };
    let connection_id = connection.id();
    drop(connection);

    let mut writer = tokio::spawn(async move {
        while let Some(text) = queued.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::select! {
        () = forward_client_frames(stream, &hub, &user, connection_id) => {}
        _ = &mut writer => {
            tracing::debug!(connection_id = %connection_id, "Client stopped accepting frames");
        }
    }

    hub.disconnect(org_id, connection_id).await;
    writer.abort();

    tracing::info!(org_id = %org_id, connection_id = %connection_id, "WebSocket closed");
}

/// Forward text frames to the actor until the client goes away.
async fn forward_client_frames<S: Store + 'static>(
    mut stream: SplitStream<WebSocket>,
    hub: &Hub<S>,
    user: &AuthUser,
    connection_id: ConnectionId,
) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(e) = hub.frame(user.organization_id, connection_id, text).await {
                    tracing::warn!(
                        connection_id = %connection_id,
                        error = %e,
                        "Failed to forward frame"
                    );
                    return;
                }
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %connection_id, "Client closed connection");
                return;
            }
            Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "Error reading from client");
                return;
            }
        }
    }
}
