//! Session registry and broadcast bus.
//!
//! A [`Connection`] is the actor's handle on one WebSocket: an outbound
//! queue drained by the socket's writer task, plus a small attachment slot
//! holding the serialized [`Session`]. The attachment lives as long as the
//! socket, so a freshly spawned actor can rebuild its registry from the
//! connections that are still open.

use std::collections::HashMap;
use std::sync::Arc;

use agora_core::{ConnectionId, RoomId, UserId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

/// Per-connection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The authenticated user.
    pub user_id: UserId,
    /// Room (or thread's room) the client last opened.
    pub active_room_id: Option<RoomId>,
}

/// A live WebSocket as seen by the actor.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    outbound: mpsc::UnboundedSender<String>,
    attachment: Arc<Mutex<Option<String>>>,
}

impl Connection {
    /// Wrap the outbound queue of a socket owned by `user_id`.
    #[must_use]
    pub fn new(user_id: UserId, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: ConnectionId::generate(),
            user_id,
            outbound,
            attachment: Arc::new(Mutex::new(None)),
        }
    }

    /// The connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// The user the socket was opened for.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Queue a text frame. Returns false if the socket is gone.
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }

    /// Returns true once the socket's writer has shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Serialize a session onto the connection.
    pub fn attach(&self, session: &Session) {
        match serde_json::to_string(session) {
            Ok(data) => *self.attachment.lock() = Some(data),
            Err(e) => tracing::warn!(connection_id = %self.id, error = %e, "Failed to attach session"),
        }
    }

    /// The session previously attached to this connection, if readable.
    #[must_use]
    pub fn attachment(&self) -> Option<Session> {
        let data = self.attachment.lock().clone()?;
        serde_json::from_str(&data).ok()
    }
}

#[derive(Debug)]
struct Entry {
    connection: Connection,
    session: Session,
}

/// The actor's table of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: HashMap<ConnectionId, Entry>,
    room_scoped: bool,
}

impl SessionRegistry {
    /// An empty registry.
    ///
    /// With `room_scoped` set, room broadcasts only reach sessions whose
    /// active room is that room; otherwise they reach every session.
    #[must_use]
    pub fn new(room_scoped: bool) -> Self {
        Self {
            entries: HashMap::new(),
            room_scoped,
        }
    }

    /// Register a freshly upgraded connection with no active room.
    pub fn register(&mut self, connection: Connection) -> Session {
        let session = Session {
            user_id: connection.user_id(),
            active_room_id: None,
        };
        connection.attach(&session);

        self.entries.insert(
            connection.id(),
            Entry {
                connection,
                session: session.clone(),
            },
        );
        session
    }

    /// Drop a connection. Returns its session if it was registered.
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<Session> {
        self.entries.remove(connection_id).map(|e| e.session)
    }

    /// Rebuild sessions from still-open connections.
    ///
    /// Connections whose attachment is missing or unreadable are registered
    /// fresh. Returns the number of sessions restored from attachments.
    pub fn rehydrate(&mut self, connections: impl IntoIterator<Item = Connection>) -> usize {
        let mut restored = 0;
        for connection in connections {
            if connection.is_closed() {
                continue;
            }
            match connection.attachment() {
                Some(session) if session.user_id == connection.user_id() => {
                    restored += 1;
                    self.entries.insert(
                        connection.id(),
                        Entry {
                            connection,
                            session,
                        },
                    );
                }
                _ => {
                    self.register(connection);
                }
            }
        }
        restored
    }

    /// The session of a connection.
    #[must_use]
    pub fn get(&self, connection_id: &ConnectionId) -> Option<&Session> {
        self.entries.get(connection_id).map(|e| &e.session)
    }

    /// Record the room a connection opened.
    pub fn set_active_room(&mut self, connection_id: &ConnectionId, room_id: RoomId) {
        if let Some(entry) = self.entries.get_mut(connection_id) {
            entry.session.active_room_id = Some(room_id);
            entry.connection.attach(&entry.session);
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Send to one connection.
    pub fn send_to_connection(&self, connection_id: &ConnectionId, message: &ServerMessage) {
        let Some(entry) = self.entries.get(connection_id) else {
            return;
        };
        if let Some(text) = encode(message) {
            entry.connection.send(text);
        }
    }

    /// Send to every connection of a user. Returns the number of deliveries.
    pub fn send_to_user(&self, user_id: &UserId, message: &ServerMessage) -> usize {
        self.deliver(message, |session| session.user_id == *user_id)
    }

    /// Fan a message out to a room, optionally skipping one user.
    /// Returns the number of deliveries.
    pub fn broadcast_to_room(
        &self,
        room_id: &RoomId,
        message: &ServerMessage,
        exclude: Option<&UserId>,
    ) -> usize {
        let room_scoped = self.room_scoped;
        self.deliver(message, |session| {
            if exclude == Some(&session.user_id) {
                return false;
            }
            !room_scoped || session.active_room_id.as_ref() == Some(room_id)
        })
    }

    fn deliver(&self, message: &ServerMessage, filter: impl Fn(&Session) -> bool) -> usize {
        let Some(text) = encode(message) else {
            return 0;
        };

        self.entries
            .values()
            .filter(|e| filter(&e.session))
            .filter(|e| e.connection.send(text.clone()))
            .count()
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match message.to_text() {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(user_id: UserId) -> (Connection, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(user_id, tx), rx)
    }

    fn ping() -> ServerMessage {
        ServerMessage::Error {
            error: "ping".into(),
        }
    }

    #[test]
    fn register_attaches_session() {
        let mut registry = SessionRegistry::new(false);
        let user_id = UserId::generate();
        let (conn, _rx) = open(user_id);

        let session = registry.register(conn.clone());
        assert_eq!(session.active_room_id, None);
        assert_eq!(conn.attachment().unwrap().user_id, user_id);

        let room_id = RoomId::generate();
        registry.set_active_room(&conn.id(), room_id);
        assert_eq!(conn.attachment().unwrap().active_room_id, Some(room_id));
    }

    #[test]
    fn broadcast_reaches_every_session_by_default() {
        let mut registry = SessionRegistry::new(false);
        let (a, mut rx_a) = open(UserId::generate());
        let (b, mut rx_b) = open(UserId::generate());
        registry.register(a.clone());
        registry.register(b);
        registry.set_active_room(&a.id(), RoomId::generate());

        let delivered = registry.broadcast_to_room(&RoomId::generate(), &ping(), None);
        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn room_scoped_broadcast_filters_by_active_room() {
        let mut registry = SessionRegistry::new(true);
        let room_id = RoomId::generate();
        let (a, mut rx_a) = open(UserId::generate());
        let (b, mut rx_b) = open(UserId::generate());
        registry.register(a.clone());
        registry.register(b);
        registry.set_active_room(&a.id(), room_id);

        assert_eq!(registry.broadcast_to_room(&room_id, &ping(), None), 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn broadcast_can_exclude_a_user() {
        let mut registry = SessionRegistry::new(false);
        let sender = UserId::generate();
        let (a, mut rx_a) = open(sender);
        let (b, _rx_b) = open(UserId::generate());
        registry.register(a);
        registry.register(b);

        assert_eq!(
            registry.broadcast_to_room(&RoomId::generate(), &ping(), Some(&sender)),
            1
        );
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn send_to_user_hits_all_their_connections() {
        let mut registry = SessionRegistry::new(false);
        let user_id = UserId::generate();
        let (a, _rx_a) = open(user_id);
        let (b, _rx_b) = open(user_id);
        let (c, _rx_c) = open(UserId::generate());
        registry.register(a);
        registry.register(b);
        registry.register(c);

        assert_eq!(registry.send_to_user(&user_id, &ping()), 2);
    }

    #[test]
    fn sending_to_closed_connection_is_a_no_op() {
        let mut registry = SessionRegistry::new(false);
        let user_id = UserId::generate();
        let (conn, rx) = open(user_id);
        registry.register(conn);
        drop(rx);

        assert_eq!(registry.send_to_user(&user_id, &ping()), 0);
    }

    #[test]
    fn rehydrate_restores_attached_sessions() {
        let mut original = SessionRegistry::new(false);
        let room_id = RoomId::generate();
        let (a, _rx_a) = open(UserId::generate());
        let (b, _rx_b) = open(UserId::generate());
        let (closed, rx_closed) = open(UserId::generate());
        original.register(a.clone());
        original.set_active_room(&a.id(), room_id);
        original.register(closed.clone());
        drop(rx_closed);

        let mut fresh = SessionRegistry::new(false);
        let restored = fresh.rehydrate([a.clone(), b.clone(), closed]);
        assert_eq!(restored, 1);
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh.get(&a.id()).unwrap().active_room_id, Some(room_id));
        assert_eq!(fresh.get(&b.id()).unwrap().active_room_id, None);
    }

    #[test]
    fn unregister_removes_session() {
        let mut registry = SessionRegistry::new(false);
        let (conn, _rx) = open(UserId::generate());
        registry.register(conn.clone());
        assert!(registry.unregister(&conn.id()).is_some());
        assert!(registry.is_empty());
        assert!(registry.unregister(&conn.id()).is_none());
    }
}
