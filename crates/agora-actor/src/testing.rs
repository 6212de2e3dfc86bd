//! Fixtures shared by the actor tests.

use std::sync::Arc;

use agora_core::{AgentId, OrganizationId, UserId};
use agora_model::ScriptedModel;
use agora_store::{Agent, ChatRoom, MemberRole, RocksStore, RoomType, Store};
use chrono::Utc;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::actor::OrgActor;
use crate::session::Connection;
use crate::tools::ToolRegistry;
use crate::types::{ActorConfig, CreateChatRoomRequest, NewMember};

pub(crate) struct Harness {
    pub actor: OrgActor<RocksStore>,
    pub model: Arc<ScriptedModel>,
    pub room: ChatRoom,
    pub user: UserId,
    pub _dir: TempDir,
}

/// An actor over a fresh store with one room owned by `user`.
pub(crate) fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksStore::open(dir.path()).unwrap());
    let model = Arc::new(ScriptedModel::new());
    let tools = Arc::new(ToolRegistry::with_client(reqwest::Client::new(), None));

    let mut actor = OrgActor::new(
        OrganizationId::generate(),
        store,
        model.clone(),
        tools,
        ActorConfig::default(),
    );

    let user = UserId::generate();
    let room = actor
        .create_chat_room(
            CreateChatRoomRequest {
                name: "general".into(),
                room_type: RoomType::Public,
                creator: NewMember::user(user, "Ada", MemberRole::Owner),
            },
            Utc::now(),
        )
        .unwrap();

    Harness {
        actor,
        model,
        room,
        user,
        _dir: dir,
    }
}

/// Store an agent profile in the actor's organization.
pub(crate) fn agent(actor: &OrgActor<RocksStore>, name: &str, description: &str) -> Agent {
    let agent = Agent {
        id: AgentId::generate(),
        organization_id: actor.org_id(),
        name: name.into(),
        description: Some(description.into()),
        tone: None,
        verbosity: None,
        emoji_usage: None,
        language_style: None,
        created_at: Utc::now(),
    };
    actor.store.put_agent(&agent).unwrap();
    agent
}

/// Store an agent profile and add it to the room.
pub(crate) fn add_agent(
    actor: &mut OrgActor<RocksStore>,
    room: &ChatRoom,
    name: &str,
    description: &str,
) -> Agent {
    let profile = agent(actor, name, description);
    actor
        .add_chat_room_member(&room.id, NewMember::agent(profile.id))
        .unwrap();
    profile
}

/// Owned stream frames for `ScriptedModel::push_step`.
pub(crate) fn frames(lines: &[&str]) -> Vec<String> {
    lines.iter().map(ToString::to_string).collect()
}

/// Every frame queued on a connection, decoded.
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(text) = rx.try_recv() {
        frames.push(serde_json::from_str(&text).unwrap());
    }
    frames
}

impl<S: Store + 'static> OrgActor<S> {
    /// Register a session for `user_id` and return its outbound queue.
    pub(crate) fn connect_test(
        &mut self,
        user_id: UserId,
    ) -> (Connection, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::new(user_id, tx);
        self.sessions.register(connection.clone());
        (connection, rx)
    }
}
