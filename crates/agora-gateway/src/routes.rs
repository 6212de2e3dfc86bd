//! Router configuration.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use agora_store::Store;

use crate::handlers::{agents, health, rooms, workflows, ws};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Identified by `x-organization-id` / `x-user-id`
/// - `GET /v1/ws` - WebSocket connection
/// - `POST /v1/agents` - Register agent profile
/// - `POST /v1/rooms` - Create room
/// - `POST /v1/rooms/:room_id/members` - Add member
/// - `DELETE /v1/rooms/:room_id/members/:member_id` - Remove member
/// - `POST /v1/rooms/:room_id/workflows` - Schedule workflow
/// - `DELETE /v1/workflows/:workflow_id` - Delete workflow
pub fn create_router<S: Store + 'static>(state: GatewayState<S>) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();
    let state = Arc::new(state);

    let api = Router::new()
        .route("/v1/agents", post(agents::create_agent::<S>))
        .route("/v1/rooms", post(rooms::create_room::<S>))
        .route("/v1/rooms/:room_id/members", post(rooms::add_member::<S>))
        .route(
            "/v1/rooms/:room_id/members/:member_id",
            delete(rooms::delete_member::<S>),
        )
        .route(
            "/v1/rooms/:room_id/workflows",
            post(workflows::create_workflow::<S>),
        )
        .route(
            "/v1/workflows/:workflow_id",
            delete(workflows::delete_workflow::<S>),
        )
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(max_body_bytes))
                .layer(TimeoutLayer::new(request_timeout)),
        );

    Router::new()
        .route("/health", get(health::health::<S>))
        // Upgraded sockets outlive any request timeout.
        .route("/v1/ws", get(ws::websocket_handler::<S>))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use agora_actor::{ActorConfig, Hub, ToolRegistry};
    use agora_core::{OrganizationId, UserId};
    use agora_model::ScriptedModel;
    use agora_store::RocksStore;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use crate::auth::{ORGANIZATION_HEADER, USER_HEADER};
    use crate::config::GatewayConfig;

    struct Fixture {
        server: TestServer,
        org: OrganizationId,
        user: UserId,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let hub = Hub::new(
            store,
            Arc::new(ScriptedModel::new()),
            Arc::new(ToolRegistry::new(None).unwrap()),
            ActorConfig::default(),
        );
        let state = GatewayState::new(Arc::new(hub), GatewayConfig::default());

        Fixture {
            server: TestServer::new(create_router(state)).unwrap(),
            org: OrganizationId::generate(),
            user: UserId::generate(),
            _dir: dir,
        }
    }

    fn identity(fixture: &Fixture) -> [(HeaderName, HeaderValue); 2] {
        [
            (
                HeaderName::from_static(ORGANIZATION_HEADER),
                HeaderValue::from_str(&fixture.org.to_string()).unwrap(),
            ),
            (
                HeaderName::from_static(USER_HEADER),
                HeaderValue::from_str(&fixture.user.to_string()).unwrap(),
            ),
        ]
    }

    async fn post_json(fixture: &Fixture, path: &str, body: &Value) -> axum_test::TestResponse {
        let [(org_name, org_value), (user_name, user_value)] = identity(fixture);
        fixture
            .server
            .post(path)
            .add_header(org_name, org_value)
            .add_header(user_name, user_value)
            .json(body)
            .await
    }

    async fn create_room(fixture: &Fixture) -> Value {
        let response = post_json(fixture, "/v1/rooms", &json!({"name": "general"})).await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()
    }

    #[test]
    fn cors_any_origin() {
        let _layer = build_cors_layer(&["*".to_string()]);
    }

    #[tokio::test]
    async fn health_is_public() {
        let fixture = fixture();
        let response = fixture.server.get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "healthy");
    }

    #[tokio::test]
    async fn requests_without_identity_are_rejected() {
        let fixture = fixture();
        let response = fixture
            .server
            .post("/v1/rooms")
            .json(&json!({"name": "general"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["error"]["code"], "unauthorized");

        fixture
            .server
            .get("/v1/ws")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_room_makes_caller_owner() {
        let fixture = fixture();
        let room = create_room(&fixture).await;

        assert_eq!(room["name"], "general");
        assert_eq!(room["type"], "public");
        assert_eq!(room["organizationId"], fixture.org.to_string());

        let health = fixture.server.get("/health").await.json::<Value>();
        assert_eq!(health["activeActors"], 1);
    }

    #[tokio::test]
    async fn agent_can_join_and_leave_room() {
        let fixture = fixture();
        let room = create_room(&fixture).await;
        let room_id = room["id"].as_str().unwrap();

        let agent = post_json(&fixture, "/v1/agents", &json!({"name": "Scout"})).await;
        agent.assert_status(StatusCode::CREATED);
        let agent_id = agent.json::<Value>()["id"].as_str().unwrap().to_string();

        let member = post_json(
            &fixture,
            &format!("/v1/rooms/{room_id}/members"),
            &json!({"id": agent_id, "type": "agent"}),
        )
        .await;
        member.assert_status(StatusCode::CREATED);
        assert_eq!(member.json::<Value>()["name"], "Scout");

        let [(org_name, org_value), (user_name, user_value)] = identity(&fixture);
        let path = format!("/v1/rooms/{room_id}/members/{agent_id}");
        fixture
            .server
            .delete(&path)
            .add_header(org_name.clone(), org_value.clone())
            .add_header(user_name.clone(), user_value.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);

        fixture
            .server
            .delete(&path)
            .add_header(org_name, org_value)
            .add_header(user_name, user_value)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_agent_cannot_join() {
        let fixture = fixture();
        let room = create_room(&fixture).await;
        let room_id = room["id"].as_str().unwrap();

        let response = post_json(
            &fixture,
            &format!("/v1/rooms/{room_id}/members"),
            &json!({"id": agora_core::AgentId::generate().to_string(), "type": "agent"}),
        )
        .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn workflow_lifecycle() {
        let fixture = fixture();
        let room = create_room(&fixture).await;
        let room_id = room["id"].as_str().unwrap();
        let agent = post_json(&fixture, "/v1/agents", &json!({"name": "Scout"})).await;
        let agent_id = agent.json::<Value>()["id"].as_str().unwrap().to_string();

        let created = post_json(
            &fixture,
            &format!("/v1/rooms/{room_id}/workflows"),
            &json!({
                "agentId": agent_id,
                "goal": "Post a digest",
                "scheduleExpression": "2099-01-01T00:00:00Z"
            }),
        )
        .await;
        created.assert_status(StatusCode::CREATED);
        let workflow = created.json::<Value>();
        assert_eq!(workflow["isRecurring"], false);
        assert_eq!(workflow["isActive"], true);

        let [(org_name, org_value), (user_name, user_value)] = identity(&fixture);
        let workflow_id = workflow["id"].as_str().unwrap();
        fixture
            .server
            .delete(&format!("/v1/workflows/{workflow_id}"))
            .add_header(org_name, org_value)
            .add_header(user_name, user_value)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn past_schedule_is_bad_request() {
        let fixture = fixture();
        let room = create_room(&fixture).await;
        let room_id = room["id"].as_str().unwrap();
        let agent = post_json(&fixture, "/v1/agents", &json!({"name": "Scout"})).await;
        let agent_id = agent.json::<Value>()["id"].as_str().unwrap().to_string();

        let response = post_json(
            &fixture,
            &format!("/v1/rooms/{room_id}/workflows"),
            &json!({
                "agentId": agent_id,
                "goal": "Too late",
                "scheduleExpression": "2001-01-01T00:00:00Z"
            }),
        )
        .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn malformed_path_id_is_bad_request() {
        let fixture = fixture();
        let [(org_name, org_value), (user_name, user_value)] = identity(&fixture);
        fixture
            .server
            .delete("/v1/workflows/not-a-uuid")
            .add_header(org_name, org_value)
            .add_header(user_name, user_value)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
