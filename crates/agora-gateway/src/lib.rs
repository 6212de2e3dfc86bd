//! HTTP and WebSocket gateway for agora.
//!
//! This crate is the network edge of the chat service. It handles:
//!
//! - Caller identity from trusted upstream headers
//! - WebSocket sessions, bridged to the organization actors
//! - REST endpoints for rooms, members, workflows and agent profiles
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                              │
//! │                   (HTTP / WebSocket)                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      agora-gateway                          │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Identity   │ │   Router    │ │    WebSocket        │    │
//! │  │  Extractor  │ │  + Handlers │ │    Bridge           │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                  ┌──────────────────────┐
//!                  │  Hub ──▶ OrgActor(s) │
//!                  └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use agora_actor::{ActorConfig, Hub, ToolRegistry};
//! use agora_gateway::{create_router, GatewayConfig, GatewayState};
//! use agora_model::{HttpModel, ModelConfig};
//! use agora_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/agora")?);
//! let model = Arc::new(HttpModel::new(ModelConfig::default())?);
//! let tools = Arc::new(ToolRegistry::new(None)?);
//! let hub = Arc::new(Hub::new(store, model, tools, ActorConfig::default()));
//!
//! let state = GatewayState::new(hub, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use auth::AuthUser;
pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;
