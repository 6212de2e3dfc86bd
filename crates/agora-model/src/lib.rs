//! Language model access for agora.
//!
//! The model is a black box that accepts a prompt plus a tool registry and
//! answers with a line-oriented event stream. This crate provides:
//!
//! - The frame codec for that stream ([`decode_frame`], [`StreamEvent`])
//! - The [`LanguageModel`] trait the actor depends on
//! - [`HttpModel`], the production client
//! - `ScriptedModel` for tests (feature `test-utils`)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Agent Invoker  │────▶│  LanguageModel   │
//! │   / Router       │     │  (trait)         │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │    HttpModel     │
//!                          │    (impl)        │
//!                          └────────┬─────────┘
//!                                   │ HTTP, frame per line
//!                          ┌────────▼─────────┐
//!                          │  Model service   │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use agora_model::{HttpModel, LanguageModel, ModelConfig, PromptMessage, StepRequest};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let model = HttpModel::new(ModelConfig::default())?;
//!
//! let request = StepRequest {
//!     system: "You are a helpful assistant.".to_string(),
//!     messages: vec![PromptMessage::user("Hello!")],
//!     tools: Vec::new(),
//! };
//!
//! let mut events = model.stream_step(&request).await?;
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event?);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod frame;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use client::{frame_lines, FrameStream, HttpModel, LanguageModel};
pub use error::{ModelError, Result};
pub use frame::{decode_frame, StreamEvent};
pub use types::{ObjectRequest, PromptMessage, StepRequest, ToolCallPart, ToolDefinition};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::ScriptedModel;

/// Configuration for the model service client.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Base URL of the model service (e.g., `http://model:8600`).
    pub base_url: String,
    /// Bearer token, if the service requires one.
    pub api_key: Option<String>,
    /// Model name forwarded with every request.
    pub model: String,
    /// Timeout for non-streaming requests, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8600".to_string(),
            api_key: None,
            model: "default".to_string(),
            request_timeout_secs: 30,
        }
    }
}
