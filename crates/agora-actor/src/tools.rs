//! Tools available to agents.
//!
//! Two tools are built into the actor and executed against its own state:
//! [`SCHEDULE_WORKFLOW`] and [`CREATE_MESSAGE_THREAD`]. Everything else is a
//! [`RemoteTool`]: an HTTP endpoint that takes the model's JSON arguments as
//! the request body and answers with a JSON result.
//!
//! Remote tool calls carry no request timeout.

use std::time::Duration;

use agora_model::ToolDefinition;
use serde_json::{json, Value};

use crate::error::{ActorError, Result};

/// Name of the built-in tool that schedules a workflow.
pub const SCHEDULE_WORKFLOW: &str = "schedule-workflow";

/// Name of the built-in tool that opens a thread for the rest of the turn.
pub const CREATE_MESSAGE_THREAD: &str = "create-message-thread";

/// Definition of [`SCHEDULE_WORKFLOW`].
#[must_use]
pub fn schedule_workflow_definition() -> ToolDefinition {
    ToolDefinition {
        name: SCHEDULE_WORKFLOW.to_string(),
        description: "Schedule a task for yourself to perform later in this room, either once \
                      at a future time or repeatedly on a cron schedule."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "scheduleExpression": {
                    "type": "string",
                    "description": "A 5-field cron expression in UTC (e.g. \"0 9 * * 1\") \
                                    or an ISO 8601 timestamp in the future"
                },
                "goal": {
                    "type": "string",
                    "description": "What the scheduled run should achieve"
                },
                "steps": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "description": {"type": "string"},
                            "tool": {"type": "string"}
                        },
                        "required": ["description"]
                    }
                }
            },
            "required": ["scheduleExpression", "goal"]
        }),
    }
}

/// Definition of [`CREATE_MESSAGE_THREAD`].
#[must_use]
pub fn create_message_thread_definition() -> ToolDefinition {
    ToolDefinition {
        name: CREATE_MESSAGE_THREAD.to_string(),
        description: "Start a new thread in the room. Everything you write after calling this \
                      tool is posted as a reply in that thread."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Opening message of the thread"
                }
            },
            "required": ["title"]
        }),
    }
}

/// An HTTP JSON tool.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
    /// Tool name exposed to the model.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
    /// Endpoint receiving the arguments as a POST body.
    pub url: String,
}

impl RemoteTool {
    /// Web search.
    #[must_use]
    pub fn search(url: impl Into<String>) -> Self {
        Self {
            name: "search".to_string(),
            description: "Search the web and return the most relevant results.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
            url: url.into(),
        }
    }

    /// Multi-source research on a topic.
    #[must_use]
    pub fn research(url: impl Into<String>) -> Self {
        Self {
            name: "research".to_string(),
            description: "Research a topic in depth and return a sourced summary.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"topic": {"type": "string"}},
                "required": ["topic"]
            }),
            url: url.into(),
        }
    }

    /// Fetch and extract a web page.
    #[must_use]
    pub fn crawl(url: impl Into<String>) -> Self {
        Self {
            name: "crawl".to_string(),
            description: "Fetch a web page and return its readable content.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"url": {"type": "string"}},
                "required": ["url"]
            }),
            url: url.into(),
        }
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// The remote tools configured for a deployment.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    client: reqwest::Client,
    api_key: Option<String>,
    tools: Vec<RemoteTool>,
}

impl ToolRegistry {
    /// An empty registry.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::Internal` if the HTTP client cannot be built.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ActorError::Internal(format!("failed to build tool client: {e}")))?;

        Ok(Self::with_client(client, api_key))
    }

    /// An empty registry using the given HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            tools: Vec::new(),
        }
    }

    /// Add a tool, replacing any tool with the same name.
    #[must_use]
    pub fn register(mut self, tool: RemoteTool) -> Self {
        self.tools.retain(|t| t.name != tool.name);
        self.tools.push(tool);
        self
    }

    /// Definitions of all registered tools.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(RemoteTool::definition).collect()
    }

    /// Returns true if a tool with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    /// Call a tool.
    ///
    /// Failures are returned as `{"success": false, "error": ...}` so the
    /// model can read them.
    pub async fn execute(&self, name: &str, args: &Value) -> Value {
        let Some(tool) = self.tools.iter().find(|t| t.name == name) else {
            return failure(format!("unknown tool: {name}"));
        };

        let mut request = self.client.post(&tool.url).json(args);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool request failed");
                return failure(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(tool = %name, status = %status, "Tool returned error status");
            return failure(format!("{name} returned {status}: {body}"));
        }

        match response.json::<Value>().await {
            Ok(result) => result,
            Err(e) => failure(format!("invalid response from {name}: {e}")),
        }
    }
}

/// A tool failure payload.
pub(crate) fn failure(error: impl Into<String>) -> Value {
    json!({"success": false, "error": error.into()})
}
