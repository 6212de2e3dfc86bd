//! Request types sent to the language model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of a streamed, tool-augmented generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRequest {
    /// System prompt.
    pub system: String,
    /// Conversation so far.
    pub messages: Vec<PromptMessage>,
    /// Tools the model may call.
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

/// A message in the model prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum PromptMessage {
    /// Input from a person, or a synthesized instruction.
    User {
        /// Text content.
        content: String,
    },
    /// A previous model turn.
    Assistant {
        /// Text content.
        content: String,
        /// Tool calls the model made in that turn.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallPart>,
    },
    /// The result of a tool call, fed back to the model.
    Tool {
        /// Call id this result answers.
        tool_call_id: String,
        /// Name of the tool.
        tool_name: String,
        /// Result payload.
        result: Value,
    },
}

impl PromptMessage {
    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// An assistant message without tool calls.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// A tool call inside an assistant prompt message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPart {
    /// Call id.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Arguments.
    pub args: Value,
}

/// A tool advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
}

/// A structured-output request: the model must answer with a JSON value
/// matching `schema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRequest {
    /// System prompt.
    pub system: String,
    /// User prompt.
    pub prompt: String,
    /// JSON schema of the expected object.
    pub schema: Value,
}
