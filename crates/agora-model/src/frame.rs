//! Decoding of the model's event stream.
//!
//! The model streams one frame per line. A frame is a one-character type code,
//! a colon, and a JSON payload:
//!
//! | code | event |
//! |------|-------|
//! | `f`  | step start |
//! | `0`  | text delta |
//! | `9`  | tool call |
//! | `a`  | tool result |
//! | `8`  | message annotations |
//! | `d`  | finish |
//! | `3`  | error |
//!
//! Any other code is a frame this crate does not care about and decodes to
//! `None`.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ModelError, Result};

/// A decoded stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A new model step begins.
    StepStart {
        /// Model-side id of the step's message.
        message_id: String,
    },
    /// A chunk of text for the current step.
    TextDelta(String),
    /// The model requested a tool call.
    ToolCall {
        /// Model-assigned call id.
        tool_call_id: String,
        /// Name of the tool.
        tool_name: String,
        /// Arguments.
        args: Value,
    },
    /// A tool call produced a result.
    ToolResult {
        /// Call id the result belongs to.
        tool_call_id: String,
        /// Result payload.
        result: Value,
    },
    /// Annotations attached to the message being streamed.
    Annotation(Vec<Value>),
    /// The step or turn ended.
    Finish {
        /// Why the model stopped, e.g. `stop` or `tool-calls`.
        finish_reason: String,
        /// Token usage, when reported.
        usage: Option<Value>,
    },
    /// The model reported an error.
    Error(String),
}

impl StreamEvent {
    /// Returns true for events that end a stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error(_))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepStartPayload {
    message_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallPayload {
    tool_call_id: String,
    tool_name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolResultPayload {
    tool_call_id: String,
    #[serde(default)]
    result: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishPayload {
    finish_reason: String,
    #[serde(default)]
    usage: Option<Value>,
}

fn payload<T: serde::de::DeserializeOwned>(code: &str, json: &str) -> Result<T> {
    serde_json::from_str(json)
        .map_err(|e| ModelError::InvalidFrame(format!("bad payload for '{code}': {e}")))
}

/// Decode a single frame line.
///
/// Returns `Ok(None)` for blank lines and for frame types that carry nothing
/// the chat layer uses.
///
/// # Errors
///
/// Returns `ModelError::InvalidFrame` if the line has no type prefix or its
/// payload does not match the type.
pub fn decode_frame(line: &str) -> Result<Option<StreamEvent>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }

    let (code, json) = line
        .split_once(':')
        .ok_or_else(|| ModelError::InvalidFrame(format!("missing type prefix: {line}")))?;

    let event = match code {
        "f" => {
            let p: StepStartPayload = payload(code, json)?;
            StreamEvent::StepStart {
                message_id: p.message_id,
            }
        }
        "0" => StreamEvent::TextDelta(payload(code, json)?),
        "9" => {
            let p: ToolCallPayload = payload(code, json)?;
            StreamEvent::ToolCall {
                tool_call_id: p.tool_call_id,
                tool_name: p.tool_name,
                args: p.args,
            }
        }
        "a" => {
            let p: ToolResultPayload = payload(code, json)?;
            StreamEvent::ToolResult {
                tool_call_id: p.tool_call_id,
                result: p.result,
            }
        }
        "8" => StreamEvent::Annotation(payload(code, json)?),
        "d" => {
            let p: FinishPayload = payload(code, json)?;
            StreamEvent::Finish {
                finish_reason: p.finish_reason,
                usage: p.usage,
            }
        }
        "3" => StreamEvent::Error(payload(code, json)?),
        _ => return Ok(None),
    };

    Ok(Some(event))
}
