//! HTTP client for the language model service.
//!
//! The model service exposes two endpoints:
//!
//! - `POST /v1/stream`: one generation step, answered with a newline-delimited
//!   frame stream (see [`crate::frame`])
//! - `POST /v1/object`: structured output, answered with `{"object": ...}`

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::frame::{decode_frame, StreamEvent};
use crate::types::{ObjectRequest, PromptMessage, StepRequest, ToolDefinition};
use crate::ModelConfig;

/// A stream of decoded events for one model step.
pub type FrameStream = BoxStream<'static, Result<StreamEvent>>;

/// Trait for language model access.
///
/// This trait abstracts the model so the actor can be driven by a scripted
/// implementation in tests.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one generation step and stream its events.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started. Errors while the
    /// stream is being read are yielded as stream items.
    async fn stream_step(&self, request: &StepRequest) -> Result<FrameStream>;

    /// Generate a JSON object matching the request's schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    async fn generate_object(&self, request: &ObjectRequest) -> Result<Value>;
}

/// HTTP client for the model service.
#[derive(Debug, Clone)]
pub struct HttpModel {
    client: reqwest::Client,
    config: ModelConfig,
}

impl HttpModel {
    /// Create a new model client.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Config` if the HTTP client cannot be created.
    pub fn new(config: ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ModelError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create a new model client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: ModelConfig) -> Self {
        Self { client, config }
    }

    /// Get the client configuration.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        let builder = self.client.post(url);
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| status.to_string());

        tracing::warn!(status = %status, error = %message, "Model service rejected request");

        Err(ModelError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// Request body for a streamed step.
#[derive(Serialize)]
struct StreamBody<'a> {
    model: &'a str,
    system: &'a str,
    messages: &'a [PromptMessage],
    tools: &'a [ToolDefinition],
}

/// Request body for structured output.
#[derive(Serialize)]
struct ObjectBody<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    schema: &'a Value,
}

#[derive(Deserialize)]
struct ObjectResponse {
    object: Value,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[async_trait]
impl LanguageModel for HttpModel {
    async fn stream_step(&self, request: &StepRequest) -> Result<FrameStream> {
        let body = StreamBody {
            model: &self.config.model,
            system: &request.system,
            messages: &request.messages,
            tools: &request.tools,
        };

        let response = self
            .post("/v1/stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;
        let response = Self::check_status(response).await?;

        tracing::debug!(
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Model step started"
        );

        let chunks = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| ModelError::Request(e.to_string()))
            })
            .boxed();

        Ok(frame_lines(chunks))
    }

    async fn generate_object(&self, request: &ObjectRequest) -> Result<Value> {
        let body = ObjectBody {
            model: &self.config.model,
            system: &request.system,
            prompt: &request.prompt,
            schema: &request.schema,
        };

        let response = self
            .post("/v1/object")
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let parsed: ObjectResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Ok(parsed.object)
    }
}

struct LineReader {
    chunks: BoxStream<'static, Result<Vec<u8>>>,
    buffer: Vec<u8>,
    finished: bool,
}

fn decode_bytes(line: &[u8]) -> Result<Option<StreamEvent>> {
    let text = std::str::from_utf8(line)
        .map_err(|e| ModelError::InvalidFrame(format!("frame is not UTF-8: {e}")))?;
    decode_frame(text)
}

/// Split a chunked byte stream into lines and decode each as a frame.
///
/// Chunk boundaries may fall anywhere, including inside a multi-byte
/// character. Ignored frame types are skipped.
#[must_use]
pub fn frame_lines(chunks: BoxStream<'static, Result<Vec<u8>>>) -> FrameStream {
    let reader = LineReader {
        chunks,
        buffer: Vec::new(),
        finished: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(pos) = reader.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = reader.buffer.drain(..=pos).collect();
                match decode_bytes(&line[..pos]) {
                    Ok(Some(event)) => return Some((Ok(event), reader)),
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), reader)),
                }
            }

            if reader.finished {
                if reader.buffer.is_empty() {
                    return None;
                }
                let line = std::mem::take(&mut reader.buffer);
                return match decode_bytes(&line) {
                    Ok(Some(event)) => Some((Ok(event), reader)),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), reader)),
                };
            }

            match reader.chunks.next().await {
                Some(Ok(chunk)) => reader.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    reader.finished = true;
                    reader.buffer.clear();
                    return Some((Err(e), reader));
                }
                None => reader.finished = true,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> ModelConfig {
        ModelConfig {
            base_url: server.uri(),
            api_key: Some("secret".into()),
            model: "test-model".into(),
            request_timeout_secs: 5,
        }
    }

    fn chunked(parts: &[&str]) -> BoxStream<'static, Result<Vec<u8>>> {
        let owned: Vec<Result<Vec<u8>>> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned).boxed()
    }

    #[tokio::test]
    async fn frame_lines_reassembles_split_chunks() {
        let events: Vec<_> = frame_lines(chunked(&[
            "f:{\"messageId\":\"m1\"}\n0:\"Hel",
            "lo\"\n2:[]\n",
            "d:{\"finishReason\":\"stop\"}",
        ]))
        .collect()
        .await;

        let events: Vec<StreamEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], StreamEvent::TextDelta("Hello".into()));
        assert!(events[2].is_terminal());
    }

    #[tokio::test]
    async fn frame_lines_surfaces_bad_frames() {
        let mut events = frame_lines(chunked(&["garbage\n0:\"ok\"\n"]));
        assert!(matches!(
            events.next().await,
            Some(Err(ModelError::InvalidFrame(_)))
        ));
        assert_eq!(
            events.next().await.unwrap().unwrap(),
            StreamEvent::TextDelta("ok".into())
        );
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_step_decodes_response_body() {
        let server = MockServer::start().await;
        let body = "f:{\"messageId\":\"m1\"}\n0:\"Hi\"\nd:{\"finishReason\":\"stop\"}\n";
        Mock::given(method("POST"))
            .and(path("/v1/stream"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let model = HttpModel::new(config_for(&server)).unwrap();
        let request = StepRequest {
            system: "be brief".into(),
            messages: vec![PromptMessage::user("hello")],
            tools: Vec::new(),
        };

        let events: Vec<_> = model
            .stream_step(&request)
            .await
            .unwrap()
            .collect::<Vec<_>>()
            .await;
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1].as_ref().unwrap(),
            &StreamEvent::TextDelta("Hi".into())
        );
    }

    #[tokio::test]
    async fn stream_step_maps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/stream"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({"error": "overloaded"})),
            )
            .mount(&server)
            .await;

        let model = HttpModel::new(config_for(&server)).unwrap();
        let request = StepRequest {
            system: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
        };

        let Err(err) = model.stream_step(&request).await else {
            panic!("expected an error");
        };
        assert!(matches!(
            err,
            ModelError::Status { status: 503, ref message } if message == "overloaded"
        ));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn generate_object_returns_object_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/object"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"object": {"agentIds": ["a"]}})),
            )
            .mount(&server)
            .await;

        let model = HttpModel::new(config_for(&server)).unwrap();
        let object = model
            .generate_object(&ObjectRequest {
                system: "route".into(),
                prompt: "[]".into(),
                schema: json!({"type": "object"}),
            })
            .await
            .unwrap();
        assert_eq!(object, json!({"agentIds": ["a"]}));
    }

    #[tokio::test]
    async fn generate_object_rejects_missing_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/object"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"other": 1})))
            .mount(&server)
            .await;

        let model = HttpModel::new(config_for(&server)).unwrap();
        let result = model
            .generate_object(&ObjectRequest {
                system: String::new(),
                prompt: String::new(),
                schema: json!({}),
            })
            .await;
        assert!(matches!(result, Err(ModelError::InvalidResponse(_))));
    }
}
