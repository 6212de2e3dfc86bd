//! Scripted model for tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;

use crate::client::{FrameStream, LanguageModel};
use crate::error::{ModelError, Result};
use crate::frame::decode_frame;
use crate::types::{ObjectRequest, StepRequest};

/// A model that replays queued frame scripts and object responses.
///
/// Each call to `stream_step` consumes one script; each call to
/// `generate_object` consumes one queued response. Running out of either is
/// an error. All requests are recorded for later inspection.
#[derive(Default)]
pub struct ScriptedModel {
    steps: Mutex<VecDeque<Vec<String>>>,
    objects: Mutex<VecDeque<std::result::Result<Value, String>>>,
    step_requests: Mutex<Vec<StepRequest>>,
    object_requests: Mutex<Vec<ObjectRequest>>,
}

impl ScriptedModel {
    /// Create a model with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the frame lines of one step.
    pub fn push_step<I, S>(&self, frames: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps
            .lock()
            .push_back(frames.into_iter().map(Into::into).collect());
    }

    /// Queue a structured-output response.
    pub fn push_object(&self, object: Value) {
        self.objects.lock().push_back(Ok(object));
    }

    /// Queue a structured-output failure.
    pub fn push_object_error(&self, message: impl Into<String>) {
        self.objects.lock().push_back(Err(message.into()));
    }

    /// Step requests received so far.
    #[must_use]
    pub fn step_requests(&self) -> Vec<StepRequest> {
        self.step_requests.lock().clone()
    }

    /// Object requests received so far.
    #[must_use]
    pub fn object_requests(&self) -> Vec<ObjectRequest> {
        self.object_requests.lock().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn stream_step(&self, request: &StepRequest) -> Result<FrameStream> {
        self.step_requests.lock().push(request.clone());

        let frames = self
            .steps
            .lock()
            .pop_front()
            .ok_or_else(|| ModelError::Request("no scripted step left".into()))?;

        let events: Vec<_> = frames
            .iter()
            .filter_map(|line| decode_frame(line).transpose())
            .collect();

        Ok(stream::iter(events).boxed())
    }

    async fn generate_object(&self, request: &ObjectRequest) -> Result<Value> {
        self.object_requests.lock().push(request.clone());

        match self.objects.lock().pop_front() {
            Some(Ok(object)) => Ok(object),
            Some(Err(message)) => Err(ModelError::Status {
                status: 500,
                message,
            }),
            None => Err(ModelError::Request("no scripted object left".into())),
        }
    }
}
