//! Response stream processor.
//!
//! [`StreamDecoder`] turns a model's event stream into chat messages. It is a
//! pure reducer: [`StreamDecoder::apply`] takes one event and returns the
//! effect the caller must carry out. The caller performs the upsert through
//! the message pipeline and reports the assigned id back with
//! [`StreamDecoder::confirm`], so that every later upsert of the same
//! accumulator is an update of that message.
//!
//! ```text
//! step-start ──▶ push accumulator (unsent)
//! text-delta ──▶ append ──▶ Upsert { existing: None }      ──▶ confirm(id)
//! text-delta ──▶ append ──▶ Upsert { existing: Some(id) }
//! tool-call  ──▶ merge  ──▶ Upsert { existing: Some(id) }  (held if omitted)
//! finish     ──▶ Finished
//! ```

use std::collections::HashSet;

use agora_core::MessageId;
use agora_model::StreamEvent;
use agora_store::{Mention, ToolUse, ToolUseKind};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Whether an accumulator has been persisted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// Nothing persisted; the next upsert inserts.
    Unsent,
    /// Persisted as this message; later upserts update it.
    Sent(MessageId),
}

/// The message being built from one model step.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    /// Text so far.
    pub content: String,
    /// Mentions so far.
    pub mentions: Vec<Mention>,
    /// Tool uses in call order.
    pub tool_uses: Vec<ToolUse>,
    /// When the step started.
    pub created_at: DateTime<Utc>,
    /// Persistence state.
    pub state: SendState,
}

impl Accumulator {
    fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            content: String::new(),
            mentions: Vec::new(),
            tool_uses: Vec::new(),
            created_at,
            state: SendState::Unsent,
        }
    }

    fn holds(&self, tool_call_id: &str) -> bool {
        self.tool_uses.iter().any(|t| t.tool_call_id == tool_call_id)
    }

    fn tool_use_or_placeholder(&mut self, tool_call_id: &str) -> &mut ToolUse {
        let index = match self
            .tool_uses
            .iter()
            .position(|t| t.tool_call_id == tool_call_id)
        {
            Some(index) => index,
            None => {
                self.tool_uses
                    .push(ToolUse::call(tool_call_id, String::new(), Value::Null));
                self.tool_uses.len() - 1
            }
        };
        &mut self.tool_uses[index]
    }
}

/// A message write requested by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Upsert {
    /// Index of the accumulator, passed back to [`StreamDecoder::confirm`].
    pub slot: usize,
    /// The message to update, `None` to insert.
    pub existing: Option<MessageId>,
    /// Full content.
    pub content: String,
    /// Full mentions.
    pub mentions: Vec<Mention>,
    /// Tool uses, excluding omitted tools.
    pub tool_uses: Vec<ToolUse>,
    /// Step start time.
    pub created_at: DateTime<Utc>,
}

/// What the caller must do after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEffect {
    /// Persist the accumulator.
    Upsert(Upsert),
    /// The stream finished normally.
    Finished {
        /// Reason reported by the model.
        reason: String,
    },
    /// The model reported an error.
    Failed(String),
}

/// Reducer over a model's event stream for one agent turn.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    accumulators: Vec<Accumulator>,
    omitted: HashSet<String>,
}

impl StreamDecoder {
    /// A decoder that holds tool uses of the named tools locally instead of
    /// persisting them.
    #[must_use]
    pub fn new<I, S>(omitted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accumulators: Vec::new(),
            omitted: omitted.into_iter().map(Into::into).collect(),
        }
    }

    /// All accumulators, in step order.
    #[must_use]
    pub fn accumulators(&self) -> &[Accumulator] {
        &self.accumulators
    }

    /// Record the id an insert returned.
    pub fn confirm(&mut self, slot: usize, message_id: MessageId) {
        if let Some(acc) = self.accumulators.get_mut(slot) {
            acc.state = SendState::Sent(message_id);
        }
    }

    /// Apply one event.
    pub fn apply(&mut self, event: StreamEvent, now: DateTime<Utc>) -> Option<StreamEffect> {
        match event {
            StreamEvent::StepStart { .. } => {
                self.accumulators.push(Accumulator::new(now));
                None
            }
            StreamEvent::TextDelta(delta) => {
                let slot = self.current_slot(now);
                self.accumulators[slot].content.push_str(&delta);
                Some(self.upsert(slot))
            }
            StreamEvent::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => {
                let slot = self.slot_of(&tool_call_id).unwrap_or_else(|| self.current_slot(now));
                let omitted = self.omitted.contains(&tool_name);
                let tool_use = self.accumulators[slot].tool_use_or_placeholder(&tool_call_id);
                tool_use.tool_name = tool_name;
                tool_use.args = args;
                if tool_use.result.is_none() {
                    tool_use.kind = ToolUseKind::ToolCall;
                }
                (!omitted).then(|| self.upsert(slot))
            }
            StreamEvent::ToolResult {
                tool_call_id,
                result,
            } => {
                let slot = self.slot_of(&tool_call_id).unwrap_or_else(|| self.current_slot(now));
                let tool_use = self.accumulators[slot].tool_use_or_placeholder(&tool_call_id);
                tool_use.kind = ToolUseKind::ToolResult;
                tool_use.result = Some(result);
                let omitted = self.omitted.contains(&tool_use.tool_name);
                (!omitted).then(|| self.upsert(slot))
            }
            StreamEvent::Annotation(annotations) => self.annotate(annotations, now),
            StreamEvent::Finish { finish_reason, .. } => Some(StreamEffect::Finished {
                reason: finish_reason,
            }),
            StreamEvent::Error(error) => Some(StreamEffect::Failed(error)),
        }
    }

    fn annotate(&mut self, annotations: Vec<Value>, now: DateTime<Utc>) -> Option<StreamEffect> {
        let mut touched = None;

        for annotation in annotations {
            let Some(tool_call_id) = annotation
                .get("toolCallId")
                .and_then(Value::as_str)
                .map(str::to_owned)
            else {
                tracing::debug!("Dropping annotation without toolCallId");
                continue;
            };

            let slot = self.slot_of(&tool_call_id).unwrap_or_else(|| self.current_slot(now));
            let tool_use = self.accumulators[slot].tool_use_or_placeholder(&tool_call_id);
            tool_use.annotations.push(annotation);
            if !self.omitted.contains(&tool_use.tool_name) {
                touched = Some(slot);
            }
        }

        touched.map(|slot| self.upsert(slot))
    }

    /// The accumulator being streamed, creating one if no step started.
    fn current_slot(&mut self, now: DateTime<Utc>) -> usize {
        if self.accumulators.is_empty() {
            self.accumulators.push(Accumulator::new(now));
        }
        self.accumulators.len() - 1
    }

    /// The newest accumulator holding the given tool call.
    fn slot_of(&self, tool_call_id: &str) -> Option<usize> {
        self.accumulators
            .iter()
            .rposition(|acc| acc.holds(tool_call_id))
    }

    fn upsert(&self, slot: usize) -> StreamEffect {
        let acc = &self.accumulators[slot];
        let existing = match acc.state {
            SendState::Unsent => None,
            SendState::Sent(id) => Some(id),
        };

        StreamEffect::Upsert(Upsert {
            slot,
            existing,
            content: acc.content.clone(),
            mentions: acc.mentions.clone(),
            tool_uses: acc
                .tool_uses
                .iter()
                .filter(|t| !self.omitted.contains(&t.tool_name))
                .cloned()
                .collect(),
            created_at: acc.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const THREAD_TOOL: &str = "create-message-thread";

    fn step_start() -> StreamEvent {
        StreamEvent::StepStart {
            message_id: "m".into(),
        }
    }

    fn text(s: &str) -> StreamEvent {
        StreamEvent::TextDelta(s.into())
    }

    fn call(id: &str, name: &str) -> StreamEvent {
        StreamEvent::ToolCall {
            tool_call_id: id.into(),
            tool_name: name.into(),
            args: json!({"q": 1}),
        }
    }

    fn result(id: &str) -> StreamEvent {
        StreamEvent::ToolResult {
            tool_call_id: id.into(),
            result: json!({"ok": true}),
        }
    }

    /// Feeds events, confirming inserts with sequential ids the way the
    /// pipeline would. Returns (inserts, updated ids).
    fn drive(decoder: &mut StreamDecoder, events: Vec<StreamEvent>) -> (usize, Vec<MessageId>) {
        let now = Utc::now();
        let mut inserts = 0;
        let mut updates = Vec::new();
        let mut next_id = 100;

        for event in events {
            if let Some(StreamEffect::Upsert(upsert)) = decoder.apply(event, now) {
                match upsert.existing {
                    None => {
                        inserts += 1;
                        next_id += 1;
                        decoder.confirm(upsert.slot, MessageId::new(next_id));
                    }
                    Some(id) => updates.push(id),
                }
            }
        }
        (inserts, updates)
    }

    #[test]
    fn one_insert_then_updates_to_the_same_id() {
        let mut decoder = StreamDecoder::new([THREAD_TOOL]);
        let (inserts, updates) = drive(
            &mut decoder,
            vec![
                step_start(),
                text("Hel"),
                text("lo"),
                text("!"),
                call("c1", "search"),
                result("c1"),
                StreamEvent::Finish {
                    finish_reason: "stop".into(),
                    usage: None,
                },
            ],
        );

        assert_eq!(inserts, 1);
        assert_eq!(updates.len(), 4);
        assert!(updates.iter().all(|id| *id == MessageId::new(101)));

        let acc = &decoder.accumulators()[0];
        assert_eq!(acc.content, "Hello!");
        assert_eq!(acc.tool_uses[0].kind, ToolUseKind::ToolResult);
        assert_eq!(acc.tool_uses[0].result, Some(json!({"ok": true})));
    }

    #[test]
    fn each_step_gets_its_own_message() {
        let mut decoder = StreamDecoder::new(Vec::<String>::new());
        let (inserts, _) = drive(
            &mut decoder,
            vec![step_start(), text("a"), step_start(), text("b")],
        );
        assert_eq!(inserts, 2);
        assert_eq!(decoder.accumulators().len(), 2);
    }

    #[test]
    fn omitted_tool_is_held_locally() {
        let mut decoder = StreamDecoder::new([THREAD_TOOL]);
        let now = Utc::now();

        assert_eq!(decoder.apply(step_start(), now), None);
        assert_eq!(decoder.apply(call("t1", THREAD_TOOL), now), None);
        assert_eq!(decoder.apply(result("t1"), now), None);
        assert_eq!(decoder.accumulators()[0].tool_uses.len(), 1);

        let Some(StreamEffect::Upsert(upsert)) = decoder.apply(text("in thread"), now) else {
            panic!("expected an upsert");
        };
        assert_eq!(upsert.existing, None);
        assert!(upsert.tool_uses.is_empty());
    }

    #[test]
    fn early_annotation_creates_placeholder() {
        let mut decoder = StreamDecoder::new(Vec::<String>::new());
        let now = Utc::now();
        decoder.apply(step_start(), now);

        let effect = decoder.apply(
            StreamEvent::Annotation(vec![json!({"toolCallId": "c9", "status": "working"})]),
            now,
        );
        let Some(StreamEffect::Upsert(upsert)) = effect else {
            panic!("expected an upsert");
        };
        assert_eq!(upsert.tool_uses.len(), 1);
        assert_eq!(upsert.tool_uses[0].tool_name, "");
        assert_eq!(upsert.tool_uses[0].annotations.len(), 1);

        // The real call later fills in the placeholder instead of adding one.
        decoder.apply(call("c9", "research"), now);
        let acc = &decoder.accumulators()[0];
        assert_eq!(acc.tool_uses.len(), 1);
        assert_eq!(acc.tool_uses[0].tool_name, "research");
        assert_eq!(acc.tool_uses[0].annotations.len(), 1);
    }

    #[test]
    fn annotation_without_call_id_is_dropped() {
        let mut decoder = StreamDecoder::new(Vec::<String>::new());
        let effect = decoder.apply(StreamEvent::Annotation(vec![json!({"x": 1})]), Utc::now());
        assert_eq!(effect, None);
    }

    #[test]
    fn tool_result_finds_call_from_earlier_step() {
        let mut decoder = StreamDecoder::new(Vec::<String>::new());
        drive(&mut decoder, vec![step_start(), call("c1", "search")]);
        decoder.apply(step_start(), Utc::now());

        let Some(StreamEffect::Upsert(upsert)) = decoder.apply(result("c1"), Utc::now()) else {
            panic!("expected an upsert");
        };
        assert_eq!(upsert.slot, 0);
        assert!(upsert.existing.is_some());
    }

    #[test]
    fn terminal_events_do_not_mutate() {
        let mut decoder = StreamDecoder::new(Vec::<String>::new());
        let now = Utc::now();
        assert_eq!(
            decoder.apply(StreamEvent::Error("boom".into()), now),
            Some(StreamEffect::Failed("boom".into()))
        );
        assert!(decoder.accumulators().is_empty());
    }
}
