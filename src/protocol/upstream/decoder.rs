use crate::util::extract_data_payload;

use super::{UpstreamError, UpstreamEvent, UpstreamUsage};

/// Phase tag carried by every upstream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Thinking,
    Answer,
    Done,
    Other,
}

impl Phase {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "thinking" => Phase::Thinking,
            "answer" => Phase::Answer,
            "done" => Phase::Done,
            _ => Phase::Other,
        }
    }
}

/// One decoded upstream event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
    pub phase: Phase,
    /// `delta_content`, or `edit_content` when the delta is empty.
    pub fragment: String,
    pub is_final: bool,
    pub error: Option<UpstreamError>,
    pub usage: Option<UpstreamUsage>,
}

/// Outcome of decoding one pushed line.
#[derive(Debug)]
pub enum DecodedLine {
    /// Not a `data: ` line, or an empty payload.
    Ignored,
    /// The payload was not a valid event.
    Malformed(serde_json::Error),
    Event(ChatEvent),
}

type ErrorAccessor = fn(&UpstreamEvent) -> Option<&UpstreamError>;

fn top_level_error(event: &UpstreamEvent) -> Option<&UpstreamError> {
    event.error.as_ref()
}

fn data_error(event: &UpstreamEvent) -> Option<&UpstreamError> {
    event.data.error.as_ref()
}

fn inner_data_error(event: &UpstreamEvent) -> Option<&UpstreamError> {
    event.data.data.as_ref().and_then(|inner| inner.error.as_ref())
}

// Checked in order; the first present error wins.
const ERROR_ACCESSORS: [ErrorAccessor; 3] = [top_level_error, data_error, inner_data_error];

#[must_use]
pub fn find_error(event: &UpstreamEvent) -> Option<&UpstreamError> {
    ERROR_ACCESSORS.iter().find_map(|accessor| accessor(event))
}

/// Decode one raw line from the upstream body.
#[must_use]
pub fn decode_line(line: &str) -> DecodedLine {
    let Some(payload) = extract_data_payload(line) else {
        return DecodedLine::Ignored;
    };
    match serde_json::from_str::<UpstreamEvent>(payload) {
        Ok(event) => DecodedLine::Event(into_chat_event(event)),
        Err(err) => DecodedLine::Malformed(err),
    }
}

fn into_chat_event(event: UpstreamEvent) -> ChatEvent {
    let error = find_error(&event).cloned();
    let data = event.data;
    let phase = Phase::parse(&data.phase);
    let fragment = if data.delta_content.is_empty() {
        data.edit_content
    } else {
        data.delta_content
    };
    ChatEvent {
        phase,
        fragment,
        is_final: data.done || phase == Phase::Done,
        error,
        usage: data.usage,
    }
}
