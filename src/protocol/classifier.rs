//! Event Classifier
//!
//! Parses one stdout line of the CLI's stream-json output, works out its
//! event kind, and decides whether the line is worth writing to the log.
//! Unparseable lines are kept as opaque text and always logged.

use log::debug;
use serde::Deserialize;
use serde_json::Value;

/// Tools whose `content_block_start` carries a path the CLI is about to modify
pub const FILE_MUTATING_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit"];

/// Top-level `type` discriminator of an output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    StreamEvent,
    Result,
    Error,
    System,
    /// Parsed, with a `type` this crate does not interpret (e.g. `assistant`)
    Other(String),
    /// Parsed, but carries no string `type` field
    Untyped,
    /// Not valid JSON; passed through as opaque text
    Unparsed,
}

impl EventKind {
    fn from_type(type_name: Option<&str>) -> Self {
        match type_name {
            None => Self::Untyped,
            Some(t) if t.eq_ignore_ascii_case("result") => Self::Result,
            Some("stream_event") => Self::StreamEvent,
            Some("error") => Self::Error,
            Some("system") => Self::System,
            Some(other) => Self::Other(other.to_string()),
        }
    }
}

/// Nested `event.type` of a `stream_event` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventKind {
    MessageStart,
    MessageDelta,
    MessageStop,
    ContentBlockStart,
    ContentBlockDelta,
    ContentBlockStop,
    Other(String),
}

impl From<&str> for StreamEventKind {
    fn from(value: &str) -> Self {
        match value {
            "message_start" => Self::MessageStart,
            "message_delta" => Self::MessageDelta,
            "message_stop" => Self::MessageStop,
            "content_block_start" => Self::ContentBlockStart,
            "content_block_delta" => Self::ContentBlockDelta,
            "content_block_stop" => Self::ContentBlockStop,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Tool invocation announced by a `content_block_start` stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUse {
    pub name: String,
    pub file_path: Option<String>,
}

impl ToolUse {
    pub fn is_file_mutating(&self) -> bool {
        FILE_MUTATING_TOOLS.contains(&self.name.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    event: NestedEvent,
}

#[derive(Debug, Deserialize)]
struct NestedEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content_block: Option<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

/// A classified output line
#[derive(Debug, Clone)]
pub struct EventLine {
    kind: EventKind,
    value: Option<Value>,
}

impl EventLine {
    /// Parse a raw line; never fails
    pub fn parse(line: &str) -> Self {
        match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                let kind = EventKind::from_type(value.get("type").and_then(Value::as_str));
                Self { kind, value: Some(value) }
            }
            Err(e) => {
                debug!("Failed to parse output line ({}): {}", e, preview(line, 100));
                Self { kind: EventKind::Unparsed, value: None }
            }
        }
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn is_parsed(&self) -> bool {
        self.value.is_some()
    }

    /// A `result` line ends the run
    pub fn is_terminal(&self) -> bool {
        self.kind == EventKind::Result
    }

    /// Nested event kind, for `stream_event` lines only
    pub fn stream_event_kind(&self) -> Option<StreamEventKind> {
        if self.kind != EventKind::StreamEvent {
            return None;
        }
        self.value
            .as_ref()?
            .pointer("/event/type")
            .and_then(Value::as_str)
            .map(StreamEventKind::from)
    }

    /// Whether the line should be persisted to the log.
    ///
    /// Everything is logged except `content_block_delta` stream events, which
    /// arrive once per streamed token.
    pub fn should_log(&self) -> bool {
        match self.kind {
            EventKind::StreamEvent => {
                self.stream_event_kind() != Some(StreamEventKind::ContentBlockDelta)
            }
            _ => true,
        }
    }

    /// The tool invocation carried by a `content_block_start`, if any
    pub fn tool_use(&self) -> Option<ToolUse> {
        if self.kind != EventKind::StreamEvent {
            return None;
        }
        let envelope = StreamEnvelope::deserialize(self.value.as_ref()?).ok()?;
        if envelope.event.kind != "content_block_start" {
            return None;
        }
        let block = envelope.event.content_block?;
        let name = block.name?;
        let file_path = block.input.as_ref().and_then(|input| {
            // `path` only counts when `file_path` is absent or null
            ["file_path", "path"]
                .iter()
                .filter_map(|key| input.get(*key))
                .find(|value| !value.is_null())
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
        });
        Some(ToolUse { name, file_path })
    }

    /// Path of a file the CLI is about to write or edit
    pub fn modified_file(&self) -> Option<String> {
        self.tool_use()
            .filter(ToolUse::is_file_mutating)
            .and_then(|tool| tool.file_path)
    }
}

fn preview(line: &str, max_chars: usize) -> &str {
    match line.char_indices().nth(max_chars) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
