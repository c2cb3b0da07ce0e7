use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body posted to the open-stream endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub regenerate: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
            context: None,
            regenerate: false,
        }
    }
}

/// One decoded server-sent event of an assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Meta {
        conversation_id: i64,
    },
    ThinkingStart,
    Thinking {
        text: String,
    },
    ThinkingEnd,
    ContentStart,
    Content {
        text: String,
    },
    ContentEnd,
    ToolStart {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chat_render_hint: Option<String>,
    },
    ToolEnd {
        name: String,
        #[serde(default)]
        result: String,
    },
    Done {
        full_response: String,
        #[serde(default)]
        full_thinking: Option<String>,
    },
    StreamEnd {
        conversation_id: i64,
        #[serde(default)]
        title: Option<String>,
    },
    Error {
        message: String,
    },
    /// Event type this client does not know; kept verbatim.
    #[serde(skip)]
    Unknown { event_type: String, payload: Value },
}

pub const KNOWN_EVENT_TYPES: &[&str] = &[
    "meta",
    "thinking_start",
    "thinking",
    "thinking_end",
    "content_start",
    "content",
    "content_end",
    "tool_start",
    "tool_end",
    "done",
    "stream_end",
    "error",
];

impl StreamEvent {
    /// `done`, `stream_end` and `error` end a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Done { .. } | StreamEvent::StreamEnd { .. } | StreamEvent::Error { .. }
        )
    }

    pub fn event_type(&self) -> &str {
        match self {
            StreamEvent::Meta { .. } => "meta",
            StreamEvent::ThinkingStart => "thinking_start",
            StreamEvent::Thinking { .. } => "thinking",
            StreamEvent::ThinkingEnd => "thinking_end",
            StreamEvent::ContentStart => "content_start",
            StreamEvent::Content { .. } => "content",
            StreamEvent::ContentEnd => "content_end",
            StreamEvent::ToolStart { .. } => "tool_start",
            StreamEvent::ToolEnd { .. } => "tool_end",
            StreamEvent::Done { .. } => "done",
            StreamEvent::StreamEnd { .. } => "stream_end",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Unknown { event_type, .. } => event_type,
        }
    }
}
