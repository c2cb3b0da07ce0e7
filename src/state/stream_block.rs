use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Assistant reasoning text.
    Thinking {
        content: String,
        #[serde(rename = "isStreaming")]
        is_streaming: bool,
    },
    /// User-facing prose, exactly as streamed.
    Text {
        content: String,
        #[serde(rename = "isStreaming")]
        is_streaming: bool,
    },
    /// Tool invocation and its result once complete.
    ToolCall {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(rename = "isComplete")]
        is_complete: bool,
        #[serde(
            rename = "chatRenderHint",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        chat_render_hint: Option<String>,
    },
}

impl ContentBlock {
    pub fn thinking() -> Self {
        ContentBlock::Thinking {
            content: String::new(),
            is_streaming: true,
        }
    }

    pub fn text() -> Self {
        ContentBlock::Text {
            content: String::new(),
            is_streaming: true,
        }
    }

    pub fn tool_call(
        name: impl Into<String>,
        params: Option<serde_json::Value>,
        chat_render_hint: Option<String>,
    ) -> Self {
        ContentBlock::ToolCall {
            name: name.into(),
            params,
            result: None,
            is_complete: false,
            chat_render_hint,
        }
    }

    pub fn is_open(&self) -> bool {
        match self {
            ContentBlock::Thinking { is_streaming, .. } | ContentBlock::Text { is_streaming, .. } => {
                *is_streaming
            }
            ContentBlock::ToolCall { is_complete, .. } => !is_complete,
        }
    }

    /// Flips the block to its finished state. Content is untouched.
    pub fn close(&mut self) {
        match self {
            ContentBlock::Thinking { is_streaming, .. } | ContentBlock::Text { is_streaming, .. } => {
                *is_streaming = false
            }
            ContentBlock::ToolCall { is_complete, .. } => *is_complete = true,
        }
    }

    pub fn is_prose(&self) -> bool {
        matches!(self, ContentBlock::Thinking { .. } | ContentBlock::Text { .. })
    }
}

/// Concatenation of every `text` block, in order.
pub fn joined_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

pub fn joined_thinking(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Thinking { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}
