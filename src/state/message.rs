use super::stream_block::ContentBlock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a turn: optimistic local id until the server confirms one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageId {
    Local(u64),
    Confirmed(i64),
}

impl MessageId {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MessageId::Confirmed(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Local(id) => write!(f, "local:{id}"),
            MessageId::Confirmed(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Streaming,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Sent | MessageStatus::Failed)
    }
}

/// One chat turn as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(
        rename = "contentBlocks",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_blocks: Option<Vec<ContentBlock>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DisplayMessage {
    pub fn user(id: MessageId, content: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            content_blocks: None,
            thinking: None,
            status,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn assistant_placeholder(id: MessageId) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            content_blocks: None,
            thinking: None,
            status: MessageStatus::Streaming,
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Assistant turn produced locally, without a stream.
    pub fn assistant_text(id: MessageId, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id,
            role: Role::Assistant,
            content_blocks: Some(vec![ContentBlock::Text {
                content: content.clone(),
                is_streaming: false,
            }]),
            content,
            thinking: None,
            status: MessageStatus::Sent,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
            || self.thinking.as_deref().is_some_and(|t| !t.is_empty())
            || self
                .content_blocks
                .as_ref()
                .is_some_and(|blocks| !blocks.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serializes_with_iso_timestamp_and_tagged_id() {
        let message = DisplayMessage::user(MessageId::Local(17), "hi", MessageStatus::Sending);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["id"], json!({"kind": "local", "value": 17}));
        assert_eq!(value["status"], json!("sending"));
        assert_eq!(value["role"], json!("user"));
        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_placeholder_without_blocks_has_no_content() {
        let placeholder = DisplayMessage::assistant_placeholder(MessageId::Local(1));
        assert!(!placeholder.has_content());
        assert!(DisplayMessage::assistant_text(MessageId::Local(2), "ok").has_content());
    }
}
