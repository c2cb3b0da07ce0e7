use thiserror::Error;

/// Why a streaming turn did not complete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("malformed `{event_type}` event: {reason}")]
    Decode { event_type: String, reason: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("stream closed before the turn completed")]
    AbnormalClose,
    #[error("{0}")]
    Server(String),
    #[error("simulated send failure")]
    Simulated,
}

impl StreamError {
    pub fn decode(event_type: impl Into<String>, reason: impl ToString) -> Self {
        StreamError::Decode {
            event_type: event_type.into(),
            reason: reason.to_string(),
        }
    }

    /// Decoded data can no longer be trusted, so partial blocks are dropped.
    pub fn discards_partial_content(&self) -> bool {
        matches!(self, StreamError::Decode { .. })
    }
}

impl From<anyhow::Error> for StreamError {
    fn from(error: anyhow::Error) -> Self {
        StreamError::Transport(format!("{error:#}"))
    }
}
