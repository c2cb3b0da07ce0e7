use crate::state::{DisplayMessage, MessageId, Rejected};
use crate::triggers::ParameterForm;
use serde_json::Value;
use tokio::sync::oneshot;

pub(super) type Reply<T> = oneshot::Sender<T>;

/// Requests handled by the conversation task, one at a time.
#[derive(Debug)]
pub(super) enum Command {
    SubmitInput {
        text: String,
        reply: Reply<Result<(), Rejected>>,
    },
    SendMessage {
        text: String,
        context: Option<Value>,
        reply: Reply<Result<(), Rejected>>,
    },
    SubmitParameters {
        form: ParameterForm,
        reply: Reply<Result<(), Rejected>>,
    },
    CancelParameters {
        reply: Reply<()>,
    },
    Retry {
        id: MessageId,
        reply: Reply<Result<(), Rejected>>,
    },
    Regenerate {
        index: usize,
        reply: Reply<Result<(), Rejected>>,
    },
    StartEditing {
        id: MessageId,
        content: String,
        reply: Reply<Result<(), Rejected>>,
    },
    UpdateEdit {
        content: String,
        reply: Reply<Result<(), Rejected>>,
    },
    CancelEditing {
        reply: Reply<()>,
    },
    FinishEditing {
        reply: Reply<Option<String>>,
    },
    SubmitEdit {
        reply: Reply<Result<(), Rejected>>,
    },
    Stop {
        reply: Reply<bool>,
    },
    LoadHistory {
        conversation_id: Option<i64>,
        messages: Vec<DisplayMessage>,
        reply: Reply<Result<(), Rejected>>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A short user-visible message, e.g. a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}
