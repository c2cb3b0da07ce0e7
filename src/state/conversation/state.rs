use super::super::assembler::BlockAssembler;
use super::super::message::{DisplayMessage, MessageId};
use super::super::stream_block::ContentBlock;
use crate::triggers::{FormError, ParameterForm};
use crate::types::ChatRequest;
use crate::util::now_millis;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Identifies one streaming attempt. Events tagged with a stale id are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnId(pub u64);

/// A turn the caller must now open a stream for.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTurn {
    pub turn: TurnId,
    pub request: ChatRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnProgress {
    Continue,
    Completed,
    Failed,
    /// The event belongs to a turn that is no longer active.
    Stale,
}

/// An operation that is not allowed in the current state. Never shown as an error toast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("another turn is already in flight")]
    Busy,
    #[error("message is empty")]
    EmptyMessage,
    #[error("message {0} not found")]
    NotFound(MessageId),
    #[error("message {0} is not a failed user turn")]
    NotRetryable(MessageId),
    #[error("index {0} is not an assistant turn preceded by a user turn")]
    NotRegenerable(usize),
    #[error("message {0} cannot be edited")]
    NotEditable(MessageId),
    #[error("editing is not permitted while a turn is streaming")]
    EditWhileStreaming,
    #[error("an edit is in progress")]
    EditInProgress,
    #[error("no edit in progress")]
    NotEditing,
    #[error("no parameter form is pending")]
    NoPendingForm,
    #[error("submitted form for /{0} does not match the pending command")]
    FormMismatch(String),
    #[error(transparent)]
    InvalidForm(#[from] FormError),
    #[error("conversation task has shut down")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditState {
    pub message_id: MessageId,
    pub original: String,
    pub content: String,
}

/// Read-only view handed to renderers. `version` increases on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSnapshot {
    pub version: u64,
    pub messages: Vec<DisplayMessage>,
    pub streaming_message_id: Option<MessageId>,
    pub content_blocks: Vec<ContentBlock>,
    pub is_streaming: bool,
    pub is_typing: bool,
    pub conversation_id: Option<i64>,
    pub title: Option<String>,
    pub editing: Option<EditState>,
    pub pending_form: Option<ParameterForm>,
}

pub(super) struct InFlight {
    pub(super) turn: TurnId,
    pub(super) user_id: MessageId,
    pub(super) assistant_id: MessageId,
    pub(super) assembler: BlockAssembler,
    pub(super) final_text: Option<String>,
    pub(super) final_thinking: Option<String>,
    pub(super) receiving: bool,
}

/// Owns the chat turns and their status. The only writer of `status`.
pub struct ConversationManager {
    pub(super) messages: Vec<DisplayMessage>,
    pub(super) in_flight: Option<InFlight>,
    pub(super) conversation_id: Option<i64>,
    pub(super) title: Option<String>,
    pub(super) editing: Option<EditState>,
    pub(super) pending_form: Option<ParameterForm>,
    next_turn: u64,
    last_local_id: u64,
    version: u64,
    snapshot_tx: watch::Sender<Arc<ConversationSnapshot>>,
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationManager {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(ConversationSnapshot::default()));
        Self {
            messages: Vec::new(),
            in_flight: None,
            conversation_id: None,
            title: None,
            editing: None,
            pending_form: None,
            next_turn: 0,
            last_local_id: 0,
            version: 0,
            snapshot_tx,
        }
    }

    /// Continues an existing server-side conversation.
    pub fn with_conversation_id(mut self, conversation_id: i64) -> Self {
        self.conversation_id = Some(conversation_id);
        self.publish();
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ConversationSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<ConversationSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn conversation_id(&self) -> Option<i64> {
        self.conversation_id
    }

    pub fn is_typing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn active_turn(&self) -> Option<TurnId> {
        self.in_flight.as_ref().map(|in_flight| in_flight.turn)
    }

    pub fn pending_form(&self) -> Option<&ParameterForm> {
        self.pending_form.as_ref()
    }

    pub fn set_pending_form(&mut self, form: Option<ParameterForm>) {
        self.pending_form = form;
        self.publish();
    }

    pub(super) fn next_turn_id(&mut self) -> TurnId {
        self.next_turn += 1;
        TurnId(self.next_turn)
    }

    /// Timestamp-based, strictly increasing.
    pub(super) fn next_local_id(&mut self) -> MessageId {
        let id = now_millis().max(self.last_local_id + 1);
        self.last_local_id = id;
        MessageId::Local(id)
    }

    pub(super) fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|message| message.id == id)
    }

    pub(super) fn message_mut(&mut self, id: MessageId) -> Option<&mut DisplayMessage> {
        self.messages.iter_mut().find(|message| message.id == id)
    }

    pub(super) fn publish(&mut self) {
        self.version += 1;
        let (streaming_message_id, content_blocks, is_streaming) = match &self.in_flight {
            Some(in_flight) => (
                Some(in_flight.assistant_id),
                in_flight.assembler.blocks().to_vec(),
                in_flight.receiving,
            ),
            None => (None, Vec::new(), false),
        };

        let snapshot = ConversationSnapshot {
            version: self.version,
            messages: self.messages.clone(),
            streaming_message_id,
            content_blocks,
            is_streaming,
            is_typing: self.in_flight.is_some(),
            conversation_id: self.conversation_id,
            title: self.title.clone(),
            editing: self.editing.clone(),
            pending_form: self.pending_form.clone(),
        };
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }
}
