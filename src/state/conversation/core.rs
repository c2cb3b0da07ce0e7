use super::super::assembler::BlockAssembler;
use super::super::message::{DisplayMessage, MessageId, MessageStatus, Role};
use super::state::{ActiveTurn, InFlight, Rejected};
use super::ConversationManager;
use crate::api::error::StreamError;
use crate::types::ChatRequest;
use serde_json::Value;

impl ConversationManager {
    /// Appends a `sending` user turn and a `streaming` assistant placeholder.
    ///
    /// Returns the turn to open a stream for, or `None` when
    /// `simulate_failure` resolved the turn locally as `failed`.
    pub fn send_message(
        &mut self,
        text: &str,
        context_override: Option<Value>,
        simulate_failure: bool,
    ) -> Result<Option<ActiveTurn>, Rejected> {
        if self.in_flight.is_some() {
            tracing::debug!("send rejected: turn in flight");
            return Err(Rejected::Busy);
        }
        if text.trim().is_empty() {
            return Err(Rejected::EmptyMessage);
        }

        let user_id = self.next_local_id();
        self.messages
            .push(DisplayMessage::user(user_id, text, MessageStatus::Sending));

        if simulate_failure {
            self.publish();
            tracing::info!(message = %user_id, "simulating send failure");
            if let Some(user) = self.message_mut(user_id) {
                user.status = MessageStatus::Failed;
                user.error = Some(StreamError::Simulated.to_string());
            }
            self.publish();
            return Ok(None);
        }

        let request = ChatRequest {
            message: text.to_string(),
            conversation_id: self.conversation_id,
            context: context_override,
            regenerate: false,
        };
        Ok(Some(self.begin_assistant_turn(user_id, request)))
    }

    /// Re-sends a failed user turn as a fresh attempt at the end of the list.
    /// The failed user turn is replaced by the new attempt.
    pub fn retry_message(&mut self, id: MessageId) -> Result<Option<ActiveTurn>, Rejected> {
        if self.in_flight.is_some() {
            return Err(Rejected::Busy);
        }
        let index = self.position(id).ok_or(Rejected::NotFound(id))?;
        let failed = &self.messages[index];
        if failed.role != Role::User || failed.status != MessageStatus::Failed {
            return Err(Rejected::NotRetryable(id));
        }

        let content = failed.content.clone();
        // Only the failed marker goes; a partial reply stays visible as `failed`.
        self.messages.remove(index);

        tracing::info!(message = %id, "retrying failed message");
        self.send_message(&content, None, false)
    }

    /// Drops `messages[index..]` and streams a new reply to `messages[index - 1]`.
    pub fn regenerate_response(&mut self, index: usize) -> Result<ActiveTurn, Rejected> {
        if self.in_flight.is_some() {
            tracing::debug!(index, "regenerate rejected: turn in flight");
            return Err(Rejected::Busy);
        }
        if self.editing.is_some() {
            return Err(Rejected::EditInProgress);
        }

        let valid = index > 0
            && self
                .messages
                .get(index)
                .is_some_and(|message| message.role == Role::Assistant)
            && self.messages[index - 1].role == Role::User;
        if !valid {
            tracing::debug!(index, "regenerate rejected: not an assistant reply to a user turn");
            return Err(Rejected::NotRegenerable(index));
        }

        self.messages.truncate(index);
        let user = &self.messages[index - 1];
        let user_id = user.id;
        let request = ChatRequest {
            message: user.content.clone(),
            conversation_id: self.conversation_id,
            context: None,
            regenerate: true,
        };
        Ok(self.begin_assistant_turn(user_id, request))
    }

    /// Adds the command line and its synthetic reply, both already `sent`.
    pub fn inject_local_reply(&mut self, command_text: &str, response: &str) {
        let user_id = self.next_local_id();
        self.messages
            .push(DisplayMessage::user(user_id, command_text, MessageStatus::Sent));
        let assistant_id = self.next_local_id();
        self.messages
            .push(DisplayMessage::assistant_text(assistant_id, response));
        self.publish();
    }

    pub fn clear_history(&mut self) -> Result<(), Rejected> {
        if self.in_flight.is_some() {
            return Err(Rejected::Busy);
        }
        self.messages.clear();
        self.editing = None;
        self.publish();
        Ok(())
    }

    /// Replaces the list with server-confirmed history.
    pub fn load_history(
        &mut self,
        conversation_id: Option<i64>,
        messages: Vec<DisplayMessage>,
    ) -> Result<(), Rejected> {
        if self.in_flight.is_some() {
            return Err(Rejected::Busy);
        }
        self.messages = messages;
        self.conversation_id = conversation_id;
        self.editing = None;
        self.publish();
        Ok(())
    }

    /// Swaps an optimistic id for the server's once the turn is persisted.
    pub fn confirm_message_id(&mut self, local: MessageId, server_id: i64) -> bool {
        let confirmed = MessageId::Confirmed(server_id);
        let Some(message) = self.message_mut(local) else {
            return false;
        };
        message.id = confirmed;
        if let Some(in_flight) = self.in_flight.as_mut() {
            if in_flight.user_id == local {
                in_flight.user_id = confirmed;
            }
            if in_flight.assistant_id == local {
                in_flight.assistant_id = confirmed;
            }
        }
        if let Some(editing) = self.editing.as_mut() {
            if editing.message_id == local {
                editing.message_id = confirmed;
            }
        }
        self.publish();
        true
    }

    fn begin_assistant_turn(&mut self, user_id: MessageId, request: ChatRequest) -> ActiveTurn {
        let turn = self.next_turn_id();
        let assistant_id = self.next_local_id();
        self.messages
            .push(DisplayMessage::assistant_placeholder(assistant_id));
        self.in_flight = Some(InFlight {
            turn,
            user_id,
            assistant_id,
            assembler: BlockAssembler::new(),
            final_text: None,
            final_thinking: None,
            receiving: false,
        });
        self.publish();
        tracing::debug!(turn = turn.0, regenerate = request.regenerate, "turn started");
        ActiveTurn { turn, request }
    }
}
