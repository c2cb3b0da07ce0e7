use super::super::assembler::Applied;
use super::super::message::MessageStatus;
use super::super::stream_block::{joined_text, joined_thinking, ContentBlock};
use super::state::{InFlight, TurnId, TurnProgress};
use super::ConversationManager;
use crate::api::error::StreamError;
use crate::types::StreamEvent;

impl ConversationManager {
    /// Applies one event of `turn`, strictly in arrival order.
    pub fn apply_event(&mut self, turn: TurnId, event: &StreamEvent) -> TurnProgress {
        let Some(in_flight) = self.in_flight.as_mut().filter(|f| f.turn == turn) else {
            tracing::debug!(turn = turn.0, event = event.event_type(), "dropping stale event");
            return TurnProgress::Stale;
        };
        in_flight.receiving = true;

        match event {
            StreamEvent::Meta { conversation_id } => {
                // The user turn stays `sending` until the reply completes.
                self.conversation_id = Some(*conversation_id);
            }
            StreamEvent::Done {
                full_response,
                full_thinking,
            } => {
                in_flight.final_text = Some(full_response.clone());
                in_flight.final_thinking = full_thinking.clone();
            }
            StreamEvent::StreamEnd {
                conversation_id,
                title,
            } => {
                self.conversation_id = Some(*conversation_id);
                if title.is_some() {
                    self.title = title.clone();
                }
                self.complete_turn();
                return TurnProgress::Completed;
            }
            StreamEvent::Error { message } => {
                self.fail_turn(turn, &StreamError::Server(message.clone()));
                return TurnProgress::Failed;
            }
            StreamEvent::Unknown { event_type, .. } => {
                tracing::debug!(event_type = %event_type, "ignoring unknown event");
            }
            content_event => {
                if in_flight.assembler.apply(content_event) == Applied::Recovered {
                    tracing::debug!(
                        turn = turn.0,
                        violations = in_flight.assembler.violations(),
                        "recovered from out-of-order stream"
                    );
                }
            }
        }

        self.publish();
        TurnProgress::Continue
    }

    /// The body ended cleanly. A turn that saw `done` completes; anything
    /// else was cut short.
    pub fn finish_on_close(&mut self, turn: TurnId) -> TurnProgress {
        let Some(saw_done) = self
            .in_flight
            .as_ref()
            .filter(|f| f.turn == turn)
            .map(|f| f.final_text.is_some())
        else {
            return TurnProgress::Stale;
        };

        if saw_done {
            self.complete_turn();
            TurnProgress::Completed
        } else {
            self.fail_turn(turn, &StreamError::AbnormalClose);
            TurnProgress::Failed
        }
    }

    /// Moves the active turn to `failed`. Partial blocks are kept unless the
    /// error means the decoded data cannot be trusted. A user turn that was
    /// still `sending` becomes `failed` and can be retried.
    pub fn fail_turn(&mut self, turn: TurnId, error: &StreamError) -> bool {
        let Some(in_flight) = self.take_in_flight(turn) else {
            return false;
        };
        tracing::warn!(turn = turn.0, %error, "turn failed");

        let blocks = if error.discards_partial_content() {
            Vec::new()
        } else {
            in_flight.assembler.finish()
        };
        let error_text = error.to_string();

        if let Some(user) = self.message_mut(in_flight.user_id) {
            if user.status == MessageStatus::Sending {
                user.status = MessageStatus::Failed;
                user.error = Some(error_text.clone());
            }
        }

        if blocks.is_empty() {
            if let Some(index) = self.position(in_flight.assistant_id) {
                self.messages.remove(index);
            }
        } else if let Some(assistant) = self.message_mut(in_flight.assistant_id) {
            assistant.content = joined_text(&blocks);
            assistant.content_blocks = Some(blocks);
            assistant.status = MessageStatus::Failed;
            assistant.error = Some(error_text);
        }

        self.publish();
        true
    }

    /// Finalizes the active turn as `sent` from whatever was assembled so
    /// far. Returns the stopped turn, or `None` when nothing was streaming.
    pub fn stop_generation(&mut self) -> Option<TurnId> {
        let turn = self.in_flight.as_ref()?.turn;
        let in_flight = self.take_in_flight(turn)?;
        let blocks = in_flight.assembler.finish();
        tracing::info!(turn = turn.0, blocks = blocks.len(), "generation stopped");

        if let Some(user) = self.message_mut(in_flight.user_id) {
            if user.status == MessageStatus::Sending {
                user.status = MessageStatus::Sent;
            }
        }

        if blocks.is_empty() {
            if let Some(index) = self.position(in_flight.assistant_id) {
                self.messages.remove(index);
            }
        } else if let Some(assistant) = self.message_mut(in_flight.assistant_id) {
            assistant.content = joined_text(&blocks);
            assistant.content_blocks = Some(blocks);
            assistant.status = MessageStatus::Sent;
        }

        self.publish();
        Some(turn)
    }

    fn complete_turn(&mut self) {
        let Some(turn) = self.active_turn() else {
            return;
        };
        let Some(in_flight) = self.take_in_flight(turn) else {
            return;
        };
        let InFlight {
            user_id,
            assistant_id,
            assembler,
            final_text,
            final_thinking,
            ..
        } = in_flight;

        let mut blocks = assembler.finish();
        let assembled = joined_text(&blocks);
        let content = match final_text {
            Some(full_response) => {
                let has_text_block = blocks
                    .iter()
                    .any(|block| matches!(block, ContentBlock::Text { .. }));
                if has_text_block && assembled != full_response {
                    tracing::warn!(
                        turn = turn.0,
                        assembled_len = assembled.len(),
                        final_len = full_response.len(),
                        "assembled text diverges from full_response"
                    );
                }
                if !has_text_block && !full_response.is_empty() {
                    blocks.push(ContentBlock::Text {
                        content: full_response.clone(),
                        is_streaming: false,
                    });
                }
                full_response
            }
            None => assembled,
        };
        let legacy_thinking = final_thinking
            .filter(|thinking| !thinking.is_empty() && joined_thinking(&blocks).is_empty());

        if let Some(user) = self.message_mut(user_id) {
            user.status = MessageStatus::Sent;
        }
        if let Some(assistant) = self.message_mut(assistant_id) {
            assistant.content = content;
            assistant.content_blocks = Some(blocks);
            assistant.thinking = legacy_thinking;
            assistant.status = MessageStatus::Sent;
        }

        tracing::info!(turn = turn.0, conversation_id = ?self.conversation_id, "turn complete");
        self.publish();
    }

    fn take_in_flight(&mut self, turn: TurnId) -> Option<InFlight> {
        if self.in_flight.as_ref().is_some_and(|f| f.turn == turn) {
            self.in_flight.take()
        } else {
            None
        }
    }
}
