use super::super::message::{MessageId, Role};
use super::state::{ActiveTurn, EditState, Rejected};
use super::ConversationManager;

impl ConversationManager {
    pub fn start_editing(&mut self, id: MessageId, content: &str) -> Result<(), Rejected> {
        if self.in_flight.is_some() {
            return Err(Rejected::EditWhileStreaming);
        }
        let index = self.position(id).ok_or(Rejected::NotFound(id))?;
        let message = &self.messages[index];
        if message.role != Role::User {
            return Err(Rejected::NotEditable(id));
        }

        self.editing = Some(EditState {
            message_id: id,
            original: message.content.clone(),
            content: content.to_string(),
        });
        self.publish();
        Ok(())
    }

    pub fn update_edit_content(&mut self, content: &str) -> Result<(), Rejected> {
        let editing = self.editing.as_mut().ok_or(Rejected::NotEditing)?;
        editing.content = content.to_string();
        self.publish();
        Ok(())
    }

    pub fn cancel_editing(&mut self) {
        if self.editing.take().is_some() {
            self.publish();
        }
    }

    /// Ends the edit. `None` when the content is empty or unchanged.
    pub fn finish_editing(&mut self) -> Option<String> {
        let editing = self.editing.take()?;
        self.publish();
        let content = editing.content.trim();
        if content.is_empty() || content == editing.original.trim() {
            return None;
        }
        Some(content.to_string())
    }

    /// Finishes the edit, drops the edited turn and everything after it,
    /// and sends the edited content. `Ok(None)` when there was nothing to send.
    pub fn submit_edit(&mut self) -> Result<Option<ActiveTurn>, Rejected> {
        if self.in_flight.is_some() {
            return Err(Rejected::EditWhileStreaming);
        }
        let message_id = self
            .editing
            .as_ref()
            .map(|editing| editing.message_id)
            .ok_or(Rejected::NotEditing)?;
        let Some(content) = self.finish_editing() else {
            return Ok(None);
        };
        let index = self
            .position(message_id)
            .ok_or(Rejected::NotFound(message_id))?;

        self.messages.truncate(index);
        tracing::debug!(message = %message_id, dropped_from = index, "resending edited turn");
        self.send_message(&content, None, false)
    }
}
