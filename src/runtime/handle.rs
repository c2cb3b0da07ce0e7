use super::command::{Command, Reply};
use crate::state::{ConversationSnapshot, DisplayMessage, MessageId, Rejected};
use crate::triggers::ParameterForm;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Cloneable front door to a running conversation task.
#[derive(Clone)]
pub struct ConversationHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Arc<ConversationSnapshot>>,
}

impl ConversationHandle {
    pub(super) fn new(
        commands: mpsc::UnboundedSender<Command>,
        snapshots: watch::Receiver<Arc<ConversationSnapshot>>,
    ) -> Self {
        Self {
            commands,
            snapshots,
        }
    }

    pub fn snapshot(&self) -> Arc<ConversationSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ConversationSnapshot>> {
        self.snapshots.clone()
    }

    /// Routes a line of user input through the command triggers, then the
    /// normal send path.
    pub async fn submit_input(&self, text: impl Into<String>) -> Result<(), Rejected> {
        let text = text.into();
        self.request(|reply| Command::SubmitInput { text, reply }).await?
    }

    /// Sends without trigger routing.
    pub async fn send_message(
        &self,
        text: impl Into<String>,
        context: Option<Value>,
    ) -> Result<(), Rejected> {
        let text = text.into();
        self.request(|reply| Command::SendMessage {
            text,
            context,
            reply,
        })
        .await?
    }

    pub async fn submit_parameters(&self, form: ParameterForm) -> Result<(), Rejected> {
        self.request(|reply| Command::SubmitParameters { form, reply }).await?
    }

    pub async fn cancel_parameters(&self) -> Result<(), Rejected> {
        self.request(|reply| Command::CancelParameters { reply }).await
    }

    pub async fn retry(&self, id: MessageId) -> Result<(), Rejected> {
        self.request(|reply| Command::Retry { id, reply }).await?
    }

    pub async fn regenerate(&self, index: usize) -> Result<(), Rejected> {
        self.request(|reply| Command::Regenerate { index, reply }).await?
    }

    pub async fn start_editing(
        &self,
        id: MessageId,
        content: impl Into<String>,
    ) -> Result<(), Rejected> {
        let content = content.into();
        self.request(|reply| Command::StartEditing { id, content, reply }).await?
    }

    pub async fn update_edit(&self, content: impl Into<String>) -> Result<(), Rejected> {
        let content = content.into();
        self.request(|reply| Command::UpdateEdit { content, reply }).await?
    }

    pub async fn cancel_editing(&self) -> Result<(), Rejected> {
        self.request(|reply| Command::CancelEditing { reply }).await
    }

    pub async fn finish_editing(&self) -> Result<Option<String>, Rejected> {
        self.request(|reply| Command::FinishEditing { reply }).await
    }

    pub async fn submit_edit(&self) -> Result<(), Rejected> {
        self.request(|reply| Command::SubmitEdit { reply }).await?
    }

    /// Stops the active turn, keeping what was streamed. `Ok(false)` when
    /// nothing was streaming.
    pub async fn stop(&self) -> Result<bool, Rejected> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn load_history(
        &self,
        conversation_id: Option<i64>,
        messages: Vec<DisplayMessage>,
    ) -> Result<(), Rejected> {
        self.request(|reply| Command::LoadHistory {
            conversation_id,
            messages,
            reply,
        })
        .await?
    }

    pub async fn shutdown(&self) -> Result<(), Rejected> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, Rejected> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).map_err(|_| Rejected::Closed)?;
        response.await.map_err(|_| Rejected::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requests_fail_closed_once_the_task_is_gone() {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (_, snapshots) = watch::channel(Arc::new(ConversationSnapshot::default()));
        let handle = ConversationHandle::new(commands, snapshots);
        drop(receiver);

        assert_eq!(handle.submit_input("hi").await, Err(Rejected::Closed));
        assert_eq!(handle.stop().await, Err(Rejected::Closed));
    }
}
