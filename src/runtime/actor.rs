use super::command::{Command, Notice};
use super::pump::{spawn_pump, PumpItem, PumpKind};
use crate::api::error::StreamError;
use crate::api::ChatTransport;
use crate::state::{ActiveTurn, ConversationManager, Rejected, TurnId, TurnProgress};
use crate::triggers::{Dispatch, ParameterForm, TriggerRegistry, TriggerResult};
use crate::types::StreamEvent;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct ActiveStream {
    turn: TurnId,
    cancel: CancellationToken,
    events: mpsc::Receiver<PumpItem>,
}

enum Step {
    Command(Option<Command>),
    Pump(PumpItem),
}

/// Single writer of the conversation. Commands and stream events are
/// applied strictly one after another.
pub(super) struct ConversationActor {
    manager: ConversationManager,
    transport: Arc<dyn ChatTransport>,
    triggers: TriggerRegistry,
    notices: mpsc::UnboundedSender<Notice>,
    active: Option<ActiveStream>,
}

impl ConversationActor {
    pub(super) fn new(
        manager: ConversationManager,
        transport: Arc<dyn ChatTransport>,
        triggers: TriggerRegistry,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> Self {
        Self {
            manager,
            transport,
            triggers,
            notices,
            active: None,
        }
    }

    pub(super) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let step = tokio::select! {
                command = commands.recv() => Step::Command(command),
                item = recv_pump(&mut self.active) => Step::Pump(item),
            };

            match step {
                Step::Command(None) => break,
                Step::Command(Some(Command::Shutdown { reply })) => {
                    self.shutdown();
                    let _ = reply.send(());
                    return;
                }
                Step::Command(Some(command)) => self.handle_command(command).await,
                Step::Pump(item) => self.on_pump_item(item),
            }
        }
        self.shutdown();
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SubmitInput { text, reply } => {
                let result = self.submit_input(&text).await;
                let _ = reply.send(result);
            }
            Command::SendMessage {
                text,
                context,
                reply,
            } => {
                let _ = reply.send(self.send(&text, context, false));
            }
            Command::SubmitParameters { form, reply } => {
                let result = self.submit_parameters(form).await;
                let _ = reply.send(result);
            }
            Command::CancelParameters { reply } => {
                if self.manager.pending_form().is_some() {
                    self.manager.set_pending_form(None);
                }
                let _ = reply.send(());
            }
            Command::Retry { id, reply } => {
                let result = self
                    .manager
                    .retry_message(id)
                    .map(|active| self.open_optional(active));
                let _ = reply.send(result);
            }
            Command::Regenerate { index, reply } => {
                let result = self
                    .manager
                    .regenerate_response(index)
                    .map(|active| self.open(active));
                let _ = reply.send(result);
            }
            Command::StartEditing { id, content, reply } => {
                let _ = reply.send(self.manager.start_editing(id, &content));
            }
            Command::UpdateEdit { content, reply } => {
                let _ = reply.send(self.manager.update_edit_content(&content));
            }
            Command::CancelEditing { reply } => {
                self.manager.cancel_editing();
                let _ = reply.send(());
            }
            Command::FinishEditing { reply } => {
                let _ = reply.send(self.manager.finish_editing());
            }
            Command::SubmitEdit { reply } => {
                let result = self
                    .manager
                    .submit_edit()
                    .map(|active| self.open_optional(active));
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let stopped = self.manager.stop_generation();
                if let Some(turn) = stopped {
                    self.release(turn);
                }
                let _ = reply.send(stopped.is_some());
            }
            Command::LoadHistory {
                conversation_id,
                messages,
                reply,
            } => {
                let _ = reply.send(self.manager.load_history(conversation_id, messages));
            }
            Command::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
            }
        }
    }

    async fn submit_input(&mut self, text: &str) -> Result<(), Rejected> {
        if self.manager.is_typing() {
            return Err(Rejected::Busy);
        }
        let input = text.trim();
        if input.is_empty() {
            return Err(Rejected::EmptyMessage);
        }

        match self.triggers.dispatch(input).await {
            Dispatch::NotCommand => self.send(input, None, false),
            Dispatch::CollectParameters(form) => {
                tracing::debug!(command = %form.command, "collecting parameters");
                self.manager.set_pending_form(Some(form));
                Ok(())
            }
            Dispatch::Executed(result) => self.apply_trigger_result(input, result),
        }
    }

    async fn submit_parameters(&mut self, form: ParameterForm) -> Result<(), Rejected> {
        let Some(pending) = self.manager.pending_form() else {
            return Err(Rejected::NoPendingForm);
        };
        if !pending.command.eq_ignore_ascii_case(&form.command) {
            tracing::debug!(
                pending = %pending.command,
                submitted = %form.command,
                "form rejected: command mismatch"
            );
            return Err(Rejected::FormMismatch(form.command));
        }
        if self.manager.is_typing() {
            return Err(Rejected::Busy);
        }

        // Entered values stay visible when validation fails.
        self.manager.set_pending_form(Some(form.clone()));
        let result = self.triggers.submit_form(&form).await?;
        self.manager.set_pending_form(None);
        self.apply_trigger_result(&form.command_line(), result)
    }

    fn apply_trigger_result(&mut self, input: &str, result: TriggerResult) -> Result<(), Rejected> {
        if result.simulate_failure {
            return self.send(input, None, true);
        }
        if result.clear_history {
            self.manager.clear_history()?;
        }
        if let Some(text) = result.notice {
            self.notify(Notice::info(text));
        }
        if let Some(response) = &result.response {
            self.manager.inject_local_reply(input, response);
        }
        if result.prevent_default || result.response.is_some() {
            return Ok(());
        }
        self.send(input, None, false)
    }

    fn send(
        &mut self,
        text: &str,
        context: Option<Value>,
        simulate_failure: bool,
    ) -> Result<(), Rejected> {
        match self.manager.send_message(text, context, simulate_failure)? {
            Some(active) => self.open(active),
            None => self.notify(Notice::error(StreamError::Simulated.to_string())),
        }
        Ok(())
    }

    fn open_optional(&mut self, active: Option<ActiveTurn>) {
        if let Some(active) = active {
            self.open(active);
        }
    }

    fn open(&mut self, active: ActiveTurn) {
        if let Some(previous) = self.active.take() {
            previous.cancel.cancel();
        }
        let turn = active.turn;
        let cancel = CancellationToken::new();
        let events = spawn_pump(Arc::clone(&self.transport), active, cancel.clone());
        tracing::debug!(turn = turn.0, "stream requested");
        self.active = Some(ActiveStream {
            turn,
            cancel,
            events,
        });
    }

    fn on_pump_item(&mut self, item: PumpItem) {
        let turn = item.turn;
        let (progress, failure) = match item.kind {
            PumpKind::Event(event) => {
                let failure = match &event {
                    StreamEvent::Error { message } => Some(StreamError::Server(message.clone())),
                    _ => None,
                };
                (self.manager.apply_event(turn, &event), failure)
            }
            PumpKind::Failed(error) => {
                let progress = if self.manager.fail_turn(turn, &error) {
                    TurnProgress::Failed
                } else {
                    TurnProgress::Stale
                };
                (progress, Some(error))
            }
            PumpKind::Finished => (
                self.manager.finish_on_close(turn),
                Some(StreamError::AbnormalClose),
            ),
        };

        match progress {
            TurnProgress::Continue => {}
            TurnProgress::Stale => self.release(turn),
            TurnProgress::Completed => self.release(turn),
            TurnProgress::Failed => {
                if let Some(error) = failure {
                    self.notify(Notice::error(error.to_string()));
                }
                self.release(turn);
            }
        }
    }

    /// Closes the stream of `turn` if it is still attached.
    fn release(&mut self, turn: TurnId) {
        if self.active.as_ref().is_some_and(|active| active.turn == turn) {
            if let Some(active) = self.active.take() {
                active.cancel.cancel();
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(turn) = self.manager.stop_generation() {
            tracing::info!(turn = turn.0, "stopping active turn on shutdown");
        }
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }

    fn notify(&self, notice: Notice) {
        tracing::debug!(level = ?notice.level, text = %notice.text, "notice");
        let _ = self.notices.send(notice);
    }
}

/// Next item of the attached stream; pending forever while idle.
async fn recv_pump(active: &mut Option<ActiveStream>) -> PumpItem {
    let Some(stream) = active.as_mut() else {
        return std::future::pending().await;
    };
    match stream.events.recv().await {
        Some(item) => item,
        None => PumpItem {
            turn: stream.turn,
            kind: PumpKind::Failed(StreamError::AbnormalClose),
        },
    }
}
