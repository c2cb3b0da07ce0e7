//! Async shell around [`ConversationManager`].
//!
//! One task owns the manager. Frontends talk to it through a
//! [`ConversationHandle`], read state from the snapshot channel, and receive
//! user-visible failures as [`Notice`]s. Each turn's stream is read on its
//! own task and forwarded over a bounded channel; stopping a turn cancels
//! that task, which drops the HTTP body.

mod actor;
mod command;
mod handle;
mod pump;

pub use command::{Notice, NoticeLevel};
pub use handle::ConversationHandle;

use crate::api::ChatTransport;
use crate::state::ConversationManager;
use crate::triggers::TriggerRegistry;
use actor::ConversationActor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub fn spawn_conversation(
    manager: ConversationManager,
    transport: Arc<dyn ChatTransport>,
    triggers: TriggerRegistry,
    notices: mpsc::UnboundedSender<Notice>,
) -> (ConversationHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let handle = ConversationHandle::new(command_tx, manager.subscribe());
    let actor = ConversationActor::new(manager, transport, triggers, notices);
    let task = tokio::spawn(actor.run(command_rx));
    (handle, task)
}
