use anyhow::Result;
use chatstream::api::ApiClient;
use chatstream::config::Config;
use chatstream::runtime::{spawn_conversation, Notice, NoticeLevel};
use chatstream::state::stream_block::joined_text;
use chatstream::state::{
    ConversationManager, ConversationSnapshot, MessageId, MessageStatus, Rejected, Role,
};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

/// Prints streamed text incrementally as snapshots arrive.
#[derive(Default)]
struct TranscriptPrinter {
    streaming: Option<MessageId>,
    printed: usize,
    known_messages: usize,
}

impl TranscriptPrinter {
    fn render(&mut self, snapshot: &ConversationSnapshot) -> std::io::Result<()> {
        let mut out = std::io::stdout().lock();

        match (snapshot.streaming_message_id, self.streaming) {
            (Some(id), current) => {
                if current != Some(id) {
                    write!(out, "assistant> ")?;
                    self.streaming = Some(id);
                    self.printed = 0;
                }
                let text = joined_text(&snapshot.content_blocks);
                if let Some(delta) = text.get(self.printed..) {
                    write!(out, "{delta}")?;
                    self.printed = text.len();
                }
            }
            (None, Some(id)) => {
                self.streaming = None;
                match snapshot.messages.iter().find(|message| message.id == id) {
                    Some(message) if message.status == MessageStatus::Failed => {
                        writeln!(out)?;
                        writeln!(
                            out,
                            "[failed: {}]",
                            message.error.as_deref().unwrap_or("unknown error")
                        )?;
                    }
                    Some(message) => {
                        // Finalized content can extend past what was streamed.
                        if let Some(rest) = message.content.get(self.printed..) {
                            write!(out, "{rest}")?;
                        }
                        writeln!(out)?;
                    }
                    None => writeln!(out)?,
                }
            }
            (None, None) => {}
        }

        for message in snapshot.messages.iter().skip(self.known_messages) {
            let streamed = Some(message.id) == snapshot.streaming_message_id;
            if message.role == Role::Assistant && !streamed && message.status == MessageStatus::Sent
            {
                writeln!(out, "assistant> {}", message.content)?;
            }
        }
        self.known_messages = snapshot.messages.len();

        if let Some(form) = &snapshot.pending_form {
            let fields: Vec<String> = form
                .parameters
                .iter()
                .map(|parameter| format!("<{}>", parameter.name))
                .collect();
            writeln!(
                out,
                "/{} needs: {}  (enter values, or /cancel)",
                form.command,
                fields.join(" ")
            )?;
        }
        out.flush()
    }
}

async fn print_transcript(mut snapshots: watch::Receiver<Arc<ConversationSnapshot>>) {
    let mut printer = TranscriptPrinter::default();
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        if let Err(error) = printer.render(&snapshot) {
            tracing::warn!(%error, "failed to write transcript");
            break;
        }
    }
}

async fn print_notices(mut notices: mpsc::UnboundedReceiver<Notice>) {
    while let Some(notice) = notices.recv().await {
        match notice.level {
            NoticeLevel::Info => eprintln!("[info] {}", notice.text),
            NoticeLevel::Error => eprintln!("[error] {}", notice.text),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;
    chatstream::logging::init(&config)?;

    let client = ApiClient::new(&config)?;
    let triggers = chatstream::triggers::builtin_registry(config.dev_mode, config.user_role.clone());
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let (handle, task) = spawn_conversation(
        ConversationManager::new(),
        Arc::new(client),
        triggers,
        notice_tx,
    );

    tokio::spawn(print_transcript(handle.subscribe()));
    tokio::spawn(print_notices(notice_rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let input = line.trim();
                if matches!(input, "q" | "quit" | "exit" | "/quit" | "/exit") {
                    break;
                }
                if input.is_empty() {
                    continue;
                }

                let result = match handle.snapshot().pending_form.clone() {
                    Some(_) if input.eq_ignore_ascii_case("/cancel") => {
                        handle.cancel_parameters().await
                    }
                    Some(form) => {
                        handle
                            .submit_parameters(form.with_positional_args(input))
                            .await
                    }
                    None => handle.submit_input(input).await,
                };
                match result {
                    Ok(()) => {}
                    Err(Rejected::Busy) => {
                        eprintln!("[busy] a reply is still streaming; Ctrl-C stops it")
                    }
                    Err(Rejected::Closed) => break,
                    Err(rejected) => eprintln!("[rejected] {rejected}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if !handle.stop().await? {
                    break;
                }
            }
        }
    }

    // Already gone when the loop ended on `Rejected::Closed`.
    let _ = handle.shutdown().await;
    task.await?;
    Ok(())
}
