use crate::api::error::StreamError;
use crate::api::stream::EventReader;
use crate::api::ChatTransport;
use crate::state::{ActiveTurn, TurnId};
use crate::types::StreamEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Events buffered between the network and the conversation task.
pub(super) const PUMP_CAPACITY: usize = 64;

#[derive(Debug)]
pub(super) enum PumpKind {
    Event(StreamEvent),
    Failed(StreamError),
    /// The body closed without a transport error.
    Finished,
}

#[derive(Debug)]
pub(super) struct PumpItem {
    pub(super) turn: TurnId,
    pub(super) kind: PumpKind,
}

/// Opens the stream for `active` on its own task and forwards what it reads.
///
/// The task ends after the first non-event item, on cancellation, or when
/// the receiver is dropped. Either of the last two drops the body, which
/// aborts the request.
pub(super) fn spawn_pump(
    transport: Arc<dyn ChatTransport>,
    active: ActiveTurn,
    cancel: CancellationToken,
) -> mpsc::Receiver<PumpItem> {
    let (tx, rx) = mpsc::channel(PUMP_CAPACITY);
    tokio::spawn(async move {
        let turn = active.turn;
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(turn = turn.0, "stream cancelled");
            }
            _ = pump(transport, active, tx) => {}
        }
    });
    rx
}

async fn pump(transport: Arc<dyn ChatTransport>, active: ActiveTurn, tx: mpsc::Sender<PumpItem>) {
    let turn = active.turn;
    let body = match transport.open_stream(&active.request).await {
        Ok(body) => body,
        Err(error) => {
            let error = StreamError::from(error);
            tracing::warn!(turn = turn.0, %error, "failed to open stream");
            let _ = tx
                .send(PumpItem {
                    turn,
                    kind: PumpKind::Failed(error),
                })
                .await;
            return;
        }
    };

    let mut reader = EventReader::new(body);
    loop {
        let kind = match reader.next_event().await {
            Some(Ok(event)) => PumpKind::Event(event),
            Some(Err(error)) => PumpKind::Failed(error),
            None => PumpKind::Finished,
        };
        let last = !matches!(kind, PumpKind::Event(_));
        if tx.send(PumpItem { turn, kind }).await.is_err() || last {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_client::{records, MockApiClient, MockResponse};
    use crate::types::ChatRequest;

    fn active(turn: u64) -> ActiveTurn {
        ActiveTurn {
            turn: TurnId(turn),
            request: ChatRequest::new("hi"),
        }
    }

    async fn drain(mut rx: mpsc::Receiver<PumpItem>) -> Vec<PumpItem> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn test_pump_forwards_events_then_finishes() {
        let mock = MockApiClient::new(vec![MockResponse::Records(records::text_reply(3, "ok"))]);
        let rx = spawn_pump(Arc::new(mock), active(4), CancellationToken::new());
        let items = drain(rx).await;

        assert!(items.iter().all(|item| item.turn == TurnId(4)));
        assert!(matches!(
            items.first().map(|item| &item.kind),
            Some(PumpKind::Event(StreamEvent::Meta { conversation_id: 3 }))
        ));
        assert!(matches!(
            items.last().map(|item| &item.kind),
            Some(PumpKind::Finished)
        ));
    }

    #[tokio::test]
    async fn test_refused_stream_reports_transport_failure() {
        let mock = MockApiClient::new(vec![MockResponse::Refused("connection refused".into())]);
        let items = drain(spawn_pump(Arc::new(mock), active(1), CancellationToken::new())).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(
            &items[0].kind,
            PumpKind::Failed(StreamError::Transport(message)) if message.contains("connection refused")
        ));
    }

    #[tokio::test]
    async fn test_cancel_closes_a_stalled_stream() {
        let mock = MockApiClient::new(vec![MockResponse::Stalled(vec![records::meta(1)])]);
        let cancel = CancellationToken::new();
        let mut rx = spawn_pump(Arc::new(mock), active(1), cancel.clone());

        let first = rx.recv().await.expect("meta forwarded");
        assert!(matches!(first.kind, PumpKind::Event(StreamEvent::Meta { .. })));

        cancel.cancel();
        let closed = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv()).await;
        assert!(matches!(closed, Ok(None)));
    }
}
