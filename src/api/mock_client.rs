use crate::api::client::{ByteStream, ChatTransport};
use crate::types::ChatRequest;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::sync::{Arc, Mutex};

/// One scripted reply of [`MockApiClient`].
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Emits the records, then closes the body.
    Records(Vec<String>),
    /// Emits the records, then keeps the body open until it is dropped.
    Stalled(Vec<String>),
    /// Emits the records, then fails the body with a transport error.
    BrokenAfter(Vec<String>, String),
    /// `open_stream` itself fails.
    Refused(String),
}

/// Scripted transport: replays canned SSE records and records every request.
#[derive(Clone, Default)]
pub struct MockApiClient {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockApiClient {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push_response(&self, response: MockResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push(response);
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests().len()
    }
}

fn framed(records: Vec<String>) -> Vec<Result<Bytes>> {
    records
        .into_iter()
        .map(|record| {
            let framed = if record.ends_with("\n\n") {
                record
            } else {
                format!("{record}\n\n")
            };
            Ok(Bytes::from(framed))
        })
        .collect()
}

#[async_trait]
impl ChatTransport for MockApiClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("MockApiClient: request log poisoned"))?
            .push(request.clone());

        let response = {
            let mut responses = self
                .responses
                .lock()
                .map_err(|_| anyhow!("MockApiClient: response queue poisoned"))?;
            if responses.is_empty() {
                return Err(anyhow!("MockApiClient: No more responses configured"));
            }
            responses.remove(0)
        };

        let body: ByteStream = match response {
            MockResponse::Records(records) => Box::pin(stream::iter(framed(records))),
            MockResponse::Stalled(records) => {
                Box::pin(stream::iter(framed(records)).chain(stream::pending()))
            }
            MockResponse::BrokenAfter(records, message) => {
                let failure: Result<Bytes> = Err(anyhow!(message));
                Box::pin(stream::iter(framed(records)).chain(stream::iter(vec![failure])))
            }
            MockResponse::Refused(message) => return Err(anyhow!(message)),
        };
        Ok(body)
    }
}

/// SSE record builders for scripted replies.
pub mod records {
    use serde_json::json;

    fn record(event_type: &str, data: serde_json::Value) -> String {
        format!("event: {event_type}\ndata: {data}")
    }

    pub fn meta(conversation_id: i64) -> String {
        record(
            "meta",
            json!({"type": "meta", "conversation_id": conversation_id}),
        )
    }

    pub fn thinking_start() -> String {
        record("thinking_start", json!({"type": "thinking_start"}))
    }

    pub fn thinking(text: &str) -> String {
        record("thinking", json!({"type": "thinking", "text": text}))
    }

    pub fn thinking_end() -> String {
        record("thinking_end", json!({"type": "thinking_end"}))
    }

    pub fn content_start() -> String {
        record("content_start", json!({"type": "content_start"}))
    }

    pub fn content(text: &str) -> String {
        record("content", json!({"type": "content", "text": text}))
    }

    pub fn content_end() -> String {
        record("content_end", json!({"type": "content_end"}))
    }

    pub fn tool_start(name: &str) -> String {
        record("tool_start", json!({"type": "tool_start", "name": name}))
    }

    pub fn tool_end(name: &str, result: &str) -> String {
        record(
            "tool_end",
            json!({"type": "tool_end", "name": name, "result": result}),
        )
    }

    pub fn done(full_response: &str) -> String {
        record(
            "done",
            json!({"type": "done", "full_response": full_response}),
        )
    }

    pub fn stream_end(conversation_id: i64, title: Option<&str>) -> String {
        record(
            "stream_end",
            json!({"type": "stream_end", "conversation_id": conversation_id, "title": title}),
        )
    }

    pub fn error(message: &str) -> String {
        record("error", json!({"type": "error", "message": message}))
    }

    /// A complete single-text-block reply.
    pub fn text_reply(conversation_id: i64, text: &str) -> Vec<String> {
        vec![
            meta(conversation_id),
            content_start(),
            content(text),
            content_end(),
            done(text),
            stream_end(conversation_id, None),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::stream::EventReader;
    use crate::types::StreamEvent;

    #[tokio::test]
    async fn test_mock_replays_records_and_logs_requests() {
        let mock = MockApiClient::new(vec![MockResponse::Records(records::text_reply(3, "ok"))]);
        let body = mock.open_stream(&ChatRequest::new("hello")).await.unwrap();
        let mut reader = EventReader::new(body);
        let mut events = Vec::new();
        while let Some(event) = reader.next_event().await {
            events.push(event.unwrap());
        }
        assert_eq!(events.first(), Some(&StreamEvent::Meta { conversation_id: 3 }));
        assert_eq!(events.len(), 6);
        assert_eq!(mock.requests(), vec![ChatRequest::new("hello")]);
    }

    #[tokio::test]
    async fn test_mock_errors_when_script_is_exhausted() {
        let mock = MockApiClient::new(vec![]);
        assert!(mock.open_stream(&ChatRequest::new("x")).await.is_err());
        assert_eq!(mock.request_count(), 1);
    }
}
