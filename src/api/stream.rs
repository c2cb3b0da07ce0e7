use super::client::ByteStream;
use super::error::StreamError;
use crate::types::{StreamEvent, KNOWN_EVENT_TYPES};
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;

/// Incremental decoder for `event: <type>\ndata: <json>\n\n` records.
///
/// Bytes are buffered until a full record is available, so multi-byte
/// characters and JSON payloads may be split across chunks freely.
#[derive(Default)]
pub struct EventDecoder {
    buffer: Vec<u8>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, StreamError> {
        self.buffer
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(end) = find_record_end(&self.buffer[start..]) {
            let record_end = start + end + 2;
            let record = &self.buffer[start..start + end];
            start = record_end;

            if let Some(event) = decode_record(record)? {
                events.push(event);
            }
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        Ok(events)
    }

    /// Decodes a final record that was not followed by a blank line.
    pub fn finish(&mut self) -> Result<Option<StreamEvent>, StreamError> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        decode_record(&rest)
    }
}

fn find_record_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}

fn decode_record(record: &[u8]) -> Result<Option<StreamEvent>, StreamError> {
    let text = std::str::from_utf8(record)
        .map_err(|error| StreamError::decode("<unknown>", format!("invalid UTF-8: {error}")))?;

    let mut event_type: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event_type = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if data_lines.is_empty() {
        return Ok(None);
    }
    let data = data_lines.join("\n");
    let label = event_type.unwrap_or("<untyped>");

    let mut payload: Value = serde_json::from_str(&data).map_err(|error| {
        tracing::warn!(event_type = label, data = %data, %error, "sse payload is not valid json");
        StreamError::decode(label, error)
    })?;

    let Some(object) = payload.as_object_mut() else {
        return Err(StreamError::decode(label, "payload is not a JSON object"));
    };

    let resolved_type = match (object.get("type").and_then(Value::as_str), event_type) {
        (Some(tagged), _) => tagged.to_string(),
        (None, Some(line_type)) if !line_type.is_empty() => {
            object.insert("type".to_string(), Value::String(line_type.to_string()));
            line_type.to_string()
        }
        _ => return Err(StreamError::decode(label, "event has no type")),
    };

    if !KNOWN_EVENT_TYPES.contains(&resolved_type.as_str()) {
        tracing::debug!(event_type = %resolved_type, "passing through unknown event type");
        return Ok(Some(StreamEvent::Unknown {
            event_type: resolved_type,
            payload,
        }));
    }

    serde_json::from_value::<StreamEvent>(payload)
        .map(Some)
        .map_err(|error| {
            tracing::warn!(event_type = %resolved_type, %error, "sse payload does not match event schema");
            StreamError::decode(resolved_type, error)
        })
}

/// Pull-based, ordered reader of the events of one turn.
///
/// Yields `Err(StreamError::AbnormalClose)` when the body ends before a
/// `done`, `stream_end` or `error` event, and stops after `stream_end` or
/// `error`.
pub struct EventReader {
    body: ByteStream,
    decoder: EventDecoder,
    pending: VecDeque<StreamEvent>,
    saw_terminal: bool,
    body_done: bool,
    finished: bool,
}

impl EventReader {
    pub fn new(body: ByteStream) -> Self {
        Self {
            body,
            decoder: EventDecoder::new(),
            pending: VecDeque::new(),
            saw_terminal: false,
            body_done: false,
            finished: false,
        }
    }

    pub async fn next_event(&mut self) -> Option<Result<StreamEvent, StreamError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if event.is_terminal() {
                    self.saw_terminal = true;
                }
                if matches!(event, StreamEvent::StreamEnd { .. } | StreamEvent::Error { .. }) {
                    self.finished = true;
                    self.pending.clear();
                }
                return Some(Ok(event));
            }

            if self.finished {
                return None;
            }

            if self.body_done {
                self.finished = true;
                if !self.saw_terminal {
                    return Some(Err(StreamError::AbnormalClose));
                }
                return None;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => match self.decoder.process(&chunk) {
                    Ok(events) => self.pending.extend(events),
                    Err(error) => return Some(Err(self.fail(error))),
                },
                Some(Err(error)) => return Some(Err(self.fail(error.into()))),
                None => {
                    self.body_done = true;
                    match self.decoder.finish() {
                        Ok(Some(event)) => self.pending.push_back(event),
                        Ok(None) => {}
                        Err(error) => return Some(Err(self.fail(error))),
                    }
                }
            }
        }
    }

    fn fail(&mut self, error: StreamError) -> StreamError {
        self.finished = true;
        self.pending.clear();
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    fn body(chunks: &[&str]) -> ByteStream {
        let items: Vec<anyhow::Result<Bytes>> = chunks
            .iter()
            .map(|chunk| Ok(Bytes::from(chunk.to_string())))
            .collect();
        Box::pin(stream::iter(items))
    }

    async fn drain(reader: &mut EventReader) -> Vec<Result<StreamEvent, StreamError>> {
        let mut out = Vec::new();
        while let Some(item) = reader.next_event().await {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_crlf_records_are_accepted() {
        let mut decoder = EventDecoder::new();
        let events = decoder
            .process(b"event: content_start\r\ndata: {\"type\":\"content_start\"}\r\n\r\n")
            .unwrap();
        assert_eq!(events, vec![StreamEvent::ContentStart]);
    }

    #[test]
    fn test_comment_and_dataless_records_are_skipped() {
        let mut decoder = EventDecoder::new();
        let events = decoder.process(b": keepalive\n\nevent: ping\n\n").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_trailing_record_without_blank_line_is_decoded_on_finish() {
        let mut decoder = EventDecoder::new();
        assert!(decoder
            .process(b"data: {\"type\":\"error\",\"message\":\"boom\"}")
            .unwrap()
            .is_empty());
        assert_eq!(
            decoder.finish().unwrap(),
            Some(StreamEvent::Error {
                message: "boom".to_string()
            })
        );
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[test]
    fn test_non_object_payload_is_a_decode_error() {
        let mut decoder = EventDecoder::new();
        let error = decoder.process(b"event: content\ndata: [1,2]\n\n").unwrap_err();
        assert!(error.discards_partial_content());
    }

    #[tokio::test]
    async fn test_reader_reports_abnormal_close_without_terminal_event() {
        let mut reader = EventReader::new(body(&[
            "event: content_start\ndata: {\"type\":\"content_start\"}\n\n",
        ]));
        let items = drain(&mut reader).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok(StreamEvent::ContentStart));
        assert_eq!(items[1], Err(StreamError::AbnormalClose));
    }

    #[tokio::test]
    async fn test_reader_accepts_close_after_done() {
        let mut reader = EventReader::new(body(&[
            "data: {\"type\":\"done\",\"full_response\":\"hi\"}\n\n",
        ]));
        let items = drain(&mut reader).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }

    #[tokio::test]
    async fn test_reader_stops_after_stream_end() {
        let mut reader = EventReader::new(body(&[
            "data: {\"type\":\"stream_end\",\"conversation_id\":7}\n\ndata: {\"type\":\"content_start\"}\n\n",
        ]));
        let items = drain(&mut reader).await;
        assert_eq!(
            items,
            vec![Ok(StreamEvent::StreamEnd {
                conversation_id: 7,
                title: None
            })]
        );
    }

    #[tokio::test]
    async fn test_reader_surfaces_transport_errors_once() {
        let items: Vec<anyhow::Result<Bytes>> = vec![
            Ok(Bytes::from("data: {\"type\":\"content_start\"}\n\n")),
            Err(anyhow::anyhow!("connection reset")),
            Ok(Bytes::from("data: {\"type\":\"content_end\"}\n\n")),
        ];
        let mut reader = EventReader::new(Box::pin(stream::iter(items)));
        let drained = drain(&mut reader).await;
        assert_eq!(drained.len(), 2);
        assert!(matches!(&drained[1], Err(StreamError::Transport(msg)) if msg.contains("connection reset")));
    }
}
