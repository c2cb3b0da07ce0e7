use super::stream_block::{joined_text, ContentBlock};
use crate::types::StreamEvent;

/// What applying one event did to the block list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Blocks changed.
    Updated,
    /// Not a content event, or nothing to do.
    Passthrough,
    /// Out-of-order event, recovered by synthesizing or closing a block.
    Recovered,
}

/// Folds the content events of one turn into an ordered block list.
///
/// Blocks are append-only: a closed block is never reopened or edited, and
/// the list never shrinks. Replaying the same event prefix always yields the
/// same blocks.
#[derive(Debug, Default, Clone)]
pub struct BlockAssembler {
    blocks: Vec<ContentBlock>,
    violations: usize,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replay<'a>(events: impl IntoIterator<Item = &'a StreamEvent>) -> Self {
        let mut assembler = Self::new();
        for event in events {
            assembler.apply(event);
        }
        assembler
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    pub fn violations(&self) -> usize {
        self.violations
    }

    pub fn text(&self) -> String {
        joined_text(&self.blocks)
    }

    pub fn apply(&mut self, event: &StreamEvent) -> Applied {
        match event {
            StreamEvent::ThinkingStart => {
                self.close_open_prose();
                self.blocks.push(ContentBlock::thinking());
                Applied::Updated
            }
            StreamEvent::Thinking { text } => self.append_prose(ProseKind::Thinking, text),
            StreamEvent::ThinkingEnd => self.close_prose(ProseKind::Thinking),
            StreamEvent::ContentStart => {
                self.close_open_prose();
                self.blocks.push(ContentBlock::text());
                Applied::Updated
            }
            StreamEvent::Content { text } => self.append_prose(ProseKind::Text, text),
            StreamEvent::ContentEnd => self.close_prose(ProseKind::Text),
            StreamEvent::ToolStart {
                name,
                params,
                chat_render_hint,
            } => {
                self.close_open_prose();
                self.blocks.push(ContentBlock::tool_call(
                    name.clone(),
                    params.clone(),
                    chat_render_hint.clone(),
                ));
                Applied::Updated
            }
            StreamEvent::ToolEnd { name, result } => self.complete_tool(name, result),
            StreamEvent::Meta { .. }
            | StreamEvent::Done { .. }
            | StreamEvent::StreamEnd { .. }
            | StreamEvent::Error { .. }
            | StreamEvent::Unknown { .. } => Applied::Passthrough,
        }
    }

    /// Closes every open block and hands the list over.
    pub fn finish(mut self) -> Vec<ContentBlock> {
        for block in &mut self.blocks {
            block.close();
        }
        self.blocks
    }

    fn append_prose(&mut self, kind: ProseKind, delta: &str) -> Applied {
        if let Some(content) = self.open_prose_tail(kind) {
            content.push_str(delta);
            return Applied::Updated;
        }

        self.violations += 1;
        tracing::warn!(
            block = kind.label(),
            delta_len = delta.len(),
            "delta without an open block; opening one implicitly"
        );
        self.close_open_prose();
        let mut block = kind.open_block();
        if let ContentBlock::Thinking { content, .. } | ContentBlock::Text { content, .. } =
            &mut block
        {
            content.push_str(delta);
        }
        self.blocks.push(block);
        Applied::Recovered
    }

    fn close_prose(&mut self, kind: ProseKind) -> Applied {
        if self.open_prose_tail(kind).is_some() {
            if let Some(last) = self.blocks.last_mut() {
                last.close();
            }
            return Applied::Updated;
        }

        self.violations += 1;
        tracing::warn!(block = kind.label(), "end event without an open block; ignored");
        Applied::Recovered
    }

    fn complete_tool(&mut self, name: &str, tool_result: &str) -> Applied {
        let open_match = self.blocks.iter_mut().rev().find(|block| {
            matches!(block, ContentBlock::ToolCall { name: n, is_complete: false, .. } if n == name)
        });

        if let Some(ContentBlock::ToolCall {
            result,
            is_complete,
            ..
        }) = open_match
        {
            *result = Some(tool_result.to_string());
            *is_complete = true;
            return Applied::Updated;
        }

        self.violations += 1;
        tracing::warn!(
            tool = name,
            "tool_end without a matching open tool_call; synthesizing a completed block"
        );
        self.close_open_prose();
        self.blocks.push(ContentBlock::ToolCall {
            name: name.to_string(),
            params: None,
            result: Some(tool_result.to_string()),
            is_complete: true,
            chat_render_hint: None,
        });
        Applied::Recovered
    }

    fn open_prose_tail(&mut self, kind: ProseKind) -> Option<&mut String> {
        match (self.blocks.last_mut(), kind) {
            (
                Some(ContentBlock::Thinking {
                    content,
                    is_streaming: true,
                }),
                ProseKind::Thinking,
            )
            | (
                Some(ContentBlock::Text {
                    content,
                    is_streaming: true,
                }),
                ProseKind::Text,
            ) => Some(content),
            _ => None,
        }
    }

    fn close_open_prose(&mut self) {
        if let Some(last) = self.blocks.last_mut() {
            if last.is_prose() && last.is_open() {
                last.close();
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ProseKind {
    Thinking,
    Text,
}

impl ProseKind {
    fn label(self) -> &'static str {
        match self {
            ProseKind::Thinking => "thinking",
            ProseKind::Text => "text",
        }
    }

    fn open_block(self) -> ContentBlock {
        match self {
            ProseKind::Thinking => ContentBlock::thinking(),
            ProseKind::Text => ContentBlock::text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str) -> StreamEvent {
        StreamEvent::Content {
            text: text.to_string(),
        }
    }

    fn thinking(text: &str) -> StreamEvent {
        StreamEvent::Thinking {
            text: text.to_string(),
        }
    }

    fn tool_start(name: &str) -> StreamEvent {
        StreamEvent::ToolStart {
            name: name.to_string(),
            params: None,
            chat_render_hint: None,
        }
    }

    fn tool_end(name: &str, result: &str) -> StreamEvent {
        StreamEvent::ToolEnd {
            name: name.to_string(),
            result: result.to_string(),
        }
    }

    #[test]
    fn test_text_deltas_merge_into_open_block() {
        let events = [
            StreamEvent::ContentStart,
            content("Hel"),
            content("lo"),
            StreamEvent::ContentEnd,
        ];
        let assembler = BlockAssembler::replay(&events);
        assert_eq!(
            assembler.blocks(),
            &[ContentBlock::Text {
                content: "Hello".to_string(),
                is_streaming: false,
            }]
        );
        assert_eq!(assembler.violations(), 0);
    }

    #[test]
    fn test_tool_start_closes_open_thinking() {
        let events = [
            StreamEvent::ThinkingStart,
            thinking("because "),
            tool_start("lookup"),
        ];
        let assembler = BlockAssembler::replay(&events);
        assert_eq!(
            assembler.blocks(),
            &[
                ContentBlock::Thinking {
                    content: "because ".to_string(),
                    is_streaming: false,
                },
                ContentBlock::tool_call("lookup", None, None),
            ]
        );
    }

    #[test]
    fn test_prose_start_leaves_open_tool_call_matchable() {
        let events = [
            tool_start("lookup"),
            StreamEvent::ContentStart,
            content("meanwhile"),
            tool_end("lookup", "r"),
        ];
        let assembler = BlockAssembler::replay(&events);
        assert_eq!(
            assembler.blocks(),
            &[
                ContentBlock::ToolCall {
                    name: "lookup".to_string(),
                    params: None,
                    result: Some("r".to_string()),
                    is_complete: true,
                    chat_render_hint: None,
                },
                ContentBlock::Text {
                    content: "meanwhile".to_string(),
                    is_streaming: true,
                },
            ]
        );
        assert_eq!(assembler.violations(), 0);
    }

    #[test]
    fn test_tool_end_completes_most_recent_matching_call() {
        let events = [
            tool_start("lookup"),
            tool_start("search"),
            tool_start("lookup"),
            tool_end("lookup", "second"),
            tool_end("lookup", "first"),
        ];
        let assembler = BlockAssembler::replay(&events);
        let results: Vec<Option<&str>> = assembler
            .blocks()
            .iter()
            .map(|block| match block {
                ContentBlock::ToolCall { result, .. } => result.as_deref(),
                _ => None,
            })
            .collect();
        assert_eq!(results, vec![Some("first"), None, Some("second")]);
        assert!(assembler.blocks()[1].is_open());
    }

    #[test]
    fn test_unmatched_tool_end_synthesizes_completed_block() {
        let events = [StreamEvent::ContentStart, content("a"), tool_end("lookup", "42")];
        let assembler = BlockAssembler::replay(&events);
        assert_eq!(assembler.violations(), 1);
        assert_eq!(
            assembler.blocks()[1],
            ContentBlock::ToolCall {
                name: "lookup".to_string(),
                params: None,
                result: Some("42".to_string()),
                is_complete: true,
                chat_render_hint: None,
            }
        );
        assert!(!assembler.blocks()[0].is_open());
    }

    #[test]
    fn test_delta_without_open_block_opens_one_implicitly() {
        let mut assembler = BlockAssembler::new();
        assert_eq!(assembler.apply(&content("orphan")), Applied::Recovered);
        assert_eq!(assembler.apply(&content(" text")), Applied::Updated);
        assert_eq!(assembler.text(), "orphan text");

        // A thinking delta after a text block opens a new thinking block.
        assert_eq!(assembler.apply(&thinking("hm")), Applied::Recovered);
        assert_eq!(assembler.blocks().len(), 2);
        assert!(!assembler.blocks()[0].is_open());
    }

    #[test]
    fn test_end_without_open_block_is_ignored() {
        let mut assembler = BlockAssembler::new();
        assert_eq!(assembler.apply(&StreamEvent::ThinkingEnd), Applied::Recovered);
        assert!(assembler.blocks().is_empty());
    }

    #[test]
    fn test_non_content_events_pass_through() {
        let mut assembler = BlockAssembler::new();
        let events = [
            StreamEvent::Meta { conversation_id: 3 },
            StreamEvent::Done {
                full_response: "x".to_string(),
                full_thinking: None,
            },
            StreamEvent::StreamEnd {
                conversation_id: 3,
                title: None,
            },
        ];
        for event in &events {
            assert_eq!(assembler.apply(event), Applied::Passthrough);
        }
        assert!(assembler.blocks().is_empty());
    }

    #[test]
    fn test_blocks_never_shrink_and_closed_blocks_never_change() {
        let events = [
            StreamEvent::ThinkingStart,
            thinking("plan"),
            StreamEvent::ThinkingEnd,
            thinking("stray"),
            StreamEvent::ContentStart,
            content("one"),
            tool_start("lookup"),
            content("two"),
            tool_end("lookup", "done"),
            tool_end("missing", "synth"),
            StreamEvent::ContentEnd,
            StreamEvent::ContentStart,
            content("three"),
        ];

        let mut assembler = BlockAssembler::new();
        let mut previous: Vec<ContentBlock> = Vec::new();
        for event in &events {
            assembler.apply(event);
            let current = assembler.blocks();
            assert!(current.len() >= previous.len());
            for (before, after) in previous.iter().zip(current) {
                if !before.is_open() {
                    assert_eq!(before, after);
                }
            }
            previous = current.to_vec();
        }
    }

    #[test]
    fn test_finish_closes_every_block_without_touching_content() {
        let events = [StreamEvent::ContentStart, content("partial"), tool_start("lookup")];
        let blocks = BlockAssembler::replay(&events).finish();
        assert!(blocks.iter().all(|block| !block.is_open()));
        assert_eq!(joined_text(&blocks), "partial");
    }

    #[test]
    fn test_replay_is_deterministic() {
        let events = [
            StreamEvent::ThinkingStart,
            thinking("a"),
            StreamEvent::ContentStart,
            content("b"),
        ];
        let first = BlockAssembler::replay(&events);
        let second = BlockAssembler::replay(&events);
        assert_eq!(first.blocks(), second.blocks());
    }
}
