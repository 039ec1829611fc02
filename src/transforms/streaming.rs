//! SSE stream transformation: OpenRouter chat completion chunks → Anthropic events.
//!
//! The upstream stream is a sequence of blank-line separated frames whose
//! `data:` lines carry `chat.completion.chunk` JSON (or the `[DONE]` sentinel).
//! [`StreamTranslator`] turns those chunks into the Anthropic event sequence
//! (`message_start`, `content_block_*`, `message_delta`, `message_stop`);
//! [`stream_openrouter_to_anthropic`] drives it over the live byte stream.
//!
//! Includes keep-alive pings to prevent connection timeouts while the
//! upstream is silent (e.g., long reasoning phases).

use std::collections::HashMap;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::interval;

use super::common::{generate_id, map_stop_reason};
use super::openrouter_compat::{ChatUsage, Usage};

/// Keep-alive interval for SSE streams (prevents proxy/load balancer timeouts).
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// SSE keep-alive comment (ignored by clients but keeps connection alive).
const KEEP_ALIVE_COMMENT: &str = ": keep-alive\n\n";

/// Stop reason reported when the upstream never sent a finish reason
const DEFAULT_STOP_REASON: &str = "end_turn";

/// Content block index reserved for the text block
const TEXT_BLOCK_INDEX: u32 = 0;

// ============================================================================
// OpenRouter Chunk Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<DeltaContent>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeltaContent {
    Text(String),
    Parts(Vec<DeltaPart>),
}

impl DeltaContent {
    fn into_text(self) -> String {
        match self {
            DeltaContent::Text(text) => text,
            DeltaContent::Parts(parts) => parts.into_iter().filter_map(|p| p.text).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeltaPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: Option<u32>,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

// ============================================================================
// Anthropic Event Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent<'a> {
    MessageStart {
        message: MessageStart<'a>,
    },
    ContentBlockStart {
        index: u32,
        content_block: BlockStart<'a>,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta<'a>,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: UsageDelta<'a>,
        usage: &'a Usage,
    },
    MessageStop {
        stop_reason: &'a str,
    },
}

impl StreamEvent<'_> {
    fn name(&self) -> &'static str {
        match self {
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::MessageDelta { .. } => "message_delta",
            StreamEvent::MessageStop { .. } => "message_stop",
        }
    }

    fn to_sse(&self) -> Bytes {
        let data = serde_json::to_string(self).unwrap_or_default();
        Bytes::from(format!("event: {}\ndata: {}\n\n", self.name(), data))
    }
}

#[derive(Debug, Serialize)]
struct MessageStart<'a> {
    id: &'a str,
    r#type: &'static str,
    role: &'static str,
    model: &'a str,
    content: Vec<Value>,
    stop_reason: Option<&'a str>,
    stop_sequence: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockStart<'a> {
    Text {
        text: &'a str,
    },
    ToolUse {
        id: &'a str,
        name: &'a str,
        input: Map<String, Value>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta<'a> {
    TextDelta { text: &'a str },
    InputJsonDelta { partial_json: &'a str },
}

#[derive(Debug, Serialize)]
struct UsageDelta<'a> {
    usage: &'a Usage,
}

// ============================================================================
// Stream State Machine
// ============================================================================

#[derive(Debug)]
struct ToolBlockState {
    index: u32,
    id: String,
    name: String,
    /// Argument fragments received so far
    buffer: String,
    open: bool,
}

/// Per-stream translation state. Owned by exactly one stream.
#[derive(Debug)]
pub struct StreamTranslator {
    message_id: String,
    original_model: String,
    text_block_open: bool,
    /// Next free tool block index (0 belongs to the text block)
    next_index: u32,
    /// Tool blocks in the order they were opened
    tool_blocks: Vec<ToolBlockState>,
    /// Upstream tool call id → slot in `tool_blocks`
    blocks_by_id: HashMap<String, usize>,
    /// Upstream tool call index → id, for fragments that omit the id
    ids_by_index: HashMap<u32, String>,
    stop_reason: Option<String>,
    finished: bool,
}

impl StreamTranslator {
    pub fn new(original_model: impl Into<String>) -> Self {
        Self {
            message_id: generate_id("msg"),
            original_model: original_model.into(),
            text_block_open: false,
            next_index: TEXT_BLOCK_INDEX + 1,
            tool_blocks: Vec::new(),
            blocks_by_id: HashMap::new(),
            ids_by_index: HashMap::new(),
            stop_reason: None,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The `message_start` event opening every stream.
    pub fn message_start(&self) -> Bytes {
        StreamEvent::MessageStart {
            message: MessageStart {
                id: &self.message_id,
                r#type: "message",
                role: "assistant",
                model: &self.original_model,
                content: Vec::new(),
                stop_reason: None,
                stop_sequence: None,
            },
        }
        .to_sse()
    }

    /// Process one upstream SSE frame, appending emitted events to `out`.
    ///
    /// Returns `true` once the `[DONE]` sentinel has finished the stream.
    pub fn process_frame(&mut self, frame: &str, out: &mut Vec<Bytes>) -> bool {
        if self.finished {
            return true;
        }
        for line in frame.lines() {
            // Comments (": keep-alive"), event names and ids carry nothing for us
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                self.finish(out);
                return true;
            }
            match serde_json::from_str::<ChatCompletionChunk>(data) {
                Ok(chunk) => self.handle_chunk(chunk, out),
                Err(e) => tracing::debug!("Skipping malformed stream chunk: {e}"),
            }
        }
        false
    }

    fn handle_chunk(&mut self, chunk: ChatCompletionChunk, out: &mut Vec<Bytes>) {
        let ChatCompletionChunk { choices, usage } = chunk;
        let Some(choice) = choices.into_iter().next() else {
            return;
        };

        if let Some(delta) = choice.delta {
            if let Some(content) = delta.content {
                let text = content.into_text();
                if !text.is_empty() {
                    self.push_text(&text, out);
                }
            }
            for call in delta.tool_calls.unwrap_or_default() {
                self.push_tool_call(call, out);
            }
        }

        // Last finish reason wins
        if let Some(reason) = map_stop_reason(choice.finish_reason.as_deref()) {
            self.stop_reason = Some(reason);
        }

        if let Some(usage) = usage {
            let usage = Usage::from(&usage);
            out.push(
                StreamEvent::MessageDelta {
                    delta: UsageDelta { usage: &usage },
                    usage: &usage,
                }
                .to_sse(),
            );
        }
    }

    fn push_text(&mut self, text: &str, out: &mut Vec<Bytes>) {
        if !self.text_block_open {
            self.text_block_open = true;
            out.push(
                StreamEvent::ContentBlockStart {
                    index: TEXT_BLOCK_INDEX,
                    content_block: BlockStart::Text { text: "" },
                }
                .to_sse(),
            );
        }
        out.push(
            StreamEvent::ContentBlockDelta {
                index: TEXT_BLOCK_INDEX,
                delta: BlockDelta::TextDelta { text },
            }
            .to_sse(),
        );
    }

    fn push_tool_call(&mut self, call: ToolCallDelta, out: &mut Vec<Bytes>) {
        let (name, arguments) = match call.function {
            Some(f) => (f.name, f.arguments),
            None => (None, None),
        };

        let id = match (call.id.filter(|id| !id.is_empty()), call.index) {
            (Some(id), index) => {
                if let Some(index) = index {
                    self.ids_by_index.insert(index, id.clone());
                }
                id
            }
            (None, Some(index)) => self
                .ids_by_index
                .entry(index)
                .or_insert_with(|| generate_id("tool"))
                .clone(),
            (None, None) => {
                tracing::debug!("Skipping tool call fragment without id or index");
                return;
            }
        };

        let slot = match self.blocks_by_id.get(&id) {
            Some(&slot) => slot,
            None => self.open_tool_block(id, name.unwrap_or_default(), out),
        };

        if let Some(arguments) = arguments.filter(|a| !a.is_empty()) {
            let block = &mut self.tool_blocks[slot];
            block.buffer.push_str(&arguments);
            out.push(
                StreamEvent::ContentBlockDelta {
                    index: block.index,
                    delta: BlockDelta::InputJsonDelta {
                        partial_json: &arguments,
                    },
                }
                .to_sse(),
            );
        }
    }

    fn open_tool_block(&mut self, id: String, name: String, out: &mut Vec<Bytes>) -> usize {
        let index = self.next_index;
        self.next_index += 1;

        out.push(
            StreamEvent::ContentBlockStart {
                index,
                content_block: BlockStart::ToolUse {
                    id: &id,
                    name: &name,
                    input: Map::new(),
                },
            }
            .to_sse(),
        );

        let slot = self.tool_blocks.len();
        self.blocks_by_id.insert(id.clone(), slot);
        self.tool_blocks.push(ToolBlockState {
            index,
            id,
            name,
            buffer: String::new(),
            open: true,
        });
        slot
    }

    /// Close every open block and emit `message_stop`. Idempotent.
    pub fn finish(&mut self, out: &mut Vec<Bytes>) {
        if self.finished {
            return;
        }
        self.finished = true;

        if self.text_block_open {
            self.text_block_open = false;
            out.push(
                StreamEvent::ContentBlockStop {
                    index: TEXT_BLOCK_INDEX,
                }
                .to_sse(),
            );
        }

        for block in self.tool_blocks.iter_mut().filter(|b| b.open) {
            if !block.buffer.is_empty() {
                out.push(
                    StreamEvent::ContentBlockDelta {
                        index: block.index,
                        delta: BlockDelta::InputJsonDelta { partial_json: "" },
                    }
                    .to_sse(),
                );
            }
            tracing::trace!(id = %block.id, name = %block.name, "Closing tool block");
            out.push(StreamEvent::ContentBlockStop { index: block.index }.to_sse());
            block.open = false;
        }

        out.push(
            StreamEvent::MessageStop {
                stop_reason: self.stop_reason.as_deref().unwrap_or(DEFAULT_STOP_REASON),
            }
            .to_sse(),
        );
    }
}

// ============================================================================
// Frame Buffer
// ============================================================================

/// Accumulates raw bytes and yields complete blank-line terminated frames.
#[derive(Debug, Default)]
struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    fn push(&mut self, chunk: &[u8]) {
        // CRLF line endings are folded to LF so frame boundaries are always "\n\n"
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
    }

    fn next_frame(&mut self) -> Option<String> {
        let pos = self.buf.windows(2).position(|w| w == b"\n\n")?;
        let frame: Vec<u8> = self.buf.drain(..pos + 2).collect();
        Some(String::from_utf8_lossy(&frame[..pos]).into_owned())
    }

    /// Whatever is left once the upstream ended without a final blank line
    fn take_rest(&mut self) -> Option<String> {
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

// ============================================================================
// Stream Transformation
// ============================================================================

/// Transform an OpenRouter SSE body into an Anthropic SSE stream.
///
/// Events are emitted as soon as each upstream frame completes. The stream
/// ends after `[DONE]` or when the upstream body ends, whichever is first;
/// dropping the returned stream drops (and releases) the upstream body.
///
/// Includes keep-alive pings every 15 seconds to prevent connection timeouts.
pub fn stream_openrouter_to_anthropic(
    body: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    original_model: String,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    stream! {
        use futures_util::StreamExt;

        let mut translator = StreamTranslator::new(original_model);
        yield Ok(translator.message_start());

        let mut frames = FrameBuffer::default();
        let mut out = Vec::new();
        let mut body = std::pin::pin!(body);
        let mut keep_alive = interval(KEEP_ALIVE_INTERVAL);
        keep_alive.reset(); // Don't fire immediately

        loop {
            tokio::select! {
                biased; // Prefer data over keep-alive when both ready

                // Data chunk received
                chunk_opt = body.next() => {
                    let Some(chunk_result) = chunk_opt else {
                        break; // Stream ended
                    };

                    let chunk = match chunk_result {
                        Ok(c) => c,
                        Err(e) => {
                            tracing::warn!("Upstream stream failed: {e}");
                            yield Err(std::io::Error::other(e));
                            return;
                        }
                    };

                    frames.push(&chunk);
                    while let Some(frame) = frames.next_frame() {
                        let done = translator.process_frame(&frame, &mut out);
                        for event in out.drain(..) {
                            yield Ok(event);
                        }
                        if done {
                            return;
                        }
                    }
                }

                // Keep-alive timer fired
                _ = keep_alive.tick() => {
                    yield Ok(Bytes::from_static(KEEP_ALIVE_COMMENT.as_bytes()));
                }
            }
        }

        if let Some(frame) = frames.take_rest() {
            translator.process_frame(&frame, &mut out);
        }
        translator.finish(&mut out);
        for event in out.drain(..) {
            yield Ok(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;

    /// Render upstream chunks as an OpenRouter SSE body
    fn sse(chunks: &[Value]) -> String {
        let mut body: String = chunks
            .iter()
            .map(|c| format!("data: {c}\n\n"))
            .collect();
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn text_chunk(text: &str) -> Value {
        json!({"choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]})
    }

    fn finish_chunk(reason: &str) -> Value {
        json!({"choices": [{"index": 0, "delta": {}, "finish_reason": reason}]})
    }

    fn tool_chunk(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> Value {
        let mut call = json!({"index": index, "type": "function", "function": {"arguments": args}});
        if let Some(id) = id {
            call["id"] = json!(id);
        }
        if let Some(name) = name {
            call["function"]["name"] = json!(name);
        }
        json!({"choices": [{"index": 0, "delta": {"tool_calls": [call]}, "finish_reason": null}]})
    }

    async fn run(parts: Vec<String>) -> Vec<(String, Value)> {
        let body = futures_util::stream::iter(
            parts
                .into_iter()
                .map(|p| Ok::<_, reqwest::Error>(Bytes::from(p))),
        );
        let chunks: Vec<Bytes> = stream_openrouter_to_anthropic(body, "or:gpt-5".to_string())
            .map(|r| r.unwrap())
            .collect()
            .await;
        let raw: String = chunks
            .iter()
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        parse_events(&raw)
    }

    fn parse_events(raw: &str) -> Vec<(String, Value)> {
        raw.split("\n\n")
            .filter(|frame| !frame.is_empty())
            .map(|frame| {
                let mut lines = frame.lines();
                let name = lines.next().unwrap().strip_prefix("event: ").unwrap();
                let data = lines.next().unwrap().strip_prefix("data: ").unwrap();
                (name.to_string(), serde_json::from_str(data).unwrap())
            })
            .collect()
    }

    fn names(events: &[(String, Value)]) -> Vec<&str> {
        events.iter().map(|(name, _)| name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_text_stream_sequence() {
        let body = sse(&[text_chunk("Hel"), text_chunk("lo"), finish_chunk("stop")]);
        let events = run(vec![body]).await;

        assert_eq!(
            names(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_stop",
            ]
        );

        let start = &events[0].1;
        assert_eq!(start["type"], "message_start");
        assert!(start["message"]["id"].as_str().unwrap().starts_with("msg_"));
        assert_eq!(start["message"]["model"], "or:gpt-5");
        assert_eq!(start["message"]["content"], json!([]));

        assert_eq!(
            events[1].1,
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})
        );
        assert_eq!(
            events[2].1["delta"],
            json!({"type": "text_delta", "text": "Hel"})
        );
        assert_eq!(events[3].1["delta"]["text"], "lo");
        assert_eq!(events[4].1, json!({"type": "content_block_stop", "index": 0}));
        assert_eq!(
            events[5].1,
            json!({"type": "message_stop", "stop_reason": "end_turn"})
        );
    }

    #[tokio::test]
    async fn test_interleaved_tool_calls() {
        let body = sse(&[
            tool_chunk(0, Some("a"), Some("get_weather"), "{\"ci"),
            tool_chunk(1, Some("b"), Some("get_time"), "{\"tz"),
            tool_chunk(0, Some("a"), None, "ty\":1}"),
            tool_chunk(1, Some("b"), None, "\":2}"),
            finish_chunk("tool_calls"),
        ]);
        let events = run(vec![body]).await;

        let starts: Vec<&Value> = events
            .iter()
            .filter(|(n, _)| n == "content_block_start")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0]["index"], 1);
        assert_eq!(
            starts[0]["content_block"],
            json!({"type": "tool_use", "id": "a", "name": "get_weather", "input": {}})
        );
        assert_eq!(starts[1]["index"], 2);
        assert_eq!(starts[1]["content_block"]["id"], "b");

        let deltas: Vec<(u64, &str)> = events
            .iter()
            .filter(|(n, _)| n == "content_block_delta")
            .map(|(_, v)| {
                (
                    v["index"].as_u64().unwrap(),
                    v["delta"]["partial_json"].as_str().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            deltas,
            vec![
                (1, "{\"ci"),
                (2, "{\"tz"),
                (1, "ty\":1}"),
                (2, "\":2}"),
                // flush markers before each stop
                (1, ""),
                (2, ""),
            ]
        );

        let tail: Vec<&str> = names(&events)[events.len() - 5..].to_vec();
        assert_eq!(
            tail,
            vec![
                "content_block_delta",
                "content_block_stop",
                "content_block_delta",
                "content_block_stop",
                "message_stop",
            ]
        );
        assert_eq!(events.last().unwrap().1["stop_reason"], "tool_use");
    }

    #[tokio::test]
    async fn test_fragments_without_id_follow_index() {
        let body = sse(&[
            tool_chunk(0, Some("call_x"), Some("search"), ""),
            tool_chunk(0, None, None, "{\"q\":"),
            tool_chunk(0, None, None, "\"rust\"}"),
        ]);
        let events = run(vec![body]).await;

        let starts = events.iter().filter(|(n, _)| n == "content_block_start").count();
        assert_eq!(starts, 1);
        let fragments: Vec<&str> = events
            .iter()
            .filter(|(n, _)| n == "content_block_delta")
            .map(|(_, v)| v["delta"]["partial_json"].as_str().unwrap())
            .collect();
        assert_eq!(fragments, vec!["{\"q\":", "\"rust\"}", ""]);
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_abort() {
        let mut body = String::from("data: {\"choices\": [\n\n");
        body.push_str(&sse(&[text_chunk("still here"), finish_chunk("length")]));
        let events = run(vec![body]).await;

        assert_eq!(events[2].1["delta"]["text"], "still here");
        assert_eq!(events.last().unwrap().1["stop_reason"], "max_tokens");
    }

    #[tokio::test]
    async fn test_frames_split_across_reads() {
        let body = sse(&[text_chunk("héllo"), finish_chunk("stop")]);
        let bytes = body.into_bytes();
        // Split mid-frame and inside the multi-byte 'é'
        let split = body_split_point(&bytes);

        let body = futures_util::stream::iter(vec![
            Ok::<_, reqwest::Error>(Bytes::copy_from_slice(&bytes[..split])),
            Ok(Bytes::copy_from_slice(&bytes[split..])),
        ]);
        let chunks: Vec<Bytes> = stream_openrouter_to_anthropic(body, "m".to_string())
            .map(|r| r.unwrap())
            .collect()
            .await;
        let raw: String = chunks
            .iter()
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        let events = parse_events(&raw);
        assert_eq!(events[2].1["delta"]["text"], "héllo");
    }

    fn body_split_point(bytes: &[u8]) -> usize {
        // First byte of the two-byte 'é' plus one lands inside the character
        bytes.iter().position(|b| *b == 0xC3).unwrap() + 1
    }

    #[tokio::test]
    async fn test_usage_is_forwarded_every_time() {
        let body = sse(&[
            json!({"choices": [{"delta": {"content": "a"}}], "usage": {"prompt_tokens": 5, "completion_tokens": 1}}),
            json!({"choices": [{"delta": {"content": "b"}}], "usage": {"prompt_tokens": 5, "completion_tokens": 2, "reasoning_tokens": 4}}),
        ]);
        let events = run(vec![body]).await;

        let usage: Vec<&Value> = events
            .iter()
            .filter(|(n, _)| n == "message_delta")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(usage.len(), 2);
        assert_eq!(
            usage[0]["delta"]["usage"],
            json!({"input_tokens": 5, "output_tokens": 1})
        );
        assert_eq!(usage[1]["usage"]["reasoning_tokens"], 4);
        assert_eq!(usage[1]["usage"]["output_tokens"], 2);
    }

    #[tokio::test]
    async fn test_end_without_done_still_closes() {
        // No [DONE] and no trailing blank line on the last frame
        let body = format!(
            "data: {}\n\ndata: {}",
            text_chunk("partial"),
            finish_chunk("stop")
        );
        let events = run(vec![body]).await;
        assert_eq!(
            names(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_stop",
            ]
        );
        assert_eq!(events.last().unwrap().1["stop_reason"], "end_turn");
    }

    #[tokio::test]
    async fn test_events_after_done_are_ignored() {
        let mut body = sse(&[text_chunk("one")]);
        body.push_str(&format!("data: {}\n\n", text_chunk("two")));
        let events = run(vec![body]).await;
        let texts: Vec<&str> = events
            .iter()
            .filter(|(n, _)| n == "content_block_delta")
            .map(|(_, v)| v["delta"]["text"].as_str().unwrap())
            .collect();
        assert_eq!(texts, vec!["one"]);
        assert_eq!(names(&events).last(), Some(&"message_stop"));
    }

    #[test]
    fn test_translator_text_after_tool_and_last_finish_reason_wins() {
        let mut translator = StreamTranslator::new("or:gpt-5");
        let mut out = Vec::new();

        let frame = |v: Value| format!("data: {v}");
        translator.process_frame(&frame(tool_chunk(0, Some("t1"), Some("f"), "")), &mut out);
        translator.process_frame(&frame(text_chunk("after")), &mut out);
        translator.process_frame(&frame(finish_chunk("tool_calls")), &mut out);
        translator.process_frame(&frame(finish_chunk("stop")), &mut out);
        translator.process_frame(": keep-alive", &mut out);
        // Chunk without choices is a no-op, usage included
        translator.process_frame(
            &frame(json!({"choices": [], "usage": {"prompt_tokens": 1}})),
            &mut out,
        );
        assert!(!translator.is_finished());
        translator.finish(&mut out);
        assert!(translator.is_finished());

        let raw: String = out
            .iter()
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        let events = parse_events(&raw);
        assert_eq!(
            names(&events),
            vec![
                "content_block_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_stop",
                "message_stop",
            ]
        );
        // Tool seen first keeps index 1; text always uses index 0
        assert_eq!(events[0].1["index"], 1);
        assert_eq!(events[1].1["index"], 0);
        assert_eq!(events[3].1["index"], 0);
        assert_eq!(events[4].1["index"], 1);
        assert_eq!(events[5].1["stop_reason"], "end_turn");
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_while_upstream_is_silent() {
        let first = format!("data: {}\n\n", text_chunk("thinking..."));
        let body = futures_util::stream::iter(vec![Ok::<_, reqwest::Error>(Bytes::from(first))])
            .chain(futures_util::stream::pending());
        let stream = stream_openrouter_to_anthropic(body, "or:gpt-5".to_string());
        let mut stream = std::pin::pin!(stream);

        let mut names = Vec::new();
        for _ in 0..3 {
            let chunk = stream.next().await.unwrap().unwrap();
            let text = String::from_utf8(chunk.to_vec()).unwrap();
            names.push(text.lines().next().unwrap().to_string());
        }
        assert_eq!(
            names,
            vec![
                "event: message_start",
                "event: content_block_start",
                "event: content_block_delta",
            ]
        );

        // Upstream is now pending forever; paused time auto-advances to the next tick
        let ping = stream.next().await.unwrap().unwrap();
        assert_eq!(ping, Bytes::from_static(KEEP_ALIVE_COMMENT.as_bytes()));
        let ping = stream.next().await.unwrap().unwrap();
        assert_eq!(&ping[..], b": keep-alive\n\n");
    }

    #[test]
    fn test_frame_buffer_crlf() {
        let mut frames = FrameBuffer::default();
        frames.push(b"data: one\r\n\r\ndata: tw");
        assert_eq!(frames.next_frame().as_deref(), Some("data: one"));
        assert_eq!(frames.next_frame(), None);
        frames.push(b"o\r\n\r\n");
        assert_eq!(frames.next_frame().as_deref(), Some("data: two"));
        assert_eq!(frames.take_rest(), None);
    }
}
