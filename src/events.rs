// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// Downstream (Anthropic-style) event vocabulary.
//
// Each event mirrors one named SSE event on the Messages wire protocol.
// Constructors build the exact payload shapes; `sse_frame` renders the
// `event: <name>\ndata: <json>\n\n` framing the client consumes.

use crate::accumulator::BlockKind;
use crate::bridge::signature::BlockSignature;
use serde_json::{json, Value};

/// One event on the downstream wire.
#[derive(Debug, Clone, PartialEq)]
pub struct DownstreamEvent {
    /// SSE event name (e.g. "content_block_delta").
    pub name: &'static str,
    /// JSON payload carried on the data line.
    pub data: Value,
}

impl DownstreamEvent {
    /// Render the event as a complete SSE frame.
    pub fn sse_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name, self.data)
    }

    pub fn message_start(id: &str, model: &str, role: &str) -> Self {
        Self {
            name: "message_start",
            data: json!({
                "type": "message_start",
                "message": {
                    "id": id,
                    "type": "message",
                    "role": role,
                    "model": model,
                    "content": [],
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": {"input_tokens": 0, "output_tokens": 0}
                }
            }),
        }
    }

    /// Open a new content block. The block starts empty; its text arrives
    /// through deltas.
    pub fn content_block_start(index: usize, kind: BlockKind) -> Self {
        let content_block = match kind {
            BlockKind::Thinking => json!({"type": "thinking", "thinking": ""}),
            BlockKind::Text => json!({"type": "text", "text": ""}),
            BlockKind::ToolUse => json!({"type": "tool_use", "tool_use": ""}),
        };
        Self {
            name: "content_block_start",
            data: json!({
                "type": "content_block_start",
                "index": index,
                "content_block": content_block
            }),
        }
    }

    pub fn thinking_delta(index: usize, text: &str) -> Self {
        Self {
            name: "content_block_delta",
            data: json!({
                "type": "content_block_delta",
                "index": index,
                "delta": {"type": "thinking_delta", "thinking": text}
            }),
        }
    }

    pub fn text_delta(index: usize, text: &str) -> Self {
        Self {
            name: "content_block_delta",
            data: json!({
                "type": "content_block_delta",
                "index": index,
                "delta": {"type": "text_delta", "text": text}
            }),
        }
    }

    /// Provenance tag for a closed thinking block. Always emitted
    /// immediately before that block's content_block_stop.
    pub fn signature_delta(index: usize, sig: &BlockSignature) -> Self {
        Self {
            name: "signature_delta",
            data: json!({
                "type": "signature_delta",
                "index": index,
                "signature": {
                    "type": "provenance",
                    "hash": sig.hash,
                    "length": sig.length,
                    "timestamp": sig.timestamp
                }
            }),
        }
    }

    pub fn content_block_stop(index: usize) -> Self {
        Self {
            name: "content_block_stop",
            data: json!({"type": "content_block_stop", "index": index}),
        }
    }

    pub fn message_delta(stop_reason: &str, output_tokens: u64) -> Self {
        Self {
            name: "message_delta",
            data: json!({
                "type": "message_delta",
                "delta": {"stop_reason": stop_reason, "stop_sequence": null},
                "usage": {"output_tokens": output_tokens}
            }),
        }
    }

    pub fn message_stop() -> Self {
        Self {
            name: "message_stop",
            data: json!({"type": "message_stop"}),
        }
    }
}

/// Map an upstream finish reason onto a downstream stop reason.
///
/// Fixed table; unknown or absent reasons map to end_turn.
pub fn map_finish_reason(reason: Option<&str>) -> &'static str {
    match reason {
        Some("stop") => "end_turn",
        Some("length") => "max_tokens",
        Some("tool_calls") => "tool_use",
        Some("content_filter") => "stop_sequence",
        _ => "end_turn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_frame_has_event_and_data_lines() {
        let ev = DownstreamEvent::message_stop();
        let frame = ev.sse_frame();
        assert!(frame.starts_with("event: message_stop\ndata: "));
        assert!(frame.ends_with("\n\n"));
    }

    #[test]
    fn message_start_carries_zero_usage() {
        let ev = DownstreamEvent::message_start("msg_1", "gpt-4o", "assistant");
        assert_eq!(ev.data["message"]["usage"]["input_tokens"], 0);
        assert_eq!(ev.data["message"]["usage"]["output_tokens"], 0);
        assert_eq!(ev.data["message"]["role"], "assistant");
    }

    #[test]
    fn block_start_payload_matches_kind() {
        let ev = DownstreamEvent::content_block_start(0, BlockKind::Thinking);
        assert_eq!(ev.data["content_block"]["type"], "thinking");
        assert_eq!(ev.data["content_block"]["thinking"], "");

        let ev = DownstreamEvent::content_block_start(1, BlockKind::Text);
        assert_eq!(ev.data["content_block"]["type"], "text");
        assert_eq!(ev.data["index"], 1);
    }

    #[test]
    fn finish_reason_table() {
        assert_eq!(map_finish_reason(Some("stop")), "end_turn");
        assert_eq!(map_finish_reason(Some("length")), "max_tokens");
        assert_eq!(map_finish_reason(Some("tool_calls")), "tool_use");
        assert_eq!(map_finish_reason(Some("content_filter")), "stop_sequence");
        assert_eq!(map_finish_reason(Some("unknown")), "end_turn");
        assert_eq!(map_finish_reason(None), "end_turn");
    }
}
