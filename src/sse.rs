// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// SSE frame parser.
//
// Turns raw upstream bytes into discrete events, carrying the last
// incomplete line across reads. Lines are split at the byte level and
// converted to text only once complete, so a multi-byte UTF-8 sequence
// straddling a read boundary is reassembled intact. One `data:` line
// produces at most one event; malformed payloads are dropped, not
// fatal. Both the carry-over buffer and individual lines are capped so
// the upstream cannot grow memory without bound.

use crate::error::BridgeError;
use serde_json::Value;

/// Literal end-of-stream marker on the upstream wire.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Default cap on carry-over bytes between reads.
pub const DEFAULT_MAX_FRAME_BUFFER_BYTES: usize = 1_048_576; // 1 MiB

/// Event name used when no `event:` line preceded the data line.
const DEFAULT_EVENT_NAME: &str = "message";

/// One parsed upstream event.
///
/// `data == None` together with `name == "done"` is the completion
/// sentinel; every other emitted event carries a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEvent {
    pub name: String,
    pub data: Option<Value>,
    /// 1-based position among emitted events. Dropped lines do not
    /// advance it.
    pub seq: u64,
}

impl UpstreamEvent {
    pub fn is_done(&self) -> bool {
        self.name == "done" && self.data.is_none()
    }
}

/// Incremental SSE parser with partial-line reassembly.
///
/// Not safe for concurrent mutation; exactly one task drives a given
/// connection's parser.
pub struct SseParser {
    /// Unconsumed tail of the input (at most one incomplete line).
    /// Raw bytes, since reads can end mid-UTF-8-sequence.
    buffer: Vec<u8>,
    /// Name from the most recent `event:` line, pending its data line.
    pending_event: Option<String>,
    seq: u64,
    max_buffer_bytes: usize,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BUFFER_BYTES)
    }
}

impl SseParser {
    pub fn new(max_buffer_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            pending_event: None,
            seq: 0,
            max_buffer_bytes,
        }
    }

    /// Parse a chunk of upstream bytes, returning every event completed
    /// by it. Partial trailing lines are kept for the next call; text
    /// conversion happens per complete line, never mid-sequence.
    pub fn parse(&mut self, chunk: &[u8]) -> Result<Vec<UpstreamEvent>, BridgeError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            // The byte cap bounds complete lines too, not just the
            // carry-over tail.
            if newline_pos > self.max_buffer_bytes {
                return Err(BridgeError::FrameBufferOverflow {
                    size: newline_pos,
                    limit: self.max_buffer_bytes,
                });
            }
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            if let Some(event) = self.process_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }

        if self.buffer.len() > self.max_buffer_bytes {
            return Err(BridgeError::FrameBufferOverflow {
                size: self.buffer.len(),
                limit: self.max_buffer_bytes,
            });
        }

        Ok(events)
    }

    /// Clear all state for reuse on a fresh connection.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending_event = None;
        self.seq = 0;
    }

    /// Number of events emitted so far.
    pub fn emitted(&self) -> u64 {
        self.seq
    }

    fn process_line(&mut self, line: &str) -> Option<UpstreamEvent> {
        // Blank line: SSE dispatch boundary. Any dangling event name is
        // discarded along with it.
        if line.is_empty() {
            self.pending_event = None;
            return None;
        }

        // Comment line.
        if line.starts_with(':') {
            return None;
        }

        if let Some(name) = strip_field(line, "event") {
            self.pending_event = Some(name.to_string());
            return None;
        }

        // `id:` and `retry:` are legal SSE fields we have no use for.
        if strip_field(line, "id").is_some() || strip_field(line, "retry").is_some() {
            return None;
        }

        let Some(data) = strip_field(line, "data") else {
            tracing::debug!(line, "unrecognized SSE line, ignoring");
            return None;
        };

        if data.trim() == DONE_SENTINEL {
            self.pending_event = None;
            self.seq += 1;
            return Some(UpstreamEvent {
                name: "done".to_string(),
                data: None,
                seq: self.seq,
            });
        }

        match serde_json::from_str::<Value>(data) {
            Ok(payload) => {
                let name = self
                    .pending_event
                    .take()
                    .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string());
                self.seq += 1;
                Some(UpstreamEvent {
                    name,
                    data: Some(payload),
                    seq: self.seq,
                })
            }
            Err(err) => {
                // Recovered locally: drop this one line, keep parsing.
                tracing::warn!(%err, "dropping malformed SSE data line");
                self.pending_event = None;
                None
            }
        }
    }
}

/// Strip an SSE field prefix (`name:` with optional following space).
fn strip_field<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_data_line_yields_one_event() {
        let mut parser = SseParser::default();
        let events = parser.parse(b"data: {\"a\":1}\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "message");
        assert_eq!(events[0].data, Some(json!({"a": 1})));
        assert_eq!(events[0].seq, 1);
    }

    #[test]
    fn event_line_names_the_following_data_line() {
        let mut parser = SseParser::default();
        let events = parser
            .parse(b"event: ping\ndata: {\"ok\":true}\n\n")
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "ping");
    }

    #[test]
    fn partial_frame_reassembled_across_calls() {
        let mut parser = SseParser::default();
        let first = parser.parse(b"data: {\"a\":1").unwrap();
        assert!(first.is_empty());

        let second = parser.parse(b"}\n\n").unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].data, Some(json!({"a": 1})));
    }

    #[test]
    fn multibyte_sequence_split_across_reads_stays_intact() {
        // "café" is caf + 0xC3 0xA9; the read boundary lands between the
        // two bytes of the é.
        let mut parser = SseParser::default();
        let first = parser.parse(b"data: {\"content\":\"caf\xc3").unwrap();
        assert!(first.is_empty());

        let events = parser.parse(b"\xa9\"}\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, Some(json!({"content": "café"})));
    }

    #[test]
    fn done_sentinel_yields_done_event_with_null_payload() {
        let mut parser = SseParser::default();
        let events = parser.parse(b"data: [DONE]\n").unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_done());
        assert_eq!(events[0].seq, 1);
    }

    #[test]
    fn sentinel_does_not_corrupt_buffered_partial_event() {
        // A complete sentinel line arrives while another event's data is
        // still split across reads.
        let mut parser = SseParser::default();
        assert!(parser.parse(b"data: {\"x\":").unwrap().is_empty());

        // The partial line stays buffered; nothing else interleaves on the
        // wire within a line, so completing it still yields the one event.
        let events = parser.parse(b"2}\ndata: [DONE]\n").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, Some(json!({"x": 2})));
        assert!(events[1].is_done());
    }

    #[test]
    fn malformed_data_line_dropped_without_advancing_seq() {
        let mut parser = SseParser::default();
        let events = parser
            .parse(b"data: {\"a\":1}\ndata: {not json\ndata: {\"b\":2}\n")
            .unwrap();
        // Scenario B: one malformed line among valid ones yields exactly
        // the valid events, not an empty-object replacement.
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 1);
        assert_eq!(events[1].seq, 2);
        assert_eq!(events[1].data, Some(json!({"b": 2})));
    }

    #[test]
    fn id_retry_and_comment_lines_ignored() {
        let mut parser = SseParser::default();
        let events = parser
            .parse(b": keepalive\nid: 7\nretry: 3000\ndata: {\"a\":1}\n")
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn buffer_overflow_raises_resource_limit_error() {
        let mut parser = SseParser::new(64);
        let big = vec![b'x'; 128];
        let err = parser.parse(&big).unwrap_err();
        assert!(matches!(err, BridgeError::FrameBufferOverflow { .. }));
    }

    #[test]
    fn oversized_complete_line_rejected_even_when_terminated() {
        // A newline-terminated line past the cap is rejected, not parsed:
        // the bound holds whether or not the line arrived whole.
        let mut parser = SseParser::new(64);
        let mut big = b"data: {\"a\":\"".to_vec();
        big.extend(std::iter::repeat(b'x').take(128));
        big.extend(b"\"}\n");

        let err = parser.parse(&big).unwrap_err();
        assert!(matches!(err, BridgeError::FrameBufferOverflow { .. }));
        assert_eq!(parser.emitted(), 0);
    }

    #[test]
    fn reset_clears_buffer_and_counters() {
        let mut parser = SseParser::default();
        parser.parse(b"data: {\"a\":1}\ndata: {\"par").unwrap();
        assert_eq!(parser.emitted(), 1);

        parser.reset();
        assert_eq!(parser.emitted(), 0);

        // The stale partial line is gone; a fresh event parses cleanly.
        let events = parser.parse(b"data: {\"b\":2}\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].seq, 1);
    }

    #[test]
    fn crlf_line_endings_handled() {
        let mut parser = SseParser::default();
        let events = parser.parse(b"data: {\"a\":1}\r\n\r\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, Some(json!({"a": 1})));
    }
}
