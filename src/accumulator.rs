// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// Per-connection stream state.
//
// One StreamState exists per in-flight request and is mutated only by
// the single task driving that connection. It owns the ordered content
// blocks, usage counters, tool-call drafts, and the resource limits
// that bound all of them.

use crate::error::BridgeError;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Default cap on content blocks per stream.
pub const DEFAULT_MAX_BLOCKS: usize = 100;

/// Default cap on bytes per block buffer.
pub const DEFAULT_MAX_BLOCK_BYTES: usize = 10 * 1024 * 1024; // 10 MiB

/// The type of a content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Thinking,
    Text,
    ToolUse,
}

/// A typed, indexed unit of streamed output.
///
/// Content grows only through `add_delta`; a stopped block is never
/// reopened. Each block owns its one buffer — there is no per-kind
/// working buffer alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    pub index: usize,
    pub kind: BlockKind,
    pub content: String,
    pub started: bool,
    pub stopped: bool,
}

impl ContentBlock {
    pub fn is_open(&self) -> bool {
        self.started && !self.stopped
    }
}

/// Token usage counters, normalized from either upstream naming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Resource bounds for one stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamLimits {
    pub max_blocks: usize,
    pub max_block_bytes: usize,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_blocks: DEFAULT_MAX_BLOCKS,
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
        }
    }
}

/// A complete tool call recovered from accumulated fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments (not a raw string).
    pub arguments: Value,
}

/// In-progress tool call, keyed by upstream call index.
///
/// Fragments are concatenated as opaque strings; the arguments are
/// parsed exactly once, when the call is known complete. A fragment
/// boundary can land mid-escape-sequence, so incremental parsing would
/// corrupt the result.
#[derive(Debug, Clone, Default)]
pub struct ToolCallDraft {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallDraft {
    fn parse(&self) -> Result<ToolCall, serde_json::Error> {
        let arguments = if self.arguments.is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.arguments)?
        };
        Ok(ToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments,
        })
    }
}

/// Read-only diagnostic snapshot of a stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSummary {
    pub message_id: Option<String>,
    pub model: String,
    pub role: String,
    pub block_count: usize,
    pub open_block: Option<usize>,
    pub usage: Usage,
    pub finish_reason: Option<String>,
    pub message_started: bool,
    pub finalized: bool,
    pub tool_call_count: usize,
}

/// All mutable state for one in-flight connection.
pub struct StreamState {
    pub message_id: Option<String>,
    pub model: String,
    pub role: String,
    blocks: Vec<ContentBlock>,
    open: Option<usize>,
    pub usage: Usage,
    pub finish_reason: Option<String>,
    pub message_started: bool,
    pub finalized: bool,
    tool_calls: BTreeMap<u64, ToolCallDraft>,
    limits: StreamLimits,
}

impl StreamState {
    pub fn new(model: impl Into<String>, limits: StreamLimits) -> Self {
        Self {
            message_id: None,
            model: model.into(),
            role: "assistant".to_string(),
            blocks: Vec::new(),
            open: None,
            usage: Usage::default(),
            finish_reason: None,
            message_started: false,
            finalized: false,
            tool_calls: BTreeMap::new(),
            limits,
        }
    }

    /// The open (started, not stopped) block, if any.
    pub fn current_block(&self) -> Option<&ContentBlock> {
        self.open.map(|i| &self.blocks[i])
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    /// Open a new block of the given kind and return its index.
    ///
    /// Indices are assigned in strictly increasing order from 0. Fails
    /// once the stream already holds `max_blocks` blocks.
    pub fn start_block(&mut self, kind: BlockKind) -> Result<usize, BridgeError> {
        if self.blocks.len() >= self.limits.max_blocks {
            return Err(BridgeError::BlockLimitExceeded {
                limit: self.limits.max_blocks,
            });
        }

        // The transformer closes the open block before starting another;
        // if a caller didn't, close it here so the exclusive-open
        // invariant holds.
        if let Some(open) = self.open.take() {
            tracing::warn!(index = open, "starting block while another is open");
            self.blocks[open].stopped = true;
        }

        let index = self.blocks.len();
        self.blocks.push(ContentBlock {
            index,
            kind,
            content: String::new(),
            started: true,
            stopped: false,
        });
        self.open = Some(index);
        Ok(index)
    }

    /// Append delta text to the open block.
    ///
    /// With no open block this is a logged no-op. If the post-append
    /// length would exceed the block byte cap, the error is raised and
    /// the content is left at its pre-overflow value.
    pub fn add_delta(&mut self, text: &str) -> Result<(), BridgeError> {
        let Some(index) = self.open else {
            tracing::warn!("delta with no open block, dropping");
            return Ok(());
        };

        let block = &mut self.blocks[index];
        if block.content.len() + text.len() > self.limits.max_block_bytes {
            return Err(BridgeError::BlockBufferOverflow {
                index,
                limit: self.limits.max_block_bytes,
            });
        }
        block.content.push_str(text);
        Ok(())
    }

    /// Close the open block. Returns its index, or None if none was open.
    pub fn stop_current_block(&mut self) -> Option<usize> {
        let index = self.open.take()?;
        self.blocks[index].stopped = true;
        Some(index)
    }

    /// Normalize usage counters from either upstream naming scheme.
    pub fn update_usage(&mut self, usage: &Value) {
        let read = |keys: [&str; 2]| {
            keys.iter()
                .find_map(|k| usage.get(k).and_then(Value::as_u64))
        };
        if let Some(input) = read(["prompt_tokens", "input_tokens"]) {
            self.usage.input_tokens = input;
        }
        if let Some(output) = read(["completion_tokens", "output_tokens"]) {
            self.usage.output_tokens = output;
        }
    }

    /// Accumulate one tool-call fragment, keyed by upstream call index.
    ///
    /// Drafts share the per-block byte cap so a malfunctioning upstream
    /// cannot grow them without bound.
    pub fn append_tool_fragment(
        &mut self,
        call_index: u64,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> Result<(), BridgeError> {
        let draft = self.tool_calls.entry(call_index).or_default();
        if let Some(id) = id {
            draft.id.push_str(id);
        }
        if let Some(name) = name {
            draft.name.push_str(name);
        }
        if let Some(arguments) = arguments {
            if draft.arguments.len() + arguments.len() > self.limits.max_block_bytes {
                return Err(BridgeError::BlockBufferOverflow {
                    index: call_index as usize,
                    limit: self.limits.max_block_bytes,
                });
            }
            draft.arguments.push_str(arguments);
        }
        Ok(())
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Parse every accumulated draft into a complete tool call.
    ///
    /// Called once the calls are known complete (finish reason
    /// `tool_calls`, or stream end). A draft whose argument string does
    /// not parse is logged and skipped.
    pub fn completed_tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls
            .values()
            .filter_map(|draft| match draft.parse() {
                Ok(call) => Some(call),
                Err(err) => {
                    tracing::warn!(%err, id = %draft.id, "dropping tool call with unparseable arguments");
                    None
                }
            })
            .collect()
    }

    /// Read-only snapshot for diagnostics.
    pub fn summary(&self) -> StreamSummary {
        StreamSummary {
            message_id: self.message_id.clone(),
            model: self.model.clone(),
            role: self.role.clone(),
            block_count: self.blocks.len(),
            open_block: self.open,
            usage: self.usage,
            finish_reason: self.finish_reason.clone(),
            message_started: self.message_started,
            finalized: self.finalized,
            tool_call_count: self.tool_calls.len(),
        }
    }
}
