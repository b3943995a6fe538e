// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// Streaming transformer.
//
// Consumes parsed upstream events and drives the per-connection
// accumulator, producing ordered downstream events. Conceptually:
//
//   NoMessage -> MessageStarted -> (OpenBlock{Thinking|Text})* -> Finalized
//
// Reasoning text and answer text live in separate blocks; a thinking
// block is signed and stopped before any answer text opens. Tool-call
// fragments accumulate silently and are parsed only at the end.

use super::signature::sign_block;
use crate::accumulator::{BlockKind, StreamLimits, StreamState, StreamSummary};
use crate::error::BridgeError;
use crate::events::{map_finish_reason, DownstreamEvent};
use crate::observe::{BridgeObserver, NoopObserver};
use crate::sse::UpstreamEvent;
use serde_json::Value;
use std::sync::Arc;

/// The orchestrating state machine for one upstream connection.
///
/// Exactly one task drives a given bridge; neither it nor its state is
/// safe for concurrent mutation.
pub struct StreamBridge {
    state: StreamState,
    observer: Arc<dyn BridgeObserver>,
}

impl StreamBridge {
    /// Create a bridge for one connection. `model` seeds the
    /// message_start payload until the upstream reports its own.
    pub fn new(model: impl Into<String>, limits: StreamLimits) -> Self {
        Self::with_observer(model, limits, Arc::new(NoopObserver))
    }

    pub fn with_observer(
        model: impl Into<String>,
        limits: StreamLimits,
        observer: Arc<dyn BridgeObserver>,
    ) -> Self {
        Self {
            state: StreamState::new(model, limits),
            observer,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn summary(&self) -> StreamSummary {
        self.state.summary()
    }

    /// Process one upstream event, returning the downstream events it
    /// produced in emission order.
    ///
    /// Finalized is terminal: anything pushed after the stream closed is
    /// dropped, so no block event can follow message_stop. A
    /// resource-limit error aborts this stream; the caller must not push
    /// further events after one.
    pub fn push(&mut self, event: &UpstreamEvent) -> Result<Vec<DownstreamEvent>, BridgeError> {
        self.observer.on_upstream_event(event);

        if self.state.finalized {
            tracing::debug!(name = %event.name, "event after finalize, dropping");
            return Ok(Vec::new());
        }
        if event.is_done() {
            return Ok(self.finalize());
        }
        let Some(payload) = event.data.as_ref() else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();

        if self.state.message_id.is_none() {
            if let Some(id) = payload.get("id").and_then(Value::as_str) {
                self.state.message_id = Some(id.to_string());
            }
        }
        if let Some(model) = payload.get("model").and_then(Value::as_str) {
            if !model.is_empty() {
                self.state.model = model.to_string();
            }
        }
        if let Some(usage) = payload.get("usage") {
            // Stored only; usage surfaces at finalize.
            self.state.update_usage(usage);
        }

        if let Some(choice) = payload.get("choices").and_then(|c| c.get(0)) {
            if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                self.state.finish_reason = Some(reason.to_string());
            }
            if let Some(delta) = choice.get("delta") {
                self.process_delta(delta, &mut out)?;
            }
        }

        for event in &out {
            self.observer.on_downstream_event(event);
        }
        Ok(out)
    }

    /// Close the stream: stop any open block, emit the final
    /// message_delta and message_stop, and mark the stream finalized.
    ///
    /// Idempotent — a second call returns no events. The caller invokes
    /// this directly when the upstream ends without a sentinel so the
    /// client still receives a well-formed close.
    pub fn finalize(&mut self) -> Vec<DownstreamEvent> {
        if self.state.finalized {
            return Vec::new();
        }

        let mut out = Vec::new();
        self.close_open_block(&mut out);
        out.push(DownstreamEvent::message_delta(
            map_finish_reason(self.state.finish_reason.as_deref()),
            self.state.usage.output_tokens,
        ));
        out.push(DownstreamEvent::message_stop());
        self.state.finalized = true;

        // Tool-call drafts are parsed exactly once, here.
        let tool_calls = self.state.completed_tool_calls();
        for event in &out {
            self.observer.on_downstream_event(event);
        }
        self.observer.on_stream_closed(&self.state.summary(), &tool_calls);
        out
    }

    fn process_delta(
        &mut self,
        delta: &Value,
        out: &mut Vec<DownstreamEvent>,
    ) -> Result<(), BridgeError> {
        if let Some(role) = delta.get("role").and_then(Value::as_str) {
            // Expected once, before content. Late changes are recorded
            // but message_start is never re-emitted.
            self.state.role = role.to_string();
        }

        if !self.state.message_started {
            self.state.message_started = true;
            let id = self
                .state
                .message_id
                .get_or_insert_with(|| format!("msg_{}", uuid::Uuid::new_v4().simple()))
                .clone();
            out.push(DownstreamEvent::message_start(
                &id,
                &self.state.model,
                &self.state.role,
            ));
        }

        if let Some(text) = delta.get("reasoning_content").and_then(Value::as_str) {
            let index = self.ensure_open_block(BlockKind::Thinking, out)?;
            if !text.is_empty() {
                self.state.add_delta(text)?;
                out.push(DownstreamEvent::thinking_delta(index, text));
            }
        }

        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            // Reasoning must close before any answer text opens;
            // ensure_open_block signs and stops an open thinking block.
            let index = self.ensure_open_block(BlockKind::Text, out)?;
            if !text.is_empty() {
                self.state.add_delta(text)?;
                out.push(DownstreamEvent::text_delta(index, text));
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            // Accumulate only: arguments are not guaranteed valid JSON
            // until the call completes, so nothing is emitted here.
            for call in calls {
                let call_index = call.get("index").and_then(Value::as_u64).unwrap_or(0);
                let function = call.get("function");
                self.state.append_tool_fragment(
                    call_index,
                    call.get("id").and_then(Value::as_str),
                    function.and_then(|f| f.get("name")).and_then(Value::as_str),
                    function
                        .and_then(|f| f.get("arguments"))
                        .and_then(Value::as_str),
                )?;
            }
        }

        Ok(())
    }

    /// Return the index of an open block of `kind`, transitioning away
    /// from whatever block is currently open if necessary.
    fn ensure_open_block(
        &mut self,
        kind: BlockKind,
        out: &mut Vec<DownstreamEvent>,
    ) -> Result<usize, BridgeError> {
        if let Some(block) = self.state.current_block() {
            if block.kind == kind {
                return Ok(block.index);
            }
            self.close_open_block(out);
        }
        let index = self.state.start_block(kind)?;
        out.push(DownstreamEvent::content_block_start(index, kind));
        Ok(index)
    }

    /// Stop the open block, signing it first if it is a thinking block.
    fn close_open_block(&mut self, out: &mut Vec<DownstreamEvent>) {
        if let Some(block) = self.state.current_block() {
            if block.kind == BlockKind::Thinking {
                out.push(DownstreamEvent::signature_delta(
                    block.index,
                    &sign_block(&block.content),
                ));
            }
        }
        if let Some(index) = self.state.stop_current_block() {
            out.push(DownstreamEvent::content_block_stop(index));
        }
    }
}
