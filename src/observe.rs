// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// Observability seam.
//
// Snapshot sinks are injected into the bridge rather than baked in, so
// debug capture (raw events, stream summaries) lives outside the
// transformer. The default sink does nothing.

use crate::accumulator::{StreamSummary, ToolCall};
use crate::events::DownstreamEvent;
use crate::sse::UpstreamEvent;

/// Receives bridge activity for diagnostics.
///
/// Implementations must be Send + Sync; the bridge holds an
/// `Arc<dyn BridgeObserver>` and calls it from the one task driving the
/// connection. All methods default to no-ops.
pub trait BridgeObserver: Send + Sync {
    fn on_upstream_event(&self, _event: &UpstreamEvent) {}

    fn on_downstream_event(&self, _event: &DownstreamEvent) {}

    /// Called exactly once, when the stream finalizes. Carries the final
    /// state snapshot and any tool calls recovered from the stream.
    fn on_stream_closed(&self, _summary: &StreamSummary, _tool_calls: &[ToolCall]) {}
}

/// The default sink: observes nothing.
pub struct NoopObserver;

impl BridgeObserver for NoopObserver {}
