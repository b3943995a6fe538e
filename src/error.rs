// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// Bridge error taxonomy.
//
// Resource-limit errors are fatal for the one stream that breached the
// bound and are raised to the caller so the bound is observable. Framing
// errors are recovered locally by the parser and never surface here.

/// Errors raised by the frame parser, accumulator, and streaming bridge.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// The raw SSE carry-over buffer grew past its cap. The upstream is
    /// sending an unbounded line; the connection must be aborted.
    #[error("frame buffer overflow: {size} buffered bytes exceeds {limit} byte limit")]
    FrameBufferOverflow { size: usize, limit: usize },

    /// A stream tried to open more content blocks than allowed.
    #[error("content block limit reached: stream already has {limit} blocks")]
    BlockLimitExceeded { limit: usize },

    /// Appending a delta would grow a block's content past its cap.
    /// The block's content is left at its pre-overflow value.
    #[error("block buffer overflow: block {index} would exceed {limit} byte limit")]
    BlockBufferOverflow { index: usize, limit: usize },
}

impl BridgeError {
    /// Whether this error must abort the stream it occurred on.
    ///
    /// All current variants are resource-limit breaches, so the answer is
    /// always yes; the method exists so call sites read as policy.
    pub fn is_fatal_for_stream(&self) -> bool {
        true
    }
}
