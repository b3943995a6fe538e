// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// Upstream-to-downstream stream conversion.
//
// Responsibilities:
// - Drive the content-block state machine across chunk boundaries
// - Emit downstream events in lifecycle order per block
// - Sign thinking blocks before they close
// - Accumulate tool-call fragments, parsing only at stream end
// - Finalize idempotently, including after an aborted upstream

mod streaming;

pub mod signature;

pub use streaming::StreamBridge;
