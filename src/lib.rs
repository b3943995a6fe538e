// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

pub mod accumulator;
pub mod bridge;
pub mod buffered;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod observe;
pub mod proxy;
pub mod sse;
