// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// Bridge configuration.
//
// All fields are optional in the YAML file; a missing file yields the
// defaults. Limits exist to bound a hostile or malfunctioning
// upstream, so they are configurable but never disableable.

mod loader;
mod raw;

pub use loader::{load_config, ConfigError, ConfigSource, FileSource};

use crate::accumulator::{StreamLimits, DEFAULT_MAX_BLOCKS, DEFAULT_MAX_BLOCK_BYTES};
use crate::sse::DEFAULT_MAX_FRAME_BUFFER_BYTES;

pub const DEFAULT_PORT: u16 = 9820;
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Top-level validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    pub upstream: UpstreamConfig,
    /// Whether reasoning is requested when no directive says otherwise.
    pub default_thinking: bool,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the OpenAI-style upstream (no trailing slash).
    pub base_url: String,
    /// Environment variable read for the bearer token.
    pub api_key_env: String,
}

/// Resource bounds applied to every stream.
#[derive(Debug, Clone, Copy)]
pub struct LimitsConfig {
    pub max_blocks: usize,
    pub max_block_bytes: usize,
    pub max_frame_buffer_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_blocks: DEFAULT_MAX_BLOCKS,
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
            max_frame_buffer_bytes: DEFAULT_MAX_FRAME_BUFFER_BYTES,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            upstream: UpstreamConfig {
                base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
                api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            },
            default_thinking: true,
            limits: LimitsConfig::default(),
        }
    }
}

impl Config {
    /// The per-stream limits handed to each accumulator.
    pub fn stream_limits(&self) -> StreamLimits {
        StreamLimits {
            max_blocks: self.limits.max_blocks,
            max_block_bytes: self.limits.max_block_bytes,
        }
    }
}
