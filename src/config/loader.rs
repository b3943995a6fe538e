// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// Config loading: source abstraction + raw-to-typed resolution.

use super::raw::RawConfig;
use super::{Config, LimitsConfig, UpstreamConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Where the raw YAML comes from. Injected so tests never touch disk.
pub trait ConfigSource {
    /// Returns the YAML text, or None if the source does not exist
    /// (which resolves to all defaults).
    fn load(&self) -> Result<Option<String>, ConfigError>;
}

pub struct FileSource {
    pub path: std::path::PathBuf,
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<Option<String>, ConfigError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Load and resolve configuration from a source.
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw: RawConfig = match source.load()? {
        Some(text) => serde_yaml::from_str(&text)?,
        None => {
            tracing::info!("no config file found, using defaults");
            RawConfig::default()
        }
    };
    Ok(resolve(raw))
}

fn resolve(raw: RawConfig) -> Config {
    let defaults = Config::default();

    let limit_defaults = LimitsConfig::default();
    let limits = raw
        .limits
        .map(|l| LimitsConfig {
            max_blocks: l.max_blocks.unwrap_or(limit_defaults.max_blocks),
            max_block_bytes: l.max_block_bytes.unwrap_or(limit_defaults.max_block_bytes),
            max_frame_buffer_bytes: l
                .max_frame_buffer_bytes
                .unwrap_or(limit_defaults.max_frame_buffer_bytes),
        })
        .unwrap_or(limit_defaults);

    Config {
        listen_port: raw
            .listen
            .and_then(|l| l.port)
            .unwrap_or(defaults.listen_port),
        upstream: UpstreamConfig {
            base_url: raw
                .upstream
                .as_ref()
                .and_then(|u| u.base_url.clone())
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.upstream.base_url),
            api_key_env: raw
                .upstream
                .and_then(|u| u.api_key_env)
                .unwrap_or(defaults.upstream.api_key_env),
        },
        default_thinking: raw
            .thinking
            .and_then(|t| t.default_enabled)
            .unwrap_or(defaults.default_thinking),
        limits,
    }
}
