// Raw YAML deserialization types (internal)
//
// Separate from the public Config structs so every field can default
// independently: a missing file, an empty file, and a partial file all
// resolve to the same validated configuration.

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    pub listen: Option<RawListen>,
    pub upstream: Option<RawUpstream>,
    pub thinking: Option<RawThinking>,
    pub limits: Option<RawLimits>,
}

#[derive(Debug, Deserialize)]
pub struct RawListen {
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct RawUpstream {
    pub base_url: Option<String>,
    /// Name of the environment variable holding the upstream API key.
    pub api_key_env: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawThinking {
    pub default_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RawLimits {
    pub max_blocks: Option<usize>,
    pub max_block_bytes: Option<usize>,
    pub max_frame_buffer_bytes: Option<usize>,
}
