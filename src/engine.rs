// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// Reqwest-backed upstream client.
//
// Posts translated requests to `{base_url}/chat/completions` and hands
// the response body back as a stream so SSE responses flow through the
// bridge without buffering.

use crate::config::UpstreamConfig;
use crate::proxy::{ProxyError, ProxyRequest, ProxyResponse, UpstreamClient};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::StatusCode;
use reqwest::header::CONTENT_TYPE;

pub struct ReqwestUpstream {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ReqwestUpstream {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Build a client from config, reading the bearer token from the
    /// configured environment variable. A missing variable is not an
    /// error; local upstreams often need no key.
    pub fn from_config(config: &UpstreamConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "API key variable not set, forwarding without authorization"
            );
        }
        Self::new(reqwest::Client::new(), config.base_url.clone(), api_key)
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstream {
    async fn complete(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let mut req = self
            .client
            .post(self.completions_url())
            .header(CONTENT_TYPE, "application/json")
            .body(request.body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::UpstreamTimeout(e.to_string())
            } else {
                ProxyError::UpstreamFailure(e.to_string())
            }
        })?;

        // Re-derive the status through from_u16 so this compiles even if
        // reqwest and axum pin different http versions.
        let status = StatusCode::from_u16(resp.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        Ok(ProxyResponse {
            status,
            body: Body::from_stream(resp.bytes_stream()),
        })
    }
}
