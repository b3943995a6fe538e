// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

use causeway::config;
use causeway::engine::ReqwestUpstream;
use causeway::proxy::{self, AppState};
use clap::Parser;

use std::net::SocketAddr;

#[derive(Parser)]
#[command(name = "causeway", about = "OpenAI-to-Anthropic streaming bridge")]
struct Cli {
    /// Path to the causeway.yaml config file
    #[arg(long, default_value = "causeway.yaml", env = "CAUSEWAY_CONFIG")]
    config: String,

    /// Port to listen on (overrides the config file)
    #[arg(long, env = "CAUSEWAY_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = config::FileSource {
        path: std::path::PathBuf::from(cli.config),
    };
    let config = match config::load_config(&source) {
        Ok(c) => std::sync::Arc::new(c),
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let port = cli.port.unwrap_or(config.listen_port);
    let addr = SocketAddr::from((proxy::BIND_HOST, port));
    tracing::info!(
        %addr,
        upstream = %config.upstream.base_url,
        default_thinking = config.default_thinking,
        "causeway starting"
    );

    let upstream: std::sync::Arc<dyn proxy::UpstreamClient> =
        std::sync::Arc::new(ReqwestUpstream::from_config(&config.upstream));

    let app = proxy::build_router(AppState::new(upstream, config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "causeway listening");

    axum::serve(listener, app)
        .await
        .expect("server error");
}
