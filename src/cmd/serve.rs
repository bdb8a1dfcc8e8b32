//! HTTP API server command: `vetter serve`.

use anyhow::Result;
use std::path::PathBuf;

use vetter::config::VetterConfig;
use vetter::server::{ServerConfig, start_server};

pub async fn cmd_serve(
    project_dir: PathBuf,
    config: VetterConfig,
    port: Option<u16>,
    dev: bool,
) -> Result<()> {
    let mut server = ServerConfig::from_config(&config, project_dir);
    if let Some(port) = port {
        server.port = port;
    }
    server.dev_mode |= dev;
    start_server(server, config).await
}
