//! Tracing subscriber setup for the binary.

use std::path::Path;

use anyhow::{Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the background log writer alive. Drop it last.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "vetter=debug,info" } else { "vetter=info,warn" }
}

/// Install the global subscriber: stderr always, plus a daily rolling file
/// under `config.dir` when set. `RUST_LOG` overrides the level.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let mut layers: Vec<BoxedLayer> = vec![stderr_layer(config.json)];
    let mut guard = None;
    if let Some(dir) = &config.dir {
        let (layer, file_guard) = file_layer(dir, config.json)?;
        layers.push(layer);
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(LogGuard { _file: guard })
}

fn stderr_layer(json: bool) -> BoxedLayer {
    if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    }
}

fn file_layer(dir: &Path, json: bool) -> Result<(BoxedLayer, WorkerGuard)> {
    std::fs::create_dir_all(dir)
        .map_err(|e| anyhow!("Failed to create log directory {}: {}", dir.display(), e))?;
    let appender = tracing_appender::rolling::daily(dir, "vetter.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .boxed()
    };
    Ok((layer, guard))
}
