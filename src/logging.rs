//! Tracing subscriber setup for the CLI.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::LogFormat;

/// Keeps the file writer flushing; drop it last.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Diagnostics go to stderr so command output on stdout stays clean. When
/// `file` is set, a daily-rotated copy is written there without colours.
pub fn init(filter: &str, format: LogFormat, file: Option<&Path>) -> Result<LogGuard> {
    let env_filter = EnvFilter::try_new(filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to build log filter")?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    });

    let mut file_guard = None;
    if let Some(path) = file {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

        let appender = tracing_appender::rolling::daily(dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers.with_filter(env_filter))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _file: file_guard })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_with_file_then_second_init_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/trellis.log");

        let guard = init("not a [valid filter", LogFormat::Json, Some(&path)).unwrap();
        assert!(dir.path().join("logs").is_dir());
        tracing::info!("hello");

        // The global subscriber can only be installed once per process.
        assert!(init("info", LogFormat::Text, None).is_err());
        drop(guard);
    }
}
