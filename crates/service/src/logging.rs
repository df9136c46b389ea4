use std::path::Path;

use anyhow::{Result, anyhow};
use core_types::config::{LogFormat, LoggingSection};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber described by `[logging]`.
///
/// `RUST_LOG` overrides `level`. When `file` is set, output goes to a daily
/// rolling file through a non-blocking writer; keep the returned guard alive
/// for the lifetime of the process or buffered lines are lost.
pub fn init_tracing_with_config(cfg: &LoggingSection) -> Result<WorkerGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level)
            .map_err(|e| anyhow!("invalid logging.level {:?}: {e}", cfg.level))?,
    };

    let (writer, guard) = if cfg.file.is_empty() {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        let path = Path::new(&cfg.file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| anyhow!("logging.file has no file name: {}", cfg.file))?;
        std::fs::create_dir_all(dir)?;
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name))
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true)
        .with_ansi(cfg.file.is_empty());

    let installed = match cfg.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| anyhow!("init tracing: {e}"))?;

    Ok(guard)
}
