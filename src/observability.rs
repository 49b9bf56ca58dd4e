//! Logging setup
//!
//! Installs a global `tracing` subscriber: EnvFilter (RUST_LOG wins over the
//! configured level) plus one fmt layer writing to stdout or a log file.

use crate::config::{LogConfig, ObservabilityConfig};
use crate::error::{Error, Result};
use std::fs;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

const LOG_FILE_NAME: &str = "veritoken.log";

/// Keeps the non-blocking log writer alive; drop it last.
#[derive(Default)]
pub struct ObservabilityGuard {
    log_guard: Option<WorkerGuard>,
}

impl ObservabilityGuard {
    /// Whether logs go through a background file writer.
    pub fn is_file_backed(&self) -> bool {
        self.log_guard.is_some()
    }
}

/// Initialize logging based on configuration.
///
/// Installing twice is not an error; the first subscriber stays in place.
pub fn init_observability(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    let mut guard = ObservabilityGuard::default();

    match config.log.output.as_str() {
        "file" => {
            fs::create_dir_all(&config.log.path)?;
            let (non_blocking, worker_guard) = build_file_writer(&config.log)?;
            guard.log_guard = Some(worker_guard);
            init_subscriber_with_writer(non_blocking, false, config);
        }
        "console" => init_subscriber_with_writer(std::io::stdout, true, config),
        other => {
            return Err(Error::Observability(format!(
                "unsupported log output '{other}'"
            )));
        }
    }

    Ok(guard)
}

/// Create an EnvFilter from config, with RUST_LOG taking precedence
fn create_env_filter(config: &ObservabilityConfig) -> EnvFilter {
    let directive = std::env::var("RUST_LOG")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| config.filter_level.clone());

    EnvFilter::try_new(&directive).unwrap_or_else(|_| {
        eprintln!("Failed to parse filter directive: {directive}. Falling back to default: info");
        EnvFilter::new("info")
    })
}

fn init_subscriber_with_writer<W>(writer: W, use_ansi: bool, config: &ObservabilityConfig)
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(create_env_filter(config));

    if config.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_writer(writer);
        registry.with(fmt_layer).try_init().ok();
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(use_ansi)
            .with_writer(writer);
        registry.with(fmt_layer).try_init().ok();
    }
}

fn build_file_writer(log_config: &LogConfig) -> Result<(NonBlocking, WorkerGuard)> {
    if log_config.rotate {
        let file_appender = tracing_appender::rolling::daily(&log_config.path, LOG_FILE_NAME);
        Ok(tracing_appender::non_blocking(file_appender))
    } else {
        let log_file_path = std::path::Path::new(&log_config.path).join(LOG_FILE_NAME);
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path)?;
        Ok(tracing_appender::non_blocking(file))
    }
}
