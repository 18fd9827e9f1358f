//! Logging initialization.
//!
//! Console output always; optional daily-rolling file output when
//! `VFD_LOG_FILE` points somewhere. The returned guard must be kept alive
//! for file logging to flush.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{GatewayError, Result};

/// Initialize the global subscriber from `VFD_LOG` / `VFD_LOG_FILE`
pub fn init_from_env() -> Result<Option<WorkerGuard>> {
    let level = std::env::var("VFD_LOG").unwrap_or_else(|_| "info".to_string());
    let file = std::env::var("VFD_LOG_FILE").ok();
    init(&level, file.as_deref())
}

/// Initialize the global subscriber
pub fn init(level: &str, file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = |level: &str| {
        EnvFilter::try_new(level)
            .or_else(|_| EnvFilter::try_new("info"))
            .map_err(|e| GatewayError::Config(format!("invalid log level: {e}")))
    };

    let mut layers = Vec::new();
    let mut guard = None;

    let console_layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_filter(filter(level)?)
        .boxed();
    layers.push(console_layer);

    if let Some(file_path) = file {
        let path = Path::new(file_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let appender = tracing_appender::rolling::daily(
            path.parent().unwrap_or_else(|| Path::new(".")),
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("vfdsrv.log"),
        );
        let (non_blocking, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_filter(filter(level)?)
            .boxed();
        layers.push(file_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| GatewayError::Config(format!("failed to initialize logging: {e}")))?;

    Ok(guard)
}
