//! Shared logging utilities for consistent tracing across the shell

use crate::types::ProcessId;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

/// File name prefix for the rolling log file
pub const LOG_FILE_NAME: &str = "desktop-shell.log";

/// Build the default filter directive for a base level
pub fn filter_directive(base_level: &str) -> String {
    format!("shell={base_level},shared={base_level},tower_http=warn,hyper=warn,reqwest=warn")
}

/// Initialize tracing with a stdout layer and, when `log_dir` is given, a
/// daily-rolling file layer.
///
/// `RUST_LOG` overrides the computed directive. The returned guard flushes the
/// file writer on drop and must be held for the lifetime of the process.
pub fn init_tracing(log_level: Option<&str>, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let base_level = log_level.unwrap_or("info");
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(base_level)));

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_target(true).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // A second initialization (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    guard
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Emit a tracing event tagged with the originating process and a timestamp
#[doc(hidden)]
#[macro_export]
macro_rules! process_event {
    ($level:expr, $process_id:expr, $($arg:tt)*) => {
        tracing::event!(
            $level,
            process = %$process_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! process_info {
    ($process_id:expr, $($arg:tt)*) => {
        $crate::process_event!(tracing::Level::INFO, $process_id, $($arg)*)
    };
}

#[macro_export]
macro_rules! process_warn {
    ($process_id:expr, $($arg:tt)*) => {
        $crate::process_event!(tracing::Level::WARN, $process_id, $($arg)*)
    };
}

#[macro_export]
macro_rules! process_error {
    ($process_id:expr, $($arg:tt)*) => {
        $crate::process_event!(tracing::Level::ERROR, $process_id, $($arg)*)
    };
}

#[macro_export]
macro_rules! process_debug {
    ($process_id:expr, $($arg:tt)*) => {
        $crate::process_event!(tracing::Level::DEBUG, $process_id, $($arg)*)
    };
}

pub fn log_startup(process_id: &ProcessId, details: &str) {
    crate::process_info!(process_id, "🚀 Starting {}", details);
}

pub fn log_shutdown(process_id: &ProcessId, reason: &str) {
    crate::process_info!(process_id, "🛑 Shutting down: {}", reason);
}

/// `context` names the operation that failed, e.g. "Port allocation"
pub fn log_error(process_id: &ProcessId, context: &str, error: &dyn std::fmt::Display) {
    crate::process_error!(process_id, error = %error, "❌ {} failed", context);
}

pub fn log_success(process_id: &ProcessId, message: &str) {
    crate::process_info!(process_id, "✅ {}", message);
}

pub fn log_progress(process_id: &ProcessId, action: &str, details: &str) {
    crate::process_info!(process_id, "📋 {}: {}", action, details);
}
