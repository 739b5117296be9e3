//! # Structured Logging Module
//!
//! Environment-aware structured logging for batch submission and partition scans.
//! Console output by default, JSON lines when `PARTITION_BATCH_LOG_FORMAT=json`.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ConfigManager;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let layer = if use_json_format() {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A global subscriber may already be installed by the host application
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

fn use_json_format() -> bool {
    std::env::var("PARTITION_BATCH_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for a completed batch or aggregate batch operation
pub fn log_batch_operation(
    operation: &str,
    partition_key: Option<&str>,
    operation_count: usize,
    status: &str,
    duration_ms: Option<u64>,
) {
    tracing::info!(
        operation = %operation,
        partition_key = partition_key,
        operation_count = operation_count,
        status = %status,
        duration_ms = duration_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "📦 BATCH_OPERATION"
    );
}

/// Log structured data for a completed partition or table scan
pub fn log_scan_operation(
    table: &str,
    partition_count: usize,
    row_count: usize,
    complete: bool,
    duration_ms: Option<u64>,
) {
    tracing::info!(
        table = %table,
        partition_count = partition_count,
        row_count = row_count,
        complete = complete,
        duration_ms = duration_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "🔎 SCAN_OPERATION"
    );
}
