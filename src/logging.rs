//! Tracing subscriber setup for the service binary

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crates whose chatter is capped below the configured level
const QUIET_TARGETS: &[(&str, &str)] = &[("sqlx", "warn"), ("hyper", "warn"), ("rustls", "warn")];

/// Filter directives: base level, the ledger crate at that level, quiet
/// dependencies, then per-module overrides from the config
fn filter_directives(config: &AppConfig) -> String {
    let mut directives = vec![
        config.log_level.clone(),
        format!("exec_ledger={}", config.log_level),
    ];
    directives.extend(
        QUIET_TARGETS
            .iter()
            .map(|(target, level)| format!("{}={}", target, level)),
    );
    directives.extend(
        config
            .log_directives
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
    );
    directives.join(",")
}

/// Install the global subscriber; keep the guard alive for the process lifetime
///
/// `RUST_LOG`, when set, replaces the configured filter.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = filter_directives(config);
        EnvFilter::try_new(&directives).unwrap_or_else(|e| {
            eprintln!("Invalid log directives '{}': {}, using info", directives, e);
            EnvFilter::new("info")
        })
    });

    let registry = tracing_subscriber::registry().with(filter);

    // JSON goes to the file only; text also echoes to stdout
    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_current_span(false)
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}
