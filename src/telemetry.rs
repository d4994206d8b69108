//! Structured logging bootstrap.
//!
//! Hosts call [`init_logging`] once at startup. Console output is always
//! on; passing a log directory adds a daily-rolling file appender.

use std::path::Path;

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging (console, plus rolling file when a log
/// directory is given).
///
/// The filter honours `RUST_LOG`; the default is `info` globally with
/// debug output for this crate. Must be called at most once per process.
pub fn init_logging(log_dir: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,backoffice_payments=debug"));

    let console_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).ok();
            let file_appender = tracing_appender::rolling::daily(dir, "payments");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true);
            registry.with(file_layer).init();

            // Keep the guard alive for the lifetime of the process.
            // Dropping it would stop log flushing, so leak it.
            std::mem::forget(guard);
        }
        None => registry.init(),
    }

    info!("logging initialised");
}
