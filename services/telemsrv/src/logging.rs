//! Tracing initialization
//!
//! Console output always; daily-rolling file output when a log directory
//! is configured. The returned guard must live as long as the process so
//! the non-blocking file writer flushes on exit.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the global subscriber
///
/// `RUST_LOG` wins over the configured level; a CLI override wins over
/// both.
pub fn init(config: &LoggingConfig, override_level: Option<&str>) -> Option<WorkerGuard> {
    let level = override_level.unwrap_or(&config.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer());

    match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "telemsrv.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}
