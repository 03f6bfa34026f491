//! Tracing subscriber setup.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogLevel;

/// Filter for `level`, overridden by `RUST_LOG` when set.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.as_level_filter().into()))
}

/// Install the global subscriber writing to stderr.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the background writer. A subscriber installed earlier
/// (tests, embedding host) is left in place.
pub fn init(level: LogLevel) -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false),
        )
        .try_init();
    guard
}
