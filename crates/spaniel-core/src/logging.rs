//! Tracing setup shared by spaniel binaries and test harnesses.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::Config;

/// File name of the log written under [`Config::log_dir`].
pub const LOG_FILE: &str = "spaniel.log";

/// Installs the global subscriber.
///
/// Output goes to stderr, filtered by `RUST_LOG` or `default_level`. When
/// `log_to_file` is set, the same events are also appended to
/// `log_dir/spaniel.log`; keep the returned guard alive until exit so the
/// file writer flushes. Does nothing if a subscriber is already installed.
pub fn init(config: &Config, default_level: &str) -> Option<WorkerGuard> {
    let filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    if !config.log_to_file {
        let _ = tracing_subscriber::registry().with(stderr).try_init();
        return None;
    }

    let file_appender = tracing_appender::rolling::never(config.log_dir(), LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let file = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter());
    let _ = tracing_subscriber::registry()
        .with(stderr)
        .with(file)
        .try_init();
    Some(guard)
}
