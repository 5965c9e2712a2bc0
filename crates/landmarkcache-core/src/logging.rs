//! Subscriber setup for front-ends embedding the locator.
//!
//! The library only emits `tracing` events; nothing here runs unless a caller
//! asks for it.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Rotated daily under the log directory.
const LOG_FILE_PREFIX: &str = "landmarkcache.log";

fn env_filter(default_level: &str) -> EnvFilter {
    // RUST_LOG wins when set (e.g. RUST_LOG=landmarkcache_core=debug)
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Log to stderr, filtered by `RUST_LOG` or `default_level`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_level: &str) -> bool {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter(default_level))
        .try_init()
        .is_ok()
}

/// Log to a daily-rotated file in `log_dir`.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the background writer. `None` if a global subscriber was
/// already installed.
pub fn init_file_tracing(log_dir: &Path, default_level: &str) -> Option<WorkerGuard> {
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(env_filter(default_level))
        .try_init()
        .ok()
        .map(|()| guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing("warn");
        // A second install must not panic
        assert!(!init_tracing("debug"));
    }

    #[test]
    fn test_file_tracing_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        // The guard is None when another test already installed a subscriber;
        // the appender still opens its file either way.
        let _guard = init_file_tracing(dir.path(), "info");

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(
            names.iter().any(|n| n.starts_with(LOG_FILE_PREFIX)),
            "no log file in {:?}",
            names
        );
    }
}
