//! Logging setup for binaries embedding the engine.
//!
//! The library itself only emits `tracing` events; this helper wires a
//! compact file + stdout subscriber for the CLI. Keep the returned guard
//! alive for the duration of the process.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping it flushes and closes the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Creates the log directory and truncates any previous log file.
///
/// Returns the full path of the (now empty) log file. Split out of
/// [`init_logging`] so the filesystem part stays testable without
/// installing a global subscriber.
pub fn prepare_log_file(log_dir: &str, log_file: &str) -> Result<PathBuf, io::Error> {
    fs::create_dir_all(log_dir)?;
    let log_path = Path::new(log_dir).join(log_file);
    fs::write(&log_path, "")?;
    Ok(log_path)
}

/// Initializes logging to `log_dir/log_file` and stdout.
///
/// Each session starts with a fresh log file. Events are written in the
/// single-line compact format; the filter honors `RUST_LOG` and defaults to
/// `info`.
pub fn init_logging(log_dir: &str, log_file: &str) -> Result<LoggingGuard, io::Error> {
    prepare_log_file(log_dir, log_file)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_file)
        .with_ansi(false);
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(io::stdout);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Default log directory.
pub fn default_log_dir() -> &'static str {
    "logs"
}

/// Default log file name.
pub fn default_log_file() -> &'static str {
    "demcontour.log"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Scratch directory under the system temp dir, removed on drop.
    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("demcontour-logging-{}", name));
            let _ = fs::remove_dir_all(&dir);
            Self(dir)
        }

        fn path(&self) -> &str {
            self.0.to_str().unwrap()
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_default_paths() {
        assert_eq!(default_log_dir(), "logs");
        assert_eq!(default_log_file(), "demcontour.log");
    }

    #[test]
    fn test_prepare_creates_directory_and_file() {
        let scratch = ScratchDir::new("create");
        let path = prepare_log_file(scratch.path(), "engine.log").unwrap();

        assert!(scratch.0.is_dir());
        assert!(path.is_file());
        assert_eq!(path, scratch.0.join("engine.log"));
    }

    #[test]
    fn test_prepare_clears_existing_file() {
        let scratch = ScratchDir::new("clear");
        fs::create_dir_all(&scratch.0).unwrap();
        let path = scratch.0.join("engine.log");
        fs::write(&path, "stale session output").unwrap();

        prepare_log_file(scratch.path(), "engine.log").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_prepare_nested_directory() {
        let scratch = ScratchDir::new("nested");
        let nested = scratch.0.join("a").join("b");
        let path = prepare_log_file(nested.to_str().unwrap(), "engine.log").unwrap();

        assert!(nested.is_dir());
        assert!(path.is_file());
    }

    #[test]
    fn test_prepare_fails_when_directory_is_a_file() {
        let scratch = ScratchDir::new("blocked");
        fs::create_dir_all(&scratch.0).unwrap();
        let blocker = scratch.0.join("not-a-dir");
        fs::write(&blocker, "occupied").unwrap();

        let result = prepare_log_file(blocker.to_str().unwrap(), "engine.log");
        assert!(result.is_err());
    }
}
