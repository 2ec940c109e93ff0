//! Structured logging for smbshare.
//!
//! Tracing-based logging to stderr and, optionally, a log file. The file
//! always receives debug output so a daemon run can be diagnosed after the
//! fact without restarting it verbosely.

use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Log verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only
    Quiet,
    /// Normal logging (info level)
    #[default]
    Normal,
    /// Verbose logging (debug level)
    Verbose,
    /// Very verbose logging (trace level)
    Trace,
}

impl Verbosity {
    /// Map a `-v` count (and `--quiet`) to a verbosity.
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Verbosity::Quiet;
        }
        match verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Trace,
        }
    }

    /// Get the tracing level filter for this verbosity.
    pub fn as_level_filter(&self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::ERROR,
            Verbosity::Normal => LevelFilter::INFO,
            Verbosity::Verbose => LevelFilter::DEBUG,
            Verbosity::Trace => LevelFilter::TRACE,
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Verbosity level for stderr output.
    pub verbosity: Verbosity,
    /// Optional path to log file.
    pub log_file: Option<String>,
    /// Emit stderr output as JSON lines (for journald and log shippers).
    pub json: bool,
}

/// Guard that must be kept alive for the duration of logging.
///
/// When this guard is dropped, the logging system will flush pending logs.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the logging system.
///
/// Returns a guard that must be kept alive for the duration of logging.
///
/// # Example
///
/// ```ignore
/// use smbshare::logging::{init_logging, LogConfig, Verbosity};
///
/// let config = LogConfig {
///     verbosity: Verbosity::Verbose,
///     log_file: Some("/var/log/smbshare.log".to_string()),
///     json: false,
/// };
/// let _guard = init_logging(&config);
/// tracing::info!("Logging initialized");
/// ```
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let (subscriber, file_guard) = build_subscriber(config);
    subscriber.init();

    LogGuard {
        _file_guard: file_guard,
    }
}

/// Assemble the layers without installing them.
///
/// `RUST_LOG` only narrows or widens stderr; the file layer filters on its
/// own at DEBUG.
fn build_subscriber(
    config: &LogConfig,
) -> (impl Subscriber + Send + Sync + 'static, Option<WorkerGuard>) {
    let env_filter = || {
        EnvFilter::builder()
            .with_default_directive(config.verbosity.as_level_filter().into())
            .from_env_lossy()
    };

    let (file_layer, file_guard) = if let Some(ref log_file_path) = config.log_file {
        let path = Path::new(log_file_path);
        let parent_dir = path.parent().unwrap_or(Path::new("."));
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("smbshare.log");

        let file_appender = tracing_appender::rolling::never(parent_dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking)
            .with_filter(LevelFilter::DEBUG);

        (Some(file_layer), Some(guard))
    } else {
        (None, None)
    };

    let stderr_layer = if config.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
            .boxed()
    };

    let subscriber = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer);

    (subscriber, file_guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_default() {
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn test_verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(0, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(1, false), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(5, false), Verbosity::Trace);
        assert_eq!(Verbosity::from_flags(3, true), Verbosity::Quiet);
    }

    #[test]
    fn test_verbosity_as_level_filter() {
        assert_eq!(Verbosity::Quiet.as_level_filter(), LevelFilter::ERROR);
        assert_eq!(Verbosity::Normal.as_level_filter(), LevelFilter::INFO);
        assert_eq!(Verbosity::Verbose.as_level_filter(), LevelFilter::DEBUG);
        assert_eq!(Verbosity::Trace.as_level_filter(), LevelFilter::TRACE);
    }

    #[test]
    fn test_file_receives_debug_at_normal_verbosity() {
        let temp = tempfile::tempdir().unwrap();
        let log_path = temp.path().join("smbshare.log");
        let config = LogConfig {
            verbosity: Verbosity::Normal,
            log_file: Some(log_path.to_string_lossy().into_owned()),
            json: false,
        };

        let (subscriber, guard) = build_subscriber(&config);
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("debug line for the log file");
            tracing::info!("info line for the log file");
            tracing::trace!("trace line for the log file");
        });
        // Flushes the background writer
        drop(guard);

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("debug line for the log file"));
        assert!(contents.contains("info line for the log file"));
        assert!(!contents.contains("trace line for the log file"));
    }

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.verbosity, Verbosity::Normal);
        assert!(config.log_file.is_none());
        assert!(!config.json);
    }
}
