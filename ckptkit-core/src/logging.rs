//! Owned logger handles built on `tracing`.
//!
//! A [`Logger`] carries its own `tracing::Dispatch` instead of mutating the
//! process-wide subscriber, so a library component can be handed a logger
//! configured for it (level, format, destination) and emit through it with
//! [`Logger::in_scope`]. Binaries that do want a global subscriber can call
//! [`init_global`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::Dispatch;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{CoreError, CoreResult};

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable single-line format with timestamps and fields.
    #[default]
    Full,
    /// Shorter human-readable format.
    Compact,
    /// Newline-delimited JSON objects.
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogDestination {
    #[default]
    Stderr,
    Stdout,
    /// A single, non-rotating file `directory/file_name`.
    File {
        directory: PathBuf,
        file_name: String,
    },
}

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive string, e.g. `"info"` or `"ckptkit_ml=debug,warn"`.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub destination: LogDestination,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            destination: LogDestination::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl LogConfig {
    /// Configuration writing `level` and above to `directory/file_name`.
    pub fn to_file(level: &str, directory: impl Into<PathBuf>, file_name: &str) -> Self {
        Self {
            level: level.to_string(),
            format: LogFormat::Full,
            destination: LogDestination::File {
                directory: directory.into(),
                file_name: file_name.to_string(),
            },
        }
    }
}

/// A configured `tracing` dispatcher plus the worker that drains it.
///
/// Dropping the logger flushes any buffered lines.
pub struct Logger {
    dispatch: Dispatch,
    _guard: WorkerGuard,
}

impl Logger {
    pub fn new(config: &LogConfig) -> CoreResult<Self> {
        let (dispatch, guard) = build_dispatch(config)?;
        Ok(Self {
            dispatch,
            _guard: guard,
        })
    }

    /// Run `f` with this logger as the current thread's default subscriber.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// Install a process-wide subscriber built from `config`.
///
/// Keep the returned guard alive for as long as logging is needed.
pub fn init_global(config: &LogConfig) -> CoreResult<WorkerGuard> {
    let (dispatch, guard) = build_dispatch(config)?;
    tracing::dispatcher::set_global_default(dispatch)
        .map_err(|e| CoreError::logging(e.to_string()))?;
    Ok(guard)
}

type FilteredRegistry = Layered<EnvFilter, Registry>;

fn build_dispatch(config: &LogConfig) -> CoreResult<(Dispatch, WorkerGuard)> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| CoreError::logging(format!("invalid log level '{}': {e}", config.level)))?;

    let (writer, guard, ansi) = make_writer(&config.destination)?;

    let layer: Box<dyn Layer<FilteredRegistry> + Send + Sync> = match config.format {
        LogFormat::Full => tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(layer);
    Ok((Dispatch::new(subscriber), guard))
}

fn make_writer(destination: &LogDestination) -> CoreResult<(NonBlocking, WorkerGuard, bool)> {
    Ok(match destination {
        LogDestination::Stderr => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            (writer, guard, true)
        }
        LogDestination::Stdout => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            (writer, guard, true)
        }
        LogDestination::File {
            directory,
            file_name,
        } => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (writer, guard, false)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Full);
        assert_eq!(config.destination, LogDestination::Stderr);
    }

    #[test]
    fn test_format_config_names() {
        for (format, name) in [
            (LogFormat::Full, "\"full\""),
            (LogFormat::Compact, "\"compact\""),
            (LogFormat::Json, "\"json\""),
        ] {
            assert_eq!(serde_json::to_string(&format).unwrap(), name);
            assert_eq!(serde_json::from_str::<LogFormat>(name).unwrap(), format);
        }
    }

    #[test]
    fn test_file_logger_writes_in_scope_events() {
        let dir = TempDir::new().unwrap();
        let config = LogConfig::to_file("info", dir.path(), "run.log");

        let logger = Logger::new(&config).unwrap();
        logger.in_scope(|| {
            tracing::info!(epoch = 3, "saved checkpoint");
            tracing::debug!("filtered out");
        });
        drop(logger);

        let contents = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert!(contents.contains("saved checkpoint"));
        assert!(contents.contains("epoch=3"));
        assert!(!contents.contains("filtered out"));
    }

    #[test]
    fn test_json_format_emits_objects() {
        let dir = TempDir::new().unwrap();
        let mut config = LogConfig::to_file("debug", dir.path(), "run.jsonl");
        config.format = LogFormat::Json;

        let logger = Logger::new(&config).unwrap();
        logger.in_scope(|| tracing::warn!(path = "a.ckpt", "no checkpoint"));
        drop(logger);

        let contents = std::fs::read_to_string(dir.path().join("run.jsonl")).unwrap();
        let line = contents.lines().next().unwrap();
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["level"], "WARN");
        assert_eq!(value["fields"]["message"], "no checkpoint");
    }

    #[test]
    fn test_events_outside_scope_are_not_captured() {
        let dir = TempDir::new().unwrap();
        let logger = Logger::new(&LogConfig::to_file("trace", dir.path(), "run.log")).unwrap();

        tracing::info!("outside");
        logger.in_scope(|| tracing::info!("inside"));
        drop(logger);

        let contents = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert!(contents.contains("inside"));
        assert!(!contents.contains("outside"));
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let config = LogConfig {
            level: "ckptkit=loud".to_string(),
            ..LogConfig::default()
        };
        let err = Logger::new(&config).unwrap_err();
        assert!(matches!(err, CoreError::Logging(_)));
    }

    #[test]
    fn test_destination_serde_tagged() {
        let dest: LogDestination =
            serde_json::from_str(r#"{"kind":"file","directory":"logs","file_name":"a.log"}"#)
                .unwrap();
        assert_eq!(
            dest,
            LogDestination::File {
                directory: PathBuf::from("logs"),
                file_name: "a.log".to_string(),
            }
        );
    }
}
