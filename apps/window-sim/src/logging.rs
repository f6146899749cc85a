//! Subscriber setup for the replayer. Reports own stdout, so logs only ever
//! go to stderr or a file.

use clap::ValueEnum;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::Subscriber;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;

const ENV_LOG_FILTER: &str = "MSGWIN_LOG_FILTER";

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Line shape of each log event.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum LogFormat {
    /// One short line per event; the default on a terminal.
    #[default]
    Compact,
    /// Includes span context and event targets.
    Full,
    /// Newline-delimited JSON, matching the step reports.
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber once; later calls are no-ops.
pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if GUARD.get().is_some() {
        return Ok(());
    }
    let (writer, guard) = writer_for(config)?;
    let filter = env_filter(config.level);
    let ansi = config.file.is_none() && config.format != LogFormat::Json;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    match config.format {
        LogFormat::Compact => install(builder.compact().with_target(false).finish())?,
        LogFormat::Full => install(builder.with_target(true).finish())?,
        LogFormat::Json => install(builder.json().with_current_span(false).finish())?,
    }
    let _ = GUARD.set(guard);
    Ok(())
}

fn install<S>(subscriber: S) -> Result<(), InitError>
where
    S: Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn writer_for(config: &LogConfig) -> Result<(NonBlocking, WorkerGuard), InitError> {
    match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitError::Io {
                    path: path.clone(),
                    source,
                })?;
            Ok(tracing_appender::non_blocking(file))
        }
        None => Ok(tracing_appender::non_blocking(std::io::stderr())),
    }
}

fn env_filter(level: LogLevel) -> EnvFilter {
    match std::env::var(ENV_LOG_FILTER) {
        Ok(filter) => EnvFilter::new(filter),
        Err(_) => EnvFilter::new(default_filter_for(level.to_filter())),
    }
}

/// Window events log under `window::*` targets; everything else stays at warn
/// unless asked for explicitly.
fn default_filter_for(level: LevelFilter) -> String {
    match level {
        LevelFilter::TRACE => "warn,window=trace,window_sim=trace".to_owned(),
        LevelFilter::DEBUG => "warn,window=debug,window_sim=debug".to_owned(),
        LevelFilter::INFO => "warn,window=info,window_sim=info".to_owned(),
        other => other.to_string().to_lowercase(),
    }
}
