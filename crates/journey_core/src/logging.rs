//! Engine logging bootstrap.
//!
//! # Responsibility
//! - Turn the `log_level`/`log_dir` part of [`EngineConfig`] into one
//!   rolling file logger per process.
//! - Keep timeline events metadata-only: ids, counts and durations, never
//!   journey titles, notes or locations.
//!
//! # Invariants
//! - Logging stays off when the config names no `log_dir`.
//! - A second init with equal settings is a no-op; different settings are
//!   rejected, never applied.
//! - Initialization never panics.

use crate::config::{ConfigError, EngineConfig};
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const LOG_FILE_BASENAME: &str = "journey";
const ROTATE_AT_BYTES: u64 = 8 * 1024 * 1024;
const KEEP_LOG_FILES: usize = 4;
const PANIC_SUMMARY_CHARS: usize = 120;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Effective file-logging settings derived from an engine config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: &'static str,
    pub dir: PathBuf,
}

impl LogSettings {
    /// Returns `None` when the config leaves logging off.
    pub fn from_config(config: &EngineConfig) -> Result<Option<Self>, LoggingError> {
        config.validate().map_err(LoggingError::Config)?;
        let Some(dir) = &config.log_dir else {
            return Ok(None);
        };
        let level = match &config.log_level {
            Some(level) => canonical_level(level).ok_or_else(|| {
                LoggingError::Config(ConfigError::UnsupportedLogLevel(level.clone()))
            })?,
            None => default_log_level(),
        };
        Ok(Some(Self {
            level,
            dir: dir.clone(),
        }))
    }
}

#[derive(Debug)]
pub enum LoggingError {
    Config(ConfigError),
    /// Logging already runs with other settings in this process.
    Conflict {
        active: LogSettings,
        requested: LogSettings,
    },
    CreateDir {
        dir: PathBuf,
        source: std::io::Error,
    },
    Backend(flexi_logger::FlexiLoggerError),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Conflict { active, requested } => write!(
                f,
                "logging already runs at `{}` level `{}`; refusing `{}` level `{}`",
                active.dir.display(),
                active.level,
                requested.dir.display(),
                requested.level
            ),
            Self::CreateDir { dir, source } => {
                write!(f, "failed to create log directory `{}`: {source}", dir.display())
            }
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::CreateDir { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            Self::Conflict { .. } => None,
        }
    }
}

/// Starts file logging as described by `config`.
///
/// Returns the active settings, or `None` when `log_dir` is unset.
pub fn init_logging(config: &EngineConfig) -> Result<Option<LogSettings>, LoggingError> {
    let Some(requested) = LogSettings::from_config(config)? else {
        return Ok(None);
    };

    let active = ACTIVE.get_or_try_init(|| start_logger(config, &requested))?;
    if active.settings != requested {
        return Err(LoggingError::Conflict {
            active: active.settings.clone(),
            requested,
        });
    }
    Ok(Some(requested))
}

/// Settings of the running logger, if any.
pub fn logging_status() -> Option<LogSettings> {
    ACTIVE.get().map(|active| active.settings.clone())
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(
    config: &EngineConfig,
    settings: &LogSettings,
) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&settings.dir).map_err(|source| LoggingError::CreateDir {
        dir: settings.dir.clone(),
        source,
    })?;

    let handle = Logger::try_with_str(settings.level)
        .map_err(LoggingError::Backend)?
        .log_to_file(
            FileSpec::default()
                .directory(settings.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(LoggingError::Backend)?;

    install_panic_hook();

    let timezone = config
        .calendar()
        .map(|calendar| calendar.timezone().name().to_string())
        .unwrap_or_else(|_| config.timezone.clone());
    info!(
        "event=engine_start module=core status=ok version={} level={} timezone={} store={}",
        env!("CARGO_PKG_VERSION"),
        settings.level,
        timezone,
        if config.database_path.is_some() { "file" } else { "memory" }
    );

    Ok(ActiveLogger {
        settings: settings.clone(),
        _handle: handle,
    })
}

fn canonical_level(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info.location().map_or_else(
            || "unknown".to_string(),
            |loc| format!("{}:{}", loc.file(), loc.line()),
        );
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location,
            one_line(&payload, PANIC_SUMMARY_CHARS)
        );
        previous(info);
    }));
}

/// Single-line prefix of `text`, marked with `...` when cut.
fn one_line(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c });
    let mut line: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        line.push_str("...");
    }
    line
}
