//! Engine configuration.
//!
//! # Responsibility
//! - Load the JSON engine config (timezone, logging, database path).
//! - Reject unknown keys and invalid values before anything is opened.
//!
//! # Invariants
//! - A validated config always yields a usable [`CivilCalendar`].
//! - Missing keys fall back to defaults; present keys are never ignored.

use crate::timeline::calendar::{CivilCalendar, DEFAULT_TIMEZONE};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const SUPPORTED_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Errors while loading or validating [`EngineConfig`].
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    UnknownTimezone(String),
    UnsupportedLogLevel(String),
    RelativeLogDir(PathBuf),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid engine config: {err}"),
            Self::UnknownTimezone(name) => write!(f, "unknown IANA timezone `{name}`"),
            Self::UnsupportedLogLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::RelativeLogDir(path) => {
                write!(f, "log_dir must be an absolute path, got `{}`", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Runtime settings for the timeline engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// IANA zone whose civil dates define journey days.
    pub timezone: String,
    /// `None` uses the build-mode default.
    pub log_level: Option<String>,
    /// Logging stays off unless set.
    pub log_dir: Option<PathBuf>,
    /// In-memory store when unset; the CLI requires it for existing journeys.
    pub database_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            log_level: None,
            log_dir: None,
            database_path: None,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calendar()?;

        if let Some(level) = &self.log_level {
            let normalized = level.trim().to_ascii_lowercase();
            if !SUPPORTED_LEVELS.contains(&normalized.as_str()) {
                return Err(ConfigError::UnsupportedLogLevel(level.clone()));
            }
        }

        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::RelativeLogDir(dir.clone()));
            }
        }

        Ok(())
    }

    /// Civil calendar for the configured timezone.
    pub fn calendar(&self) -> Result<CivilCalendar, ConfigError> {
        CivilCalendar::from_iana_name(self.timezone.trim())
            .ok_or_else(|| ConfigError::UnknownTimezone(self.timezone.clone()))
    }
}
