//! Configuration loading and management.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use rollcall_core::ReportOptions;
use rollcall_core::attendance::{DEFAULT_REPORT_OFFSET_HOURS, ReportOptionsError};
use serde::{Deserialize, Serialize};

/// Which session log store backs the commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStoreKind {
    Sqlite,
    /// Bounded in-process store; logs vanish when the command exits.
    Memory,
}

impl fmt::Display for LogStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        })
    }
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    pub log_store: LogStoreKind,
    /// Capacity of the in-memory log store.
    pub memory_capacity: NonZeroUsize,
    /// Offset reports are rendered in.
    pub report_utc_offset_hours: i32,
    /// HTTP endpoint session logs are pushed to.
    pub pushlog_endpoint: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("log_store", &self.log_store)
            .field("memory_capacity", &self.memory_capacity)
            .field("report_utc_offset_hours", &self.report_utc_offset_hours)
            .field(
                "pushlog_endpoint",
                &self.pushlog_endpoint.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

const DEFAULT_MEMORY_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(49);

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("rollcall.db"),
            log_store: LogStoreKind::Sqlite,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            report_utc_offset_hours: DEFAULT_REPORT_OFFSET_HOURS,
            pushlog_endpoint: None,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // RC_DATABASE_PATH, RC_LOG_STORE, ...
        figment = figment.merge(Env::prefixed("RC_"));

        figment.extract()
    }

    pub fn report_options(&self) -> Result<ReportOptions, ReportOptionsError> {
        ReportOptions::with_offset_hours(self.report_utc_offset_hours)
    }
}

/// Returns the platform-specific config directory for rollcall.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("rollcall"))
}

/// Returns the platform-specific data directory for rollcall.
///
/// On Linux: `~/.local/share/rollcall`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("rollcall"))
}
