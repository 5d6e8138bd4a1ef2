//! Opening the configured session log store.

use std::sync::Arc;

use anyhow::{Context, Result};
use rollcall_core::{Clock, InMemorySessionLogStore, SessionLogStore};
use rollcall_db::SqliteSessionLogStore;

use crate::{Config, LogStoreKind};

/// Opens the log store named by `config`, creating the database directory if needed.
pub fn open_log_store(config: &Config, clock: Arc<dyn Clock>) -> Result<Arc<dyn SessionLogStore>> {
    match config.log_store {
        LogStoreKind::Sqlite => {
            if let Some(parent) = config.database_path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
            let store = SqliteSessionLogStore::open(&config.database_path, clock)
                .with_context(|| format!("failed to open {}", config.database_path.display()))?;
            Ok(Arc::new(store))
        }
        LogStoreKind::Memory => {
            tracing::debug!(
                capacity = config.memory_capacity.get(),
                "using in-memory log store; logs are discarded on exit"
            );
            Ok(Arc::new(InMemorySessionLogStore::new(
                config.memory_capacity,
                clock,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::SystemClock;

    #[test]
    fn sqlite_store_creates_parent_directory() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: temp.path().join("nested/dir/rollcall.db"),
            ..Config::default()
        };

        let store = open_log_store(&config, Arc::new(SystemClock)).unwrap();
        assert!(store.retrieve_all().unwrap().is_empty());
        assert!(config.database_path.exists());
    }

    #[test]
    fn memory_store_touches_no_files() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: temp.path().join("rollcall.db"),
            log_store: LogStoreKind::Memory,
            ..Config::default()
        };

        open_log_store(&config, Arc::new(SystemClock)).unwrap();
        assert!(!config.database_path.exists());
    }
}
