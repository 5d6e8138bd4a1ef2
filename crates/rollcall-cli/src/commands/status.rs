//! Status command for showing the log store and push backlog.

use std::io::Write;

use anyhow::{Context, Result};
use rollcall_core::{ReportOptions, SessionLogStore};

use super::util::local_time;
use crate::{Config, LogStoreKind};

pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    logs: &dyn SessionLogStore,
    options: &ReportOptions,
) -> Result<()> {
    let all = logs.retrieve_all().context("failed to read session logs")?;
    let latest = logs
        .latest_unpushed()
        .context("failed to find latest unpushed log")?;

    writeln!(writer, "Rollcall status")?;
    match config.log_store {
        LogStoreKind::Sqlite => writeln!(
            writer,
            "Log store: sqlite ({})",
            config.database_path.display()
        )?,
        LogStoreKind::Memory => writeln!(
            writer,
            "Log store: memory (capacity {})",
            config.memory_capacity
        )?,
    }
    writeln!(
        writer,
        "Logs stored: {} ({} pushed)",
        all.len(),
        all.iter().filter(|log| log.is_pushed()).count()
    )?;
    match latest {
        Some(log) => writeln!(
            writer,
            "Latest unpushed: {} (stored {})",
            log.id,
            local_time(log.time_stored, options)
        )?,
        None => writeln!(writer, "Latest unpushed: none")?,
    }
    writeln!(
        writer,
        "Pushlog endpoint: {}",
        if config.pushlog_endpoint.is_some() {
            "configured"
        } else {
            "not configured"
        }
    )?;

    Ok(())
}
