//! Shared helpers for CLI commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rollcall_core::{ReportOptions, SessionLogId};

/// Renders a timestamp in the report offset, to the minute.
pub fn local_time(time: DateTime<Utc>, options: &ReportOptions) -> String {
    time.with_timezone(&options.utc_offset)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

pub fn parse_log_id(id: &str) -> Result<SessionLogId> {
    SessionLogId::new(id).with_context(|| format!("invalid session log id {id:?}"))
}
