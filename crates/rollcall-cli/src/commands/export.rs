//! Export command writing a stored log's reports as CSV files.
//!
//! Each log produces three files named after its ID:
//! - `<id>-sesinfo.csv`: session summary
//! - `<id>-attdet.csv`: join/leave event detail
//! - `<id>-procdet.csv`: per-participant attendance verdicts

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use rollcall_core::{
    ReportOptions, SessionLogId, SessionLogStore, SessionOutput, compute_session_output_with,
};

use super::util::parse_log_id;

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Session log ID to export.
    pub id: String,

    /// Directory to write the CSV files into.
    #[arg(long, default_value = ".")]
    pub out: PathBuf,
}

pub fn run<W: Write>(
    writer: &mut W,
    args: &ExportArgs,
    logs: &dyn SessionLogStore,
    options: &ReportOptions,
) -> Result<()> {
    let id = parse_log_id(&args.id)?;
    let Some(log) = logs
        .retrieve(&id)
        .with_context(|| format!("failed to read session log {id}"))?
    else {
        bail!("session log {id} not found");
    };

    let output = compute_session_output_with(&log.session, options).with_log_id(&log.id);
    for path in write_reports(&args.out, &log.id, &output)? {
        writeln!(writer, "Wrote {}", path.display())?;
    }
    Ok(())
}

/// Writes the three CSV reports for `id` into `dir`, returning their paths.
pub fn write_reports(
    dir: &Path,
    id: &SessionLogId,
    output: &SessionOutput,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let reports = [
        ("sesinfo", output.summary_csv()),
        ("attdet", output.event_detail_csv()),
        ("procdet", output.verdicts_csv()),
    ];

    let mut written = Vec::with_capacity(reports.len());
    for (suffix, contents) in reports {
        let path = dir.join(format!("{id}-{suffix}.csv"));
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    tracing::debug!(log_id = %id, dir = %dir.display(), "exported session reports");
    Ok(written)
}
