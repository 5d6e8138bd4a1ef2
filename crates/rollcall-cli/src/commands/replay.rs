//! Replay command driving sessions from a recorded presence file.
//!
//! The file holds one JSON object per line, each with an `at` timestamp and an
//! `action`:
//!
//! ```text
//! {"at":"2024-05-01T03:00:00Z","action":"start","owner":"o","guild":"g","channel":"c","members":["a"]}
//! {"at":"2024-05-01T03:50:00Z","action":"join","user":"b","guild":"g","channel":"c"}
//! {"at":"2024-05-01T03:55:00Z","action":"leave","user":"b","guild":"g","channel":"c"}
//! {"at":"2024-05-01T04:00:00Z","action":"stop","guild":"g","channel":"c","members":["a"]}
//! ```
//!
//! `members` lists who is in the channel at that moment. Blank lines and lines
//! starting with `#` are skipped. Timestamps must not go backwards.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;
use rollcall_core::{
    ChannelId, Clock, GuildId, InMemoryOngoingSessionStore, ManualClock, ReportOptions,
    SessionService, StopSessionError, UserId, VoiceChannel,
};
use serde::Deserialize;

use super::export::write_reports;
use crate::Config;
use crate::store::open_log_store;

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// JSON-lines file of presence actions.
    pub file: PathBuf,

    /// Also write each stored session's CSV reports into this directory.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ReplayLine {
    at: DateTime<Utc>,
    #[serde(flatten)]
    action: ReplayAction,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ReplayAction {
    Start {
        owner: UserId,
        guild: GuildId,
        channel: ChannelId,
        #[serde(default)]
        members: Vec<UserId>,
    },
    Join {
        user: UserId,
        guild: GuildId,
        channel: ChannelId,
    },
    Leave {
        user: UserId,
        guild: GuildId,
        channel: ChannelId,
    },
    Stop {
        guild: GuildId,
        channel: ChannelId,
        #[serde(default)]
        members: Vec<UserId>,
    },
}

/// Outcome counts of a replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub stored: usize,
    pub failed: usize,
    pub ongoing: usize,
}

pub fn run<W: Write>(
    writer: &mut W,
    args: &ReplayArgs,
    config: &Config,
    options: ReportOptions,
) -> Result<ReplaySummary> {
    let file = File::open(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))?;

    // The clock starts at the epoch and jumps to the first entry's time.
    let clock = Arc::new(ManualClock::new(DateTime::UNIX_EPOCH));
    let logs = open_log_store(config, Arc::clone(&clock) as Arc<dyn Clock>)?;
    let service = SessionService::new(
        Arc::new(InMemoryOngoingSessionStore::new()),
        logs,
        Arc::clone(&clock) as Arc<dyn Clock>,
    )
    .with_report_options(options);

    replay(
        BufReader::new(file),
        writer,
        &service,
        &clock,
        args.export.as_deref(),
    )
}

/// Applies every entry in `reader` to `service`, advancing `clock` to each entry's time.
pub fn replay<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    service: &SessionService,
    clock: &ManualClock,
    export_dir: Option<&Path>,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    let mut previous: Option<DateTime<Utc>> = None;

    for (index, line) in reader.lines().enumerate() {
        let number = index + 1;
        let line = line.with_context(|| format!("failed to read line {number}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entry: ReplayLine = serde_json::from_str(trimmed)
            .with_context(|| format!("line {number}: invalid replay entry"))?;
        if previous.is_some_and(|previous| entry.at < previous) {
            bail!("line {number}: timestamp {} goes backwards", entry.at);
        }
        previous = Some(entry.at);
        clock.set(entry.at);
        let at = entry.at.to_rfc3339_opts(SecondsFormat::Secs, true);

        match entry.action {
            ReplayAction::Start {
                owner,
                guild,
                channel,
                members,
            } => {
                let channel = VoiceChannel {
                    id: channel,
                    guild_id: guild,
                    member_user_ids: members,
                };
                match service.start_session(owner, &channel) {
                    Ok(session) => writeln!(
                        writer,
                        "[{at}] started session in {} with {} present",
                        session.key(),
                        session.events.len()
                    )?,
                    Err(err) => writeln!(writer, "[{at}] line {number}: {err}")?,
                }
            }
            ReplayAction::Join {
                user,
                guild,
                channel,
            } => {
                service.handle_joined_channel(user, &guild, &channel);
            }
            ReplayAction::Leave {
                user,
                guild,
                channel,
            } => {
                service.handle_left_channel(user, &guild, &channel);
            }
            ReplayAction::Stop {
                guild,
                channel,
                members,
            } => {
                let channel = VoiceChannel {
                    id: channel,
                    guild_id: guild,
                    member_user_ids: members,
                };
                match service.stop_session(&channel) {
                    Ok(stopped) => {
                        summary.stored += 1;
                        writeln!(
                            writer,
                            "[{at}] stopped session in {}; stored log {}",
                            channel.key(),
                            stopped.session_log.id
                        )?;
                        writeln!(writer, "{}", stopped.output.report)?;
                        if let Some(dir) = export_dir {
                            let paths =
                                write_reports(dir, &stopped.session_log.id, &stopped.output)?;
                            for path in paths {
                                writeln!(writer, "Wrote {}", path.display())?;
                            }
                        }
                        writeln!(writer)?;
                    }
                    Err(err @ StopSessionError::SessionNotFound { .. }) => {
                        writeln!(writer, "[{at}] line {number}: {err}")?;
                    }
                    Err(StopSessionError::LogNotStored { output, source, .. }) => {
                        summary.failed += 1;
                        writeln!(
                            writer,
                            "[{at}] line {number}: session in {} stopped but not stored: {source}",
                            channel.key()
                        )?;
                        writeln!(writer, "{}", output.report)?;
                        writeln!(writer)?;
                    }
                }
            }
        }
    }

    summary.ongoing = service.ongoing_count();
    writeln!(
        writer,
        "Replay finished: {} stored, {} failed, {} still ongoing",
        summary.stored, summary.failed, summary.ongoing
    )?;
    Ok(summary)
}
