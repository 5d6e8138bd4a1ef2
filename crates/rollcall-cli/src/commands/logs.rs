//! Logs command for listing, showing and deleting stored session logs.

use std::io::Write;

use anyhow::{Context, Result, bail};
use rollcall_core::attendance::format_minutes;
use rollcall_core::{ReportOptions, SessionLog, SessionLogStore, compute_session_output_with};
use serde_json::json;

use super::util::{local_time, parse_log_id};

pub fn list<W: Write>(
    writer: &mut W,
    logs: &dyn SessionLogStore,
    options: &ReportOptions,
    json: bool,
) -> Result<()> {
    let all = logs.retrieve_all().context("failed to read session logs")?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&all)?)?;
        return Ok(());
    }

    if all.is_empty() {
        writeln!(writer, "No session logs stored.")?;
        return Ok(());
    }

    for log in &all {
        writeln!(
            writer,
            "{}  {}:{}  {}  {} min  owner {}  {}",
            log.id,
            log.session.guild_id,
            log.session.channel_id,
            local_time(log.session.time_started, options),
            format_minutes(log.session.duration()),
            log.session.owner_id,
            if log.is_pushed() { "pushed" } else { "unpushed" },
        )?;
    }
    Ok(())
}

pub fn show<W: Write>(
    writer: &mut W,
    logs: &dyn SessionLogStore,
    options: &ReportOptions,
    id: &str,
    json: bool,
) -> Result<()> {
    let id = parse_log_id(id)?;
    let Some(log) = logs
        .retrieve(&id)
        .with_context(|| format!("failed to read session log {id}"))?
    else {
        bail!("session log {id} not found");
    };
    let output = compute_session_output_with(&log.session, options).with_log_id(&log.id);

    if json {
        let verdicts: Vec<_> = output
            .verdicts
            .iter()
            .map(|row| {
                json!({
                    "user_id": row.user_id,
                    "percent": row.percent,
                    "verdict": row.verdict,
                    "present_ms": row.present.num_milliseconds(),
                })
            })
            .collect();
        let document = json!({ "log": log, "verdicts": verdicts });
        writeln!(writer, "{}", serde_json::to_string_pretty(&document)?)?;
        return Ok(());
    }

    write_header(writer, &log, options)?;
    writeln!(writer)?;
    write!(writer, "{}", output.verdicts_csv())?;
    Ok(())
}

fn write_header<W: Write>(writer: &mut W, log: &SessionLog, options: &ReportOptions) -> Result<()> {
    writeln!(writer, "Session log {}", log.id)?;
    writeln!(writer, "Owner: {}", log.session.owner_id)?;
    writeln!(
        writer,
        "Channel: {}:{}",
        log.session.guild_id, log.session.channel_id
    )?;
    writeln!(writer, "Started: {}", local_time(log.session.time_started, options))?;
    writeln!(writer, "Ended: {}", local_time(log.session.time_ended, options))?;
    writeln!(writer, "Stored: {}", local_time(log.time_stored, options))?;
    match log.time_pushed {
        Some(pushed) => writeln!(writer, "Pushed: {}", local_time(pushed, options))?,
        None => writeln!(writer, "Pushed: no")?,
    }
    writeln!(writer, "Events: {}", log.session.events.len())?;
    Ok(())
}

pub fn delete<W: Write>(writer: &mut W, logs: &dyn SessionLogStore, id: &str) -> Result<()> {
    let id = parse_log_id(id)?;
    let existed = logs
        .retrieve(&id)
        .with_context(|| format!("failed to read session log {id}"))?
        .is_some();
    logs.delete(&id)
        .with_context(|| format!("failed to delete session log {id}"))?;

    if existed {
        writeln!(writer, "Deleted session log {id}")?;
    } else {
        writeln!(writer, "No session log {id}; nothing deleted")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};
    use rollcall_core::{
        ChannelId, Clock, CompletedSession, GuildId, InMemorySessionLogStore, ManualClock,
        SessionEvent, SessionLogId, UserId,
    };

    use super::*;

    use insta::assert_snapshot;

    fn ts(minutes: i64) -> DateTime<Utc> {
        let start: DateTime<Utc> = "2024-05-01T03:00:00Z".parse().unwrap();
        start + Duration::minutes(minutes)
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn session() -> CompletedSession {
        CompletedSession {
            owner_id: user("owner"),
            guild_id: GuildId::new("guild").unwrap(),
            channel_id: ChannelId::new("voice").unwrap(),
            time_started: ts(0),
            time_ended: ts(60),
            events: vec![
                SessionEvent::join(user("A"), ts(0)),
                SessionEvent::join(user("B"), ts(50)),
                SessionEvent::leave(user("A"), ts(60)),
                SessionEvent::leave(user("B"), ts(60)),
            ],
        }
    }

    fn store_with_log() -> (InMemorySessionLogStore, SessionLogId) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(ts(61)));
        let logs = InMemorySessionLogStore::new(NonZeroUsize::new(5).unwrap(), clock);
        let id = logs.store(&session()).unwrap();
        (logs, id)
    }

    #[test]
    fn list_outputs_one_line_per_log() {
        let (logs, id) = store_with_log();
        let mut output = Vec::new();
        list(&mut output, &logs, &ReportOptions::default(), false).unwrap();

        let output = String::from_utf8(output).unwrap().replace(id.as_str(), "[ID]");
        assert_snapshot!(
            output,
            @"[ID]  guild:voice  2024-05-01 10:00  60 min  owner owner  unpushed"
        );
    }

    #[test]
    fn list_handles_empty_store() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(ts(0)));
        let logs = InMemorySessionLogStore::new(NonZeroUsize::new(5).unwrap(), clock);
        let mut output = Vec::new();
        list(&mut output, &logs, &ReportOptions::default(), false).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "No session logs stored.\n");
    }

    #[test]
    fn list_json_round_trips_logs() {
        let (logs, id) = store_with_log();
        let mut output = Vec::new();
        list(&mut output, &logs, &ReportOptions::default(), true).unwrap();

        let parsed: Vec<SessionLog> = serde_json::from_slice(&output).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, id);
        assert_eq!(parsed[0].session, session());
    }

    #[test]
    fn show_renders_header_and_verdicts() {
        let (logs, id) = store_with_log();
        let mut output = Vec::new();
        show(&mut output, &logs, &ReportOptions::default(), id.as_str(), false).unwrap();

        let output = String::from_utf8(output).unwrap().replace(id.as_str(), "[ID]");
        assert_snapshot!(output, @r"
        Session log [ID]
        Owner: owner
        Channel: guild:voice
        Started: 2024-05-01 10:00
        Ended: 2024-05-01 11:00
        Stored: 2024-05-01 11:01
        Pushed: no
        Events: 4

        id,perc,status,duration
        A,1,Hadir,60
        B,0.16666666666666666,Absen,10
        ");
    }

    #[test]
    fn show_json_includes_verdicts() {
        let (logs, id) = store_with_log();
        let mut output = Vec::new();
        show(&mut output, &logs, &ReportOptions::default(), id.as_str(), true).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["log"]["id"], id.as_str());
        assert_eq!(value["verdicts"][0]["verdict"], "Hadir");
        assert_eq!(value["verdicts"][1]["present_ms"], 600_000);
    }

    #[test]
    fn show_unknown_log_fails() {
        let (logs, _id) = store_with_log();
        let err = show(&mut Vec::new(), &logs, &ReportOptions::default(), "missing", false)
            .unwrap_err();
        assert_eq!(err.to_string(), "session log missing not found");
    }

    #[test]
    fn delete_reports_whether_anything_was_removed() {
        let (logs, id) = store_with_log();

        let mut output = Vec::new();
        delete(&mut output, &logs, id.as_str()).unwrap();
        delete(&mut output, &logs, id.as_str()).unwrap();

        let output = String::from_utf8(output).unwrap().replace(id.as_str(), "[ID]");
        assert_snapshot!(output, @r"
        Deleted session log [ID]
        No session log [ID]; nothing deleted
        ");
    }
}
