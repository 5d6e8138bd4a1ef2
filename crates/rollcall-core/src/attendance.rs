//! Attendance derivation.
//!
//! Turns a completed session into three tabular outputs and a short report:
//!
//! 1. Session summary: date, owner, start time, duration.
//! 2. Event detail: every join/leave, in log order.
//! 3. Attendance verdicts: per participant, the fraction of the session they
//!    were present for and whether that clears [`ATTENDANCE_THRESHOLD`].
//!
//! # Presence accumulation
//!
//! For each participant, every event contributes its offset from the session
//! start: a join subtracts it and a leave adds it. With joins and leaves
//! alternating per participant, each join/leave pair contributes exactly the
//! length of that presence interval. The session service brackets the stream
//! with a join at the start for everyone already present and a leave at the
//! end for everyone still present, so every interval is closed.
//!
//! The accumulation does not validate alternation. Use [`check_alternation`]
//! to detect malformed streams.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{EventKind, SessionEvent};
use crate::session::CompletedSession;
use crate::types::{SessionLogId, UserId};

/// Fraction of the session a participant must exceed to count as present.
pub const ATTENDANCE_THRESHOLD: f64 = 0.8;

/// Attendance confirmation form linked from every report.
pub const ATTENDANCE_FORM_URL: &str = "https://docs.google.com/forms/d/e/1FAIpQLSdGjYqEQS9R4xK95_rwQHT-idPE0SBmbpD6g6ChBX4WFV_dCg/viewform?usp=sf_link";

/// Default reporting offset (UTC+7).
pub const DEFAULT_REPORT_OFFSET_HOURS: i32 = 7;

pub const SUMMARY_HEADER: &str = "date,owner,start,duration";
pub const EVENT_DETAIL_HEADER: &str = "sessionId,id,type,time";
pub const VERDICTS_HEADER: &str = "id,perc,status,duration";

/// Placeholder for the session id column before the log has been stored.
const UNSTORED_SESSION_REF: &str = "unstored";

/// Errors building report options.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportOptionsError {
    #[error("UTC offset out of range: {hours} hours")]
    OffsetOutOfRange { hours: i32 },
}

/// Presentation settings for rendered outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    /// Offset dates and times are rendered in.
    pub utc_offset: FixedOffset,
}

impl ReportOptions {
    pub fn with_offset_hours(hours: i32) -> Result<Self, ReportOptionsError> {
        hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .map(|utc_offset| Self { utc_offset })
            .ok_or(ReportOptionsError::OffsetOutOfRange { hours })
    }
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self::with_offset_hours(DEFAULT_REPORT_OFFSET_HOURS).unwrap_or(Self {
            utc_offset: Utc.fix(),
        })
    }
}

/// Attendance classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Present for more than the threshold.
    #[serde(rename = "Hadir")]
    Attended,
    /// Present for the threshold or less.
    #[serde(rename = "Absen")]
    Absent,
}

impl Verdict {
    pub fn from_percent(percent: f64) -> Self {
        if percent > ATTENDANCE_THRESHOLD {
            Self::Attended
        } else {
            Self::Absent
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Attended => "Hadir",
            Self::Absent => "Absen",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One-line overview of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub date: NaiveDate,
    pub owner_id: UserId,
    pub start_time: NaiveTime,
    pub duration: Duration,
}

/// A single logged event, localized for export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub user_id: UserId,
    pub kind: EventKind,
    pub time: DateTime<FixedOffset>,
}

/// Attendance derived for one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct VerdictRow {
    pub user_id: UserId,
    /// Raw fraction of the session present, not multiplied by 100.
    pub percent: f64,
    pub verdict: Verdict,
    pub present: Duration,
}

/// Human-readable session stats for the invoking caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub date: NaiveDate,
    pub owner_id: UserId,
    pub start_time: NaiveTime,
    pub duration: Duration,
    pub form_url: &'static str,
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session Stats")?;
        writeln!(f, "Date: {}", self.date.format("%Y-%m-%d"))?;
        writeln!(f, "Tutor ID: {}", self.owner_id)?;
        writeln!(f, "Start Time: {}", self.start_time.format("%H:%M"))?;
        writeln!(f, "Duration (minutes): {}", format_minutes(self.duration))?;
        write!(f, "Attendance Form: {}", self.form_url)
    }
}

/// Everything derived from a completed session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutput {
    pub summary: SessionSummary,
    pub event_detail: Vec<EventRow>,
    pub verdicts: Vec<VerdictRow>,
    pub report: SessionReport,
    session_ref: String,
}

impl SessionOutput {
    /// Fills the session id column of the event detail export.
    #[must_use]
    pub fn with_log_id(mut self, id: &SessionLogId) -> Self {
        self.session_ref = id.to_string();
        self
    }

    pub fn summary_csv(&self) -> String {
        let mut out = format!("{SUMMARY_HEADER}\n");
        out.push_str(&format!(
            "{},{},{},{}\n",
            self.summary.date.format("%Y-%m-%d"),
            self.summary.owner_id,
            self.summary.start_time.format("%H:%M"),
            format_minutes(self.summary.duration),
        ));
        out
    }

    pub fn event_detail_csv(&self) -> String {
        let mut out = format!("{EVENT_DETAIL_HEADER}\n");
        for row in &self.event_detail {
            out.push_str(&format!(
                "{},{},{},{}\n",
                self.session_ref,
                row.user_id,
                row.kind.label(),
                row.time.format("%Y-%m-%d %H:%M:%S%.3f"),
            ));
        }
        out
    }

    pub fn verdicts_csv(&self) -> String {
        let mut out = format!("{VERDICTS_HEADER}\n");
        for row in &self.verdicts {
            out.push_str(&format!(
                "{},{},{},{}\n",
                row.user_id,
                row.percent,
                row.verdict,
                format_minutes(row.present),
            ));
        }
        out
    }
}

/// Computes outputs using the default reporting offset.
pub fn compute_session_output(session: &CompletedSession) -> SessionOutput {
    compute_session_output_with(session, &ReportOptions::default())
}

pub fn compute_session_output_with(
    session: &CompletedSession,
    options: &ReportOptions,
) -> SessionOutput {
    let started = session.time_started.with_timezone(&options.utc_offset);
    let total = session.duration();

    let summary = SessionSummary {
        date: started.date_naive(),
        owner_id: session.owner_id.clone(),
        start_time: started.time(),
        duration: total,
    };

    let event_detail = session
        .events
        .iter()
        .map(|event| EventRow {
            user_id: event.user_id.clone(),
            kind: event.kind,
            time: event.time_occurred.with_timezone(&options.utc_offset),
        })
        .collect();

    let verdicts = attendance_durations(session)
        .into_iter()
        .map(|(user_id, present)| {
            let percent = presence_fraction(present, total);
            VerdictRow {
                user_id,
                percent,
                verdict: Verdict::from_percent(percent),
                present,
            }
        })
        .collect();

    let report = SessionReport {
        date: summary.date,
        owner_id: summary.owner_id.clone(),
        start_time: summary.start_time,
        duration: total,
        form_url: ATTENDANCE_FORM_URL,
    };

    SessionOutput {
        summary,
        event_detail,
        verdicts,
        report,
        session_ref: UNSTORED_SESSION_REF.to_string(),
    }
}

/// Accumulated presence per participant, in first-appearance order.
pub fn attendance_durations(session: &CompletedSession) -> Vec<(UserId, Duration)> {
    let mut order: Vec<&UserId> = Vec::new();
    let mut totals: HashMap<&UserId, i64> = HashMap::new();

    for event in &session.events {
        let offset_ms = (event.time_occurred - session.time_started).num_milliseconds();
        let contribution = offset_ms * event.kind.presence_sign();
        match totals.entry(&event.user_id) {
            Entry::Occupied(mut entry) => *entry.get_mut() += contribution,
            Entry::Vacant(entry) => {
                order.push(&event.user_id);
                entry.insert(contribution);
            }
        }
    }

    order
        .into_iter()
        .map(|user_id| {
            let ms = totals.get(user_id).copied().unwrap_or_default();
            (user_id.clone(), Duration::milliseconds(ms))
        })
        .collect()
}

/// Zero-length sessions yield 0.0 rather than dividing by zero.
#[expect(
    clippy::cast_precision_loss,
    reason = "session lengths in milliseconds are far below 2^52"
)]
fn presence_fraction(present: Duration, total: Duration) -> f64 {
    let total_ms = total.num_milliseconds();
    if total_ms <= 0 {
        return 0.0;
    }
    present.num_milliseconds() as f64 / total_ms as f64
}

/// Renders a duration as fractional minutes (`60`, `10`, `0.5`).
#[expect(
    clippy::cast_precision_loss,
    reason = "session lengths in milliseconds are far below 2^52"
)]
pub fn format_minutes(duration: Duration) -> String {
    let minutes = duration.num_milliseconds() as f64 / 60_000.0;
    format!("{minutes}")
}

/// Why an event breaks the per-participant join/leave alternation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// The participant's first event is a leave.
    StartsWithLeave,
    /// Two consecutive events of the same kind.
    Repeated(EventKind),
    /// The event predates the participant's previous event.
    OutOfOrder,
}

/// First event found breaking alternation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event {index} for user {user_id} breaks join/leave alternation: {kind:?}")]
pub struct AlternationViolation {
    pub index: usize,
    pub user_id: UserId,
    pub kind: ViolationKind,
}

/// Checks that each participant's events alternate join, leave, join, ...
/// with non-decreasing timestamps.
///
/// A trailing join (participant still present) is accepted.
pub fn check_alternation(events: &[SessionEvent]) -> Result<(), AlternationViolation> {
    let mut last: HashMap<&UserId, &SessionEvent> = HashMap::new();

    for (index, event) in events.iter().enumerate() {
        let violation = match last.get(&event.user_id) {
            None => match event.kind {
                EventKind::Join => None,
                EventKind::Leave => Some(ViolationKind::StartsWithLeave),
            },
            Some(previous) if previous.kind == event.kind => {
                Some(ViolationKind::Repeated(event.kind))
            }
            Some(previous) if event.time_occurred < previous.time_occurred => {
                Some(ViolationKind::OutOfOrder)
            }
            Some(_) => None,
        };
        if let Some(kind) = violation {
            return Err(AlternationViolation {
                index,
                user_id: event.user_id.clone(),
                kind,
            });
        }
        last.insert(&event.user_id, event);
    }
    Ok(())
}
