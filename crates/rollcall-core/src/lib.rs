//! Core domain logic for voice-channel roll calls.
//!
//! This crate contains the fundamental types and logic for:
//! - Sessions: tracking who is present in a voice channel while a session runs
//! - Attendance: deriving per-participant presence and verdicts from the event log
//! - Storage: the ongoing-session registry and the archive of completed logs
//! - Pushlog: sending archived logs to an external record keeper

pub mod attendance;
pub mod clock;
pub mod event;
pub mod log_store;
pub mod ongoing;
pub mod pushlog;
pub mod service;
pub mod session;
pub mod types;

pub use attendance::{
    ReportOptions, SessionOutput, Verdict, attendance_durations, check_alternation,
    compute_session_output, compute_session_output_with,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{EventKind, SessionEvent, UnknownEventKind};
pub use log_store::{InMemorySessionLogStore, SessionLogStore, StoreError};
pub use ongoing::{InMemoryOngoingSessionStore, OngoingSessionStore};
pub use pushlog::{
    AttendanceDetail, PushError, PushLogError, PushlogData, PushlogService, PushlogTarget,
};
pub use service::{SessionService, StartSessionError, StopSessionError, StopSessionOutput};
pub use session::{CompletedSession, OngoingSession, SessionDetails, SessionLog, VoiceChannel};
pub use types::{ChannelId, GuildId, SessionKey, SessionLogId, UserId, ValidationError};
