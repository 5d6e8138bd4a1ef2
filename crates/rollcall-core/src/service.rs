//! Session lifecycle: start, live presence updates, stop.
//!
//! Per (guild, channel) the service moves between two states:
//!
//! ```text
//! Absent --start_session--> Ongoing --stop_session--> Absent (+ stored log)
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::attendance::{
    ReportOptions, SessionOutput, check_alternation, compute_session_output_with,
};
use crate::clock::Clock;
use crate::event::SessionEvent;
use crate::log_store::{SessionLogStore, StoreError};
use crate::ongoing::OngoingSessionStore;
use crate::session::{CompletedSession, OngoingSession, SessionDetails, SessionLog, VoiceChannel};
use crate::types::{ChannelId, GuildId, SessionKey, UserId};

/// Errors starting a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartSessionError {
    #[error("a session owned by {owner_id} is already ongoing in {key}")]
    SessionOngoing { key: SessionKey, owner_id: UserId },
}

/// Errors stopping a session.
#[derive(Debug, Error)]
pub enum StopSessionError {
    #[error("no session is ongoing in {key}")]
    SessionNotFound { key: SessionKey },
    /// The session was stopped and its attendance computed, but persisting
    /// the log failed. The computed data is carried so it is not lost.
    #[error(
        "session in {}:{} stopped but its log was not stored",
        .session.guild_id,
        .session.channel_id
    )]
    LogNotStored {
        session: Box<CompletedSession>,
        output: Box<SessionOutput>,
        #[source]
        source: StoreError,
    },
}

/// Result of a successful stop.
#[derive(Debug, Clone)]
pub struct StopSessionOutput {
    pub session_log: SessionLog,
    pub output: SessionOutput,
}

/// Orchestrates ongoing sessions, attendance computation, and log storage.
pub struct SessionService {
    ongoing: Arc<dyn OngoingSessionStore>,
    logs: Arc<dyn SessionLogStore>,
    clock: Arc<dyn Clock>,
    report: ReportOptions,
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("ongoing", &self.ongoing.len())
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

impl SessionService {
    pub fn new(
        ongoing: Arc<dyn OngoingSessionStore>,
        logs: Arc<dyn SessionLogStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ongoing,
            logs,
            clock,
            report: ReportOptions::default(),
        }
    }

    #[must_use]
    pub const fn with_report_options(mut self, report: ReportOptions) -> Self {
        self.report = report;
        self
    }

    /// Number of sessions currently ongoing.
    pub fn ongoing_count(&self) -> usize {
        self.ongoing.len()
    }

    /// Starts tracking `channel`, treating everyone present as joining now.
    pub fn start_session(
        &self,
        owner_id: UserId,
        channel: &VoiceChannel,
    ) -> Result<OngoingSession, StartSessionError> {
        let time_started = self.clock.now();
        let events = channel
            .member_user_ids
            .iter()
            .map(|user_id| SessionEvent::join(user_id.clone(), time_started))
            .collect();

        let details = SessionDetails {
            owner_id,
            guild_id: channel.guild_id.clone(),
            channel_id: channel.id.clone(),
            time_started,
            events,
        };

        match self.ongoing.try_put(details) {
            Ok(session) => {
                tracing::info!(
                    key = %session.key(),
                    owner = %session.owner_id,
                    present = session.events.len(),
                    "session started"
                );
                Ok(session)
            }
            Err(existing) => Err(StartSessionError::SessionOngoing {
                key: existing.key(),
                owner_id: existing.owner_id,
            }),
        }
    }

    /// Records a join for a tracked channel. Returns whether a session was there.
    pub fn handle_joined_channel(
        &self,
        user_id: UserId,
        guild_id: &GuildId,
        channel_id: &ChannelId,
    ) -> bool {
        let event = SessionEvent::join(user_id, self.clock.now());
        self.record(guild_id, channel_id, event)
    }

    /// Records a leave for a tracked channel. Returns whether a session was there.
    pub fn handle_left_channel(
        &self,
        user_id: UserId,
        guild_id: &GuildId,
        channel_id: &ChannelId,
    ) -> bool {
        let event = SessionEvent::leave(user_id, self.clock.now());
        self.record(guild_id, channel_id, event)
    }

    fn record(&self, guild_id: &GuildId, channel_id: &ChannelId, event: SessionEvent) -> bool {
        let kind = event.kind;
        let user_id = event.user_id.clone();
        let recorded = self.ongoing.append_event(guild_id, channel_id, event);
        if recorded {
            tracing::debug!(
                guild = %guild_id,
                channel = %channel_id,
                user = %user_id,
                %kind,
                "presence recorded"
            );
        } else {
            tracing::trace!(
                guild = %guild_id,
                channel = %channel_id,
                user = %user_id,
                %kind,
                "no session; presence ignored"
            );
        }
        recorded
    }

    /// Stops the session in `channel`, closing out everyone still present,
    /// computing attendance and persisting the log.
    pub fn stop_session(
        &self,
        channel: &VoiceChannel,
    ) -> Result<StopSessionOutput, StopSessionError> {
        // Taking the session out first means a racing join/leave either landed
        // before this point or finds no session.
        let Some(mut session) = self.ongoing.delete(&channel.guild_id, &channel.id) else {
            return Err(StopSessionError::SessionNotFound { key: channel.key() });
        };

        let time_ended = self.clock.now();
        session.events.extend(
            channel
                .member_user_ids
                .iter()
                .map(|user_id| SessionEvent::leave(user_id.clone(), time_ended)),
        );
        let completed = session.complete(time_ended);

        if let Err(violation) = check_alternation(&completed.events) {
            tracing::warn!(
                guild = %completed.guild_id,
                channel = %completed.channel_id,
                %violation,
                "malformed presence stream; attendance may be inaccurate"
            );
        }

        let output = compute_session_output_with(&completed, &self.report);

        match self.persist(&completed) {
            Ok(session_log) => {
                tracing::info!(
                    log_id = %session_log.id,
                    guild = %completed.guild_id,
                    channel = %completed.channel_id,
                    participants = output.verdicts.len(),
                    "session stopped"
                );
                let output = output.with_log_id(&session_log.id);
                Ok(StopSessionOutput {
                    session_log,
                    output,
                })
            }
            Err(source) => {
                tracing::error!(
                    guild = %completed.guild_id,
                    channel = %completed.channel_id,
                    error = %source,
                    "session stopped but log was not stored"
                );
                Err(StopSessionError::LogNotStored {
                    session: Box::new(completed),
                    output: Box::new(output),
                    source,
                })
            }
        }
    }

    fn persist(&self, completed: &CompletedSession) -> Result<SessionLog, StoreError> {
        let id = self.logs.store(completed)?;
        self.logs
            .retrieve(&id)?
            .ok_or(StoreError::MissingAfterStore { id })
    }
}
