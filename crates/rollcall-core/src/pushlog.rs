//! Pushing stored session logs to an external record keeper.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::attendance::attendance_durations;
use crate::log_store::{SessionLogStore, StoreError};
use crate::session::SessionLog;
use crate::types::{SessionLogId, UserId};

/// Per-participant attendance sent with a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceDetail {
    pub user_id: UserId,
    pub attendance_duration: Duration,
}

/// Everything a push target receives about one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushlogData {
    pub topic_id: String,
    pub session_started: DateTime<Utc>,
    pub session_duration: Duration,
    pub recorder_name: String,
    pub mentor_ids: Vec<UserId>,
    pub attendees: Vec<AttendanceDetail>,
}

impl PushlogData {
    pub fn from_log(
        log: &SessionLog,
        topic_id: impl Into<String>,
        recorder_name: impl Into<String>,
        mentor_ids: Vec<UserId>,
    ) -> Self {
        let attendees = attendance_durations(&log.session)
            .into_iter()
            .map(|(user_id, attendance_duration)| AttendanceDetail {
                user_id,
                attendance_duration,
            })
            .collect();

        Self {
            topic_id: topic_id.into(),
            session_started: log.session.time_started,
            session_duration: log.session.duration(),
            recorder_name: recorder_name.into(),
            mentor_ids,
            attendees,
        }
    }
}

/// Failure reported by a push target.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("push request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("push rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl PushError {
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(err))
    }
}

/// A destination for session logs.
pub trait PushlogTarget: Send + Sync {
    fn push(&self, data: &PushlogData) -> impl Future<Output = Result<(), PushError>> + Send;
}

#[derive(Debug, Error)]
pub enum PushLogError {
    #[error("session log {id} not found")]
    LogNotFound { id: SessionLogId },
    #[error("no unpushed session log")]
    NoUnpushed,
    #[error("pushing session log {id} failed")]
    PushUnsuccessful {
        id: SessionLogId,
        #[source]
        source: PushError,
    },
    /// The target accepted the log but it was gone from the store by the
    /// time it could be marked, e.g. evicted from a bounded in-memory store.
    #[error("session log {id} was pushed but is no longer stored")]
    PushedButGone { id: SessionLogId },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Sends stored logs to a [`PushlogTarget`] and marks them pushed.
pub struct PushlogService<T> {
    logs: Arc<dyn SessionLogStore>,
    target: T,
}

impl<T: std::fmt::Debug> std::fmt::Debug for PushlogService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushlogService")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl<T: PushlogTarget> PushlogService<T> {
    pub fn new(logs: Arc<dyn SessionLogStore>, target: T) -> Self {
        Self { logs, target }
    }

    /// Pushes the log with `log_id`, or the latest unpushed log when `None`.
    ///
    /// On failure the log is left unpushed so it can be retried.
    pub async fn push_session_log(
        &self,
        topic_id: &str,
        documentator_name: &str,
        mentor_ids: Vec<UserId>,
        log_id: Option<&SessionLogId>,
    ) -> Result<SessionLog, PushLogError> {
        let log = match log_id {
            Some(id) => self
                .logs
                .retrieve(id)?
                .ok_or_else(|| PushLogError::LogNotFound { id: id.clone() })?,
            None => self.logs.latest_unpushed()?.ok_or(PushLogError::NoUnpushed)?,
        };

        let data = PushlogData::from_log(&log, topic_id, documentator_name, mentor_ids);
        if let Err(source) = self.target.push(&data).await {
            tracing::warn!(log_id = %log.id, error = %source, "session log push failed");
            return Err(PushLogError::PushUnsuccessful {
                id: log.id,
                source,
            });
        }

        self.logs.set_log_pushed(&log.id)?;
        tracing::info!(
            log_id = %log.id,
            topic = topic_id,
            attendees = data.attendees.len(),
            "session log pushed"
        );
        self.logs
            .retrieve(&log.id)?
            .ok_or(PushLogError::PushedButGone { id: log.id })
    }
}
