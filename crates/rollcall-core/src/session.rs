//! Session value types: ongoing, completed, and stored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::SessionEvent;
use crate::types::{ChannelId, GuildId, SessionKey, SessionLogId, UserId};

/// Snapshot of a voice channel supplied by the caller at start/stop time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceChannel {
    pub id: ChannelId,
    pub guild_id: GuildId,
    /// Users present in the channel right now.
    #[serde(default)]
    pub member_user_ids: Vec<UserId>,
}

impl VoiceChannel {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.guild_id.clone(), self.id.clone())
    }
}

/// Everything needed to open a session in the ongoing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetails {
    pub owner_id: UserId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub time_started: DateTime<Utc>,
    pub events: Vec<SessionEvent>,
}

/// A session that has started and not yet stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OngoingSession {
    pub owner_id: UserId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub time_started: DateTime<Utc>,
    pub events: Vec<SessionEvent>,
}

impl OngoingSession {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.guild_id.clone(), self.channel_id.clone())
    }

    /// Freezes the session at `time_ended`.
    pub fn complete(self, time_ended: DateTime<Utc>) -> CompletedSession {
        CompletedSession {
            owner_id: self.owner_id,
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            time_started: self.time_started,
            time_ended,
            events: self.events,
        }
    }
}

impl From<SessionDetails> for OngoingSession {
    fn from(details: SessionDetails) -> Self {
        Self {
            owner_id: details.owner_id,
            guild_id: details.guild_id,
            channel_id: details.channel_id,
            time_started: details.time_started,
            events: details.events,
        }
    }
}

/// An immutable record of a session that has stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub owner_id: UserId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub time_started: DateTime<Utc>,
    pub time_ended: DateTime<Utc>,
    pub events: Vec<SessionEvent>,
}

impl CompletedSession {
    /// Wall-clock length of the session. Negative spans are clamped to zero.
    pub fn duration(&self) -> Duration {
        (self.time_ended - self.time_started).max(Duration::zero())
    }
}

/// A completed session as persisted by a log store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLog {
    pub id: SessionLogId,
    #[serde(flatten)]
    pub session: CompletedSession,
    pub time_stored: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_pushed: Option<DateTime<Utc>>,
}

impl SessionLog {
    /// Wraps a freshly stored session.
    pub const fn new(
        id: SessionLogId,
        session: CompletedSession,
        time_stored: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session,
            time_stored,
            time_pushed: None,
        }
    }

    pub const fn is_pushed(&self) -> bool {
        self.time_pushed.is_some()
    }
}
