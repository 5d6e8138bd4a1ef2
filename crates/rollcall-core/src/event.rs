//! Join/leave events recorded during a session.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Whether a participant entered or left the voice channel.
///
/// `JOIN` and `LEAVE` are the canonical codes used in storage and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Join,
    Leave,
}

impl EventKind {
    /// Canonical code for storage.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Join => "JOIN",
            Self::Leave => "LEAVE",
        }
    }

    /// Label used in exported reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Join => "Join",
            Self::Leave => "Leave",
        }
    }

    /// Sign applied to an event's offset when accumulating presence.
    ///
    /// A join opens an interval (subtract its offset), a leave closes it (add its offset).
    #[must_use]
    pub const fn presence_sign(self) -> i64 {
        match self {
            Self::Join => -1,
            Self::Leave => 1,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JOIN" | "Join" | "join" => Ok(Self::Join),
            "LEAVE" | "Leave" | "leave" => Ok(Self::Leave),
            _ => Err(UnknownEventKind(s.to_string())),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown event kind strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

/// A participant entering or leaving the channel hosting a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub user_id: UserId,
    pub time_occurred: DateTime<Utc>,
}

impl SessionEvent {
    pub const fn join(user_id: UserId, time_occurred: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Join,
            user_id,
            time_occurred,
        }
    }

    pub const fn leave(user_id: UserId, time_occurred: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Leave,
            user_id,
            time_occurred,
        }
    }
}
