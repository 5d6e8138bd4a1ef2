//! Registry of sessions currently in progress.
//!
//! At most one session may be ongoing per (guild, channel). Entries are
//! transient: nothing here survives a restart, and no history is kept.
//!
//! # Concurrency
//!
//! Every operation takes the store's lock for its whole duration, so each
//! call is atomic with respect to the others. Callers that need
//! check-then-insert or read-modify-write must use [`OngoingSessionStore::try_put`]
//! and [`OngoingSessionStore::append_event`] rather than composing
//! `has`/`get`/`put`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::event::SessionEvent;
use crate::session::{OngoingSession, SessionDetails};
use crate::types::{ChannelId, GuildId, SessionKey};

/// Storage for in-progress sessions keyed by guild and channel.
pub trait OngoingSessionStore: Send + Sync {
    fn has(&self, guild_id: &GuildId, channel_id: &ChannelId) -> bool;

    /// Returns a snapshot of the session at that key.
    fn get(&self, guild_id: &GuildId, channel_id: &ChannelId) -> Option<OngoingSession>;

    /// Creates and stores a session, overwriting any existing entry at its key.
    fn put(&self, details: SessionDetails) -> OngoingSession;

    /// Creates and stores a session only if its key is vacant.
    ///
    /// Returns the session already at that key otherwise.
    fn try_put(&self, details: SessionDetails) -> Result<OngoingSession, OngoingSession>;

    /// Removes and returns the session at that key.
    fn delete(&self, guild_id: &GuildId, channel_id: &ChannelId) -> Option<OngoingSession>;

    /// Appends an event to the session at that key.
    ///
    /// Returns `false` if no session is ongoing there.
    fn append_event(
        &self,
        guild_id: &GuildId,
        channel_id: &ChannelId,
        event: SessionEvent,
    ) -> bool;

    /// Number of ongoing sessions.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process ongoing session store backed by a hash map.
#[derive(Debug, Default)]
pub struct InMemoryOngoingSessionStore {
    sessions: Mutex<HashMap<SessionKey, OngoingSession>>,
}

impl InMemoryOngoingSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, OngoingSession>> {
        // Every mutation leaves the map consistent, so a poisoned lock is still usable.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key(guild_id: &GuildId, channel_id: &ChannelId) -> SessionKey {
    SessionKey::new(guild_id.clone(), channel_id.clone())
}

impl OngoingSessionStore for InMemoryOngoingSessionStore {
    fn has(&self, guild_id: &GuildId, channel_id: &ChannelId) -> bool {
        self.lock().contains_key(&key(guild_id, channel_id))
    }

    fn get(&self, guild_id: &GuildId, channel_id: &ChannelId) -> Option<OngoingSession> {
        self.lock().get(&key(guild_id, channel_id)).cloned()
    }

    fn put(&self, details: SessionDetails) -> OngoingSession {
        let session = OngoingSession::from(details);
        self.lock().insert(session.key(), session.clone());
        session
    }

    fn try_put(&self, details: SessionDetails) -> Result<OngoingSession, OngoingSession> {
        let session = OngoingSession::from(details);
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(&session.key()) {
            return Err(existing.clone());
        }
        sessions.insert(session.key(), session.clone());
        Ok(session)
    }

    fn delete(&self, guild_id: &GuildId, channel_id: &ChannelId) -> Option<OngoingSession> {
        self.lock().remove(&key(guild_id, channel_id))
    }

    fn append_event(
        &self,
        guild_id: &GuildId,
        channel_id: &ChannelId,
        event: SessionEvent,
    ) -> bool {
        match self.lock().get_mut(&key(guild_id, channel_id)) {
            Some(session) => {
                session.events.push(event);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
