//! Archive of completed sessions.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::clock::Clock;
use crate::session::{CompletedSession, SessionLog};
use crate::types::SessionLogId;

/// Session log storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed to read or write (I/O, constraint violation, ...).
    #[error("session log backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// A persisted log failed validation when read back.
    #[error("corrupt session log {id}: {message}")]
    Corrupt { id: String, message: String },
    /// A log reported as stored could not be read back.
    #[error("session log {id} missing after store")]
    MissingAfterStore { id: SessionLogId },
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Persistent archive of completed sessions.
pub trait SessionLogStore: Send + Sync {
    /// Persists a completed session under a newly generated ID.
    fn store(&self, session: &CompletedSession) -> Result<SessionLogId, StoreError>;

    fn retrieve(&self, id: &SessionLogId) -> Result<Option<SessionLog>, StoreError>;

    /// All stored logs, oldest first.
    fn retrieve_all(&self) -> Result<Vec<SessionLog>, StoreError>;

    /// Removes a log. Unknown IDs are not an error.
    fn delete(&self, id: &SessionLogId) -> Result<(), StoreError>;

    /// The most recently stored log that has not been pushed.
    fn latest_unpushed(&self) -> Result<Option<SessionLog>, StoreError>;

    /// Records that a log was pushed. Keeps the first push time on repeat calls.
    fn set_log_pushed(&self, id: &SessionLogId) -> Result<(), StoreError>;
}

/// Bounded in-memory log store.
///
/// Holds at most `capacity` logs; storing beyond that evicts the oldest.
pub struct InMemorySessionLogStore {
    capacity: NonZeroUsize,
    logs: Mutex<VecDeque<SessionLog>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemorySessionLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySessionLogStore")
            .field("capacity", &self.capacity)
            .field("len", &self.lock().len())
            .finish_non_exhaustive()
    }
}

impl InMemorySessionLogStore {
    pub fn new(capacity: NonZeroUsize, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity,
            logs: Mutex::new(VecDeque::with_capacity(capacity.get())),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SessionLog>> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionLogStore for InMemorySessionLogStore {
    fn store(&self, session: &CompletedSession) -> Result<SessionLogId, StoreError> {
        let id = SessionLogId::generate();
        let log = SessionLog::new(id.clone(), session.clone(), self.clock.now());

        let mut logs = self.lock();
        logs.push_back(log);
        while logs.len() > self.capacity.get() {
            if let Some(evicted) = logs.pop_front() {
                tracing::debug!(log_id = %evicted.id, "evicted oldest session log");
            }
        }
        Ok(id)
    }

    fn retrieve(&self, id: &SessionLogId) -> Result<Option<SessionLog>, StoreError> {
        Ok(self.lock().iter().find(|log| &log.id == id).cloned())
    }

    fn retrieve_all(&self) -> Result<Vec<SessionLog>, StoreError> {
        let mut logs: Vec<SessionLog> = self.lock().iter().cloned().collect();
        logs.sort_by(|a, b| {
            a.time_stored
                .cmp(&b.time_stored)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(logs)
    }

    fn delete(&self, id: &SessionLogId) -> Result<(), StoreError> {
        self.lock().retain(|log| &log.id != id);
        Ok(())
    }

    fn latest_unpushed(&self) -> Result<Option<SessionLog>, StoreError> {
        Ok(self
            .lock()
            .iter()
            .filter(|log| !log.is_pushed())
            .max_by(|a, b| {
                a.time_stored
                    .cmp(&b.time_stored)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned())
    }

    fn set_log_pushed(&self, id: &SessionLogId) -> Result<(), StoreError> {
        let now = self.clock.now();
        if let Some(log) = self.lock().iter_mut().find(|log| &log.id == id) {
            log.time_pushed.get_or_insert(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::event::SessionEvent;
    use crate::types::{ChannelId, GuildId, UserId};

    fn ts(minutes: i64) -> DateTime<Utc> {
        let start: DateTime<Utc> = "2024-05-01T03:00:00Z".parse().unwrap();
        start + Duration::minutes(minutes)
    }

    fn completed(owner: &str) -> CompletedSession {
        let user = UserId::new("a").unwrap();
        CompletedSession {
            owner_id: UserId::new(owner).unwrap(),
            guild_id: GuildId::new("guild").unwrap(),
            channel_id: ChannelId::new("voice").unwrap(),
            time_started: ts(0),
            time_ended: ts(60),
            events: vec![
                SessionEvent::join(user.clone(), ts(0)),
                SessionEvent::leave(user.clone(), ts(20)),
                SessionEvent::join(user.clone(), ts(30)),
                SessionEvent::leave(user, ts(60)),
            ],
        }
    }

    fn store_with_clock(capacity: usize) -> (InMemorySessionLogStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(ts(61)));
        let store = InMemorySessionLogStore::new(
            NonZeroUsize::new(capacity).unwrap(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        (store, clock)
    }

    #[test]
    fn store_then_retrieve_roundtrip() {
        let (store, _clock) = store_with_clock(4);
        let session = completed("owner");

        let id = store.store(&session).unwrap();
        let log = store.retrieve(&id).unwrap().unwrap();

        assert_eq!(log.id, id);
        assert_eq!(log.session, session);
        assert_eq!(log.time_stored, ts(61));
        assert!(log.time_pushed.is_none());
    }

    #[test]
    fn oldest_log_is_evicted_past_capacity() {
        let (store, clock) = store_with_clock(2);
        let first = store.store(&completed("first")).unwrap();
        clock.advance(Duration::minutes(1));
        let second = store.store(&completed("second")).unwrap();
        clock.advance(Duration::minutes(1));
        let third = store.store(&completed("third")).unwrap();

        assert!(store.retrieve(&first).unwrap().is_none());
        let ids: Vec<_> = store
            .retrieve_all()
            .unwrap()
            .into_iter()
            .map(|log| log.id)
            .collect();
        assert_eq!(ids, vec![second, third]);
    }

    #[test]
    fn delete_is_idempotent() {
        let (store, _clock) = store_with_clock(4);
        let id = store.store(&completed("owner")).unwrap();

        store.delete(&id).unwrap();
        store.delete(&id).unwrap();
        store
            .delete(&SessionLogId::new("never-existed").unwrap())
            .unwrap();
        assert!(store.retrieve(&id).unwrap().is_none());
    }

    #[test]
    fn latest_unpushed_skips_pushed_logs() {
        let (store, clock) = store_with_clock(4);
        let older = store.store(&completed("older")).unwrap();
        clock.advance(Duration::minutes(1));
        let newer = store.store(&completed("newer")).unwrap();

        assert_eq!(store.latest_unpushed().unwrap().unwrap().id, newer);

        clock.advance(Duration::minutes(1));
        store.set_log_pushed(&newer).unwrap();
        assert_eq!(store.latest_unpushed().unwrap().unwrap().id, older);

        let pushed = store.retrieve(&newer).unwrap().unwrap();
        assert_eq!(pushed.time_pushed, Some(ts(63)));

        store.set_log_pushed(&older).unwrap();
        assert!(store.latest_unpushed().unwrap().is_none());
    }

    #[test]
    fn set_log_pushed_keeps_first_push_time() {
        let (store, clock) = store_with_clock(4);
        let id = store.store(&completed("owner")).unwrap();

        store.set_log_pushed(&id).unwrap();
        clock.advance(Duration::minutes(10));
        store.set_log_pushed(&id).unwrap();

        let log = store.retrieve(&id).unwrap().unwrap();
        assert_eq!(log.time_pushed, Some(ts(61)));
        store
            .set_log_pushed(&SessionLogId::new("missing").unwrap())
            .unwrap();
    }
}
