//! SQLite storage for completed session logs.
//!
//! # Thread Safety
//!
//! `rusqlite::Connection` is `Send` but not `Sync`. [`SqliteSessionLogStore`]
//! keeps its connection behind a `Mutex` so it can be shared as an
//! `Arc<dyn SessionLogStore>`; every operation holds the lock for its duration.
//!
//! # Schema
//!
//! Two tables: `session` holds one row per log, `event` holds its join/leave
//! events keyed by `(session_id, count)` where `count` is the 1-based position
//! in the log. Events are always read back `ORDER BY count`.
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 with millisecond precision and a
//! `Z` suffix (e.g., `2024-05-01T03:00:00.000Z`), so lexicographic ordering
//! matches chronological ordering. Sub-millisecond precision is dropped.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rollcall_core::{
    ChannelId, Clock, CompletedSession, EventKind, GuildId, SessionEvent, SessionLog,
    SessionLogId, SessionLogStore, StoreError, UnknownEventKind, UserId, ValidationError,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp in log {log_id}: {timestamp}")]
    TimestampParse {
        log_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored event code is not one of the known kinds.
    #[error("invalid event code in log {log_id}")]
    EventCode {
        log_id: String,
        #[source]
        source: UnknownEventKind,
    },
    /// A stored identifier failed validation.
    #[error("invalid {field} in log {log_id}")]
    InvalidId {
        log_id: String,
        field: &'static str,
        #[source]
        source: ValidationError,
    },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Sqlite(_) => Self::backend(err),
            DbError::TimestampParse { ref log_id, .. }
            | DbError::EventCode { ref log_id, .. }
            | DbError::InvalidId { ref log_id, .. } => Self::Corrupt {
                id: log_id.clone(),
                message: error_chain(&err),
            },
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Session log store backed by a SQLite database.
///
/// See the [module documentation](self) for schema and thread safety.
pub struct SqliteSessionLogStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SqliteSessionLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionLogStore").finish_non_exhaustive()
    }
}

/// A `session` row before validation.
struct SessionRow {
    id: String,
    owner_id: String,
    guild_id: String,
    channel_id: String,
    time_started: String,
    time_ended: String,
    time_stored: String,
    time_pushed: Option<String>,
}

impl SessionRow {
    const COLUMNS: &'static str =
        "id, owner_id, guild_id, channel_id, time_started, time_ended, time_stored, time_pushed";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            guild_id: row.get(2)?,
            channel_id: row.get(3)?,
            time_started: row.get(4)?,
            time_ended: row.get(5)?,
            time_stored: row.get(6)?,
            time_pushed: row.get(7)?,
        })
    }
}

impl SqliteSessionLogStore {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The schema is initialized on first open.
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, clock)
    }

    /// Opens an in-memory database, destroyed when the store is dropped.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, DbError> {
        init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panicked holder leaves SQLite to roll back any open transaction.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_log(&self, session: &CompletedSession) -> Result<SessionLogId, DbError> {
        let id = SessionLogId::generate();
        let time_stored = self.clock.now();

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "
            INSERT INTO session (id, owner_id, guild_id, channel_id, time_started, time_ended, time_stored)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                id.as_str(),
                session.owner_id.as_str(),
                session.guild_id.as_str(),
                session.channel_id.as_str(),
                format_timestamp(session.time_started),
                format_timestamp(session.time_ended),
                format_timestamp(time_stored),
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO event (session_id, count, time_occurred, event_code, user_id)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )?;
            for (count, event) in (1_i64..).zip(&session.events) {
                stmt.execute(params![
                    id.as_str(),
                    count,
                    format_timestamp(event.time_occurred),
                    event.kind.code(),
                    event.user_id.as_str(),
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(log_id = %id, events = session.events.len(), "stored session log");
        Ok(id)
    }

    fn load_log(&self, id: &SessionLogId) -> Result<Option<SessionLog>, DbError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM session WHERE id = ?1", SessionRow::COLUMNS),
                params![id.as_str()],
                SessionRow::from_row,
            )
            .optional()?;
        row.map(|row| assemble(&conn, row)).transpose()
    }

    fn load_all(&self) -> Result<Vec<SessionLog>, DbError> {
        let conn = self.lock();
        let rows = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM session ORDER BY time_stored ASC, id ASC",
                SessionRow::COLUMNS
            ))?;
            let rows = stmt.query_map([], SessionRow::from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        rows.into_iter().map(|row| assemble(&conn, row)).collect()
    }

    fn load_latest_unpushed(&self) -> Result<Option<SessionLog>, DbError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!(
                    "
                    SELECT {} FROM session
                    WHERE time_pushed IS NULL
                    ORDER BY time_stored DESC, id DESC
                    LIMIT 1
                    ",
                    SessionRow::COLUMNS
                ),
                [],
                SessionRow::from_row,
            )
            .optional()?;
        row.map(|row| assemble(&conn, row)).transpose()
    }

    fn remove_log(&self, id: &SessionLogId) -> Result<(), DbError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM event WHERE session_id = ?1", params![id.as_str()])?;
        let removed = tx.execute("DELETE FROM session WHERE id = ?1", params![id.as_str()])?;
        tx.commit()?;
        if removed > 0 {
            tracing::debug!(log_id = %id, "deleted session log");
        }
        Ok(())
    }

    fn mark_pushed(&self, id: &SessionLogId) -> Result<(), DbError> {
        let now = format_timestamp(self.clock.now());
        let updated = self.lock().execute(
            "UPDATE session SET time_pushed = ?1 WHERE id = ?2 AND time_pushed IS NULL",
            params![now, id.as_str()],
        )?;
        if updated == 0 {
            tracing::debug!(log_id = %id, "log already pushed or missing; nothing marked");
        }
        Ok(())
    }
}

impl SessionLogStore for SqliteSessionLogStore {
    fn store(&self, session: &CompletedSession) -> Result<SessionLogId, StoreError> {
        Ok(self.insert_log(session)?)
    }

    fn retrieve(&self, id: &SessionLogId) -> Result<Option<SessionLog>, StoreError> {
        Ok(self.load_log(id)?)
    }

    fn retrieve_all(&self) -> Result<Vec<SessionLog>, StoreError> {
        Ok(self.load_all()?)
    }

    fn delete(&self, id: &SessionLogId) -> Result<(), StoreError> {
        Ok(self.remove_log(id)?)
    }

    fn latest_unpushed(&self) -> Result<Option<SessionLog>, StoreError> {
        Ok(self.load_latest_unpushed()?)
    }

    fn set_log_pushed(&self, id: &SessionLogId) -> Result<(), StoreError> {
        Ok(self.mark_pushed(id)?)
    }
}

/// Initializes the schema. Idempotent.
fn init(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS session (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            guild_id TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            time_started TEXT NOT NULL,
            time_ended TEXT NOT NULL,
            time_stored TEXT NOT NULL,
            time_pushed TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_session_stored ON session(time_stored);

        -- count: 1-based position of the event in its session log
        -- event_code: canonical kind code
        CREATE TABLE IF NOT EXISTS event (
            session_id TEXT NOT NULL,
            count INTEGER NOT NULL,
            time_occurred TEXT NOT NULL,
            event_code TEXT NOT NULL CHECK (event_code IN ('JOIN', 'LEAVE')),
            user_id TEXT NOT NULL,
            PRIMARY KEY (session_id, count),
            FOREIGN KEY (session_id) REFERENCES session(id) ON DELETE CASCADE
        );
        ",
    )?;
    Ok(())
}

fn assemble(conn: &Connection, row: SessionRow) -> Result<SessionLog, DbError> {
    let events = load_events(conn, &row.id)?;
    let log_id = row.id.as_str();

    let session = CompletedSession {
        owner_id: parse_id(UserId::new(row.owner_id), log_id, "owner_id")?,
        guild_id: parse_id(GuildId::new(row.guild_id), log_id, "guild_id")?,
        channel_id: parse_id(ChannelId::new(row.channel_id), log_id, "channel_id")?,
        time_started: parse_timestamp(&row.time_started, log_id)?,
        time_ended: parse_timestamp(&row.time_ended, log_id)?,
        events,
    };

    let mut log = SessionLog::new(
        parse_id(SessionLogId::new(log_id), log_id, "id")?,
        session,
        parse_timestamp(&row.time_stored, log_id)?,
    );
    log.time_pushed = row
        .time_pushed
        .as_deref()
        .map(|pushed| parse_timestamp(pushed, log_id))
        .transpose()?;
    Ok(log)
}

fn load_events(conn: &Connection, log_id: &str) -> Result<Vec<SessionEvent>, DbError> {
    let mut stmt = conn.prepare(
        "
        SELECT time_occurred, event_code, user_id
        FROM event
        WHERE session_id = ?1
        ORDER BY count ASC
        ",
    )?;
    let rows = stmt.query_map(params![log_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (time_occurred, code, user_id) = row?;
        let kind: EventKind = code.parse().map_err(|source| DbError::EventCode {
            log_id: log_id.to_string(),
            source,
        })?;
        events.push(SessionEvent {
            kind,
            user_id: parse_id(UserId::new(user_id), log_id, "user_id")?,
            time_occurred: parse_timestamp(&time_occurred, log_id)?,
        });
    }
    Ok(events)
}

fn parse_id<T>(
    parsed: Result<T, ValidationError>,
    log_id: &str,
    field: &'static str,
) -> Result<T, DbError> {
    parsed.map_err(|source| DbError::InvalidId {
        log_id: log_id.to_string(),
        field,
        source,
    })
}

fn parse_timestamp(timestamp: &str, log_id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            log_id: log_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
