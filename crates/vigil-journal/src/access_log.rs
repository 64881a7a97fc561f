//! Access event journal.
//!
//! # Storage layout
//!
//! A single table `access_events` is created (if it does not already exist):
//!
//! | column    | type | description                                        |
//! |-----------|------|----------------------------------------------------|
//! | id        | TEXT | UUID v4 primary key                                |
//! | timestamp | TEXT | RFC-3339 UTC time, microsecond precision, `Z` form |
//! | result    | TEXT | `A` granted, `D` denied, `R` retry, `I` intrusion  |
//! | subject   | TEXT | Recognised person, if any                          |
//! | zone      | TEXT | Zone the decision applied to, if known             |
//! | note      | TEXT | Reason or free-text detail                         |
//!
//! The fixed timestamp format sorts lexically, so range and ordering queries
//! run directly on the text column.
//!
//! # Example
//!
//! ```rust
//! use vigil_journal::{AccessEvent, AccessJournal, AccessResult, EventFilter};
//!
//! let journal = AccessJournal::open_in_memory().unwrap();
//! journal
//!     .record(&AccessEvent::new(AccessResult::Granted, Some("Ana Ruiz".into()), Some("4".into()), "ok"))
//!     .unwrap();
//!
//! let granted = journal.filter(EventFilter::Granted, 10).unwrap();
//! assert_eq!(granted.len(), 1);
//! ```

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;
use vigil_types::VigilError;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from journal operations.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt journal row: {0}")]
    Corrupt(String),
}

impl From<JournalError> for VigilError {
    fn from(e: JournalError) -> Self {
        VigilError::Journal(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome category stored with each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessResult {
    Granted,
    Denied,
    Retry,
    Intrusion,
}

impl AccessResult {
    /// Single-letter storage code.
    pub fn code(&self) -> &'static str {
        match self {
            AccessResult::Granted => "A",
            AccessResult::Denied => "D",
            AccessResult::Retry => "R",
            AccessResult::Intrusion => "I",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(AccessResult::Granted),
            "D" => Some(AccessResult::Denied),
            "R" => Some(AccessResult::Retry),
            "I" => Some(AccessResult::Intrusion),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccessResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessResult::Granted => write!(f, "granted"),
            AccessResult::Denied => write!(f, "denied"),
            AccessResult::Retry => write!(f, "retry"),
            AccessResult::Intrusion => write!(f, "intrusion"),
        }
    }
}

/// A single journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub result: AccessResult,
    pub subject: Option<String>,
    pub zone: Option<String>,
    pub note: String,
}

impl AccessEvent {
    /// Construct an event with a fresh UUID and the current UTC time.
    pub fn new(
        result: AccessResult,
        subject: Option<String>,
        zone: Option<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            result,
            subject,
            zone,
            note: note.into(),
        }
    }

    /// Override the timestamp (used when importing or in tests).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Selection for [`AccessJournal::filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Granted,
    Denied,
}

/// Per-day totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub total: u64,
    pub granted: u64,
    pub denied: u64,
    pub intrusions: u64,
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ─────────────────────────────────────────────────────────────────────────────
// AccessJournal
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed access journal.
pub struct AccessJournal {
    conn: Connection,
}

impl AccessJournal {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, JournalError> {
        let conn = Connection::open(path)?;
        let journal = Self { conn };
        journal.init_schema()?;
        debug!(path, "access journal opened");
        Ok(journal)
    }

    /// Open a temporary in-memory database.
    pub fn open_in_memory() -> Result<Self, JournalError> {
        let conn = Connection::open_in_memory()?;
        let journal = Self { conn };
        journal.init_schema()?;
        Ok(journal)
    }

    fn init_schema(&self) -> Result<(), JournalError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS access_events (
                id        TEXT NOT NULL PRIMARY KEY,
                timestamp TEXT NOT NULL,
                result    TEXT NOT NULL,
                subject   TEXT,
                zone      TEXT,
                note      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS access_events_timestamp
                ON access_events (timestamp);",
        )?;
        Ok(())
    }

    /// Persist an [`AccessEvent`].
    pub fn record(&self, event: &AccessEvent) -> Result<(), JournalError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO access_events
                 (id, timestamp, result, subject, zone, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id.to_string(),
                format_ts(&event.timestamp),
                event.result.code(),
                event.subject,
                event.zone,
                event.note,
            ],
        )?;
        Ok(())
    }

    /// The `limit` most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AccessEvent>, JournalError> {
        self.filter(EventFilter::All, limit)
    }

    /// The `limit` most recent events matching `filter`, newest first.
    pub fn filter(&self, filter: EventFilter, limit: usize) -> Result<Vec<AccessEvent>, JournalError> {
        let code = match filter {
            EventFilter::All => None,
            EventFilter::Granted => Some(AccessResult::Granted.code()),
            EventFilter::Denied => Some(AccessResult::Denied.code()),
        };
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, result, subject, zone, note
             FROM access_events
             WHERE (?1 IS NULL OR result = ?1)
             ORDER BY timestamp DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![code, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id_str, ts_str, code, subject, zone, note) = row?;
            let id = Uuid::parse_str(&id_str)
                .map_err(|e| JournalError::Corrupt(format!("id {id_str}: {e}")))?;
            let timestamp = ts_str
                .parse::<DateTime<Utc>>()
                .map_err(|e| JournalError::Corrupt(format!("timestamp {ts_str}: {e}")))?;
            let result = AccessResult::from_code(&code)
                .ok_or_else(|| JournalError::Corrupt(format!("result code {code}")))?;
            events.push(AccessEvent {
                id,
                timestamp,
                result,
                subject,
                zone,
                note,
            });
        }
        Ok(events)
    }

    /// Totals for the UTC calendar day `date`.
    pub fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary, JournalError> {
        let start = date.and_hms_opt(0, 0, 0).map(|t| t.and_utc()).ok_or_else(|| {
            JournalError::Corrupt(format!("invalid date {date}"))
        })?;
        let end = start + Duration::days(1);
        let mut stmt = self.conn.prepare(
            "SELECT result, COUNT(*)
             FROM access_events
             WHERE timestamp >= ?1 AND timestamp < ?2
             GROUP BY result",
        )?;
        let rows = stmt.query_map(params![format_ts(&start), format_ts(&end)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut summary = DailySummary::default();
        for row in rows {
            let (code, count) = row?;
            let count = count.max(0) as u64;
            summary.total += count;
            match AccessResult::from_code(&code) {
                Some(AccessResult::Granted) => summary.granted += count,
                Some(AccessResult::Denied) => summary.denied += count,
                Some(AccessResult::Intrusion) => summary.intrusions += count,
                Some(AccessResult::Retry) | None => {}
            }
        }
        Ok(summary)
    }
}
