//! `vigil-journal` – The Access Journal.
//!
//! Keeps a local, SQLite-backed record of every access decision the client
//! surfaced, so an operator can review recent activity and daily totals even
//! while the verifier is unreachable.
//!
//! # Modules
//!
//! - [`access_log`] – [`AccessJournal`][access_log::AccessJournal]: persists
//!   [`AccessEvent`][access_log::AccessEvent] records and answers recent,
//!   filtered and daily-summary queries.

pub mod access_log;

pub use access_log::{AccessEvent, AccessJournal, AccessResult, DailySummary, EventFilter, JournalError};
