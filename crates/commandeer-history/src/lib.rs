//! Run history: a durable record of engine events.
//!
//! The engine itself never writes to storage; this crate subscribes to the
//! event stream through the [`EventSink`](commandeer_engine::EventSink) seam
//! and appends one JSON line per event to a history file. The store side
//! loads that file back for querying, statistics and export.

mod entry;
mod error;
mod recorder;
mod store;

pub use entry::HistoryEntry;
pub use error::HistoryError;
pub use recorder::HistoryRecorder;
pub use store::{HistoryFilter, HistoryStats, HistoryStore};

/// File name of the history log inside the configured directory.
pub(crate) const HISTORY_FILE: &str = "history.jsonl";
