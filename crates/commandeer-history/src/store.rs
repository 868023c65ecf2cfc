//! Read side of the history file: loading, filtering, statistics, export.

use commandeer_core::HistoryConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::HISTORY_FILE;
use crate::entry::HistoryEntry;
use crate::error::HistoryError;

/// Filter for querying history entries. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub run_id: Option<Uuid>,
    pub device: Option<String>,
    pub kind: Option<String>,
    /// Keep only the most recent N matches.
    pub limit: Option<usize>,
}

/// Aggregate statistics over the recorded history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub total_entries: usize,
    pub by_kind: BTreeMap<String, usize>,
    /// Devices that appear anywhere in the history, sorted.
    pub devices: Vec<String>,
    pub runs: usize,
    pub commands_applied: usize,
    /// Sessions that ended in a failure state.
    pub failures: usize,
}

/// Queries a history file written by the recorder.
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn open(config: &HistoryConfig) -> Self {
        Self {
            path: config.directory.join(HISTORY_FILE),
        }
    }

    /// Load every entry. Malformed lines are skipped with a warning so a
    /// torn write cannot make the whole history unreadable.
    pub fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| HistoryError::Io {
            path: self.path.clone(),
            source: e,
        })?;

        let mut entries = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = line_no + 1,
                        error = %e,
                        "skipping malformed history line"
                    );
                }
            }
        }
        Ok(entries)
    }

    /// Entries matching a filter, oldest first.
    pub fn query(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut entries: Vec<HistoryEntry> = self
            .load()?
            .into_iter()
            .filter(|e| {
                filter.run_id.is_none_or(|id| e.run_id == Some(id))
                    && filter
                        .device
                        .as_deref()
                        .is_none_or(|d| e.device.as_deref() == Some(d))
                    && filter.kind.as_deref().is_none_or(|k| e.kind == k)
            })
            .collect();

        if let Some(limit) = filter.limit {
            if entries.len() > limit {
                entries.drain(..entries.len() - limit);
            }
        }
        Ok(entries)
    }

    /// Aggregate statistics over the whole history.
    pub fn stats(&self) -> Result<HistoryStats, HistoryError> {
        let entries = self.load()?;

        let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
        let mut devices = Vec::new();
        let mut runs = 0;
        let mut commands_applied = 0;
        let mut failures = 0;

        for entry in &entries {
            *by_kind.entry(entry.kind.clone()).or_insert(0) += 1;

            if let Some(device) = &entry.device {
                devices.push(device.clone());
            }

            match entry.kind.as_str() {
                "run_started" => runs += 1,
                "command_applied" => commands_applied += 1,
                "session_state_changed" => {
                    let to = entry.detail.get("to").and_then(|v| v.as_str());
                    if matches!(to, Some("failed" | "aborted" | "rollback_failed")) {
                        failures += 1;
                    }
                }
                _ => {}
            }
        }

        devices.sort();
        devices.dedup();

        Ok(HistoryStats {
            total_entries: entries.len(),
            by_kind,
            devices,
            runs,
            commands_applied,
            failures,
        })
    }

    /// Export matching entries as a JSON array. Returns the entry count.
    pub fn export(&self, filter: &HistoryFilter, path: &Path) -> Result<usize, HistoryError> {
        let entries = self.query(filter)?;
        let json = serde_json::to_string_pretty(&entries)?;
        fs::write(path, json).map_err(|e| HistoryError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(entries.len())
    }

    /// Remove the history file. Returns the number of entries discarded.
    pub fn clear(&self) -> Result<usize, HistoryError> {
        let count = self.load()?.len();
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| HistoryError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::HistoryRecorder;
    use chrono::Utc;
    use commandeer_engine::{EngineEvent, EventSink, SessionState};

    fn config(dir: &Path) -> HistoryConfig {
        HistoryConfig {
            enabled: true,
            directory: dir.to_path_buf(),
        }
    }

    fn state_change(device: &str, to: SessionState) -> EngineEvent {
        EngineEvent::SessionStateChanged {
            device: device.to_string(),
            from: SessionState::Pending,
            to,
            timestamp: Utc::now(),
        }
    }

    fn applied(device: &str, command: &str) -> EngineEvent {
        EngineEvent::CommandApplied {
            device: device.to_string(),
            command: command.to_string(),
            output: String::new(),
            attempts: 1,
            elapsed_ms: 1,
            timestamp: Utc::now(),
        }
    }

    fn populate(dir: &Path) -> (HistoryStore, Uuid) {
        let recorder = HistoryRecorder::new(&config(dir)).unwrap();
        let run_id = Uuid::new_v4();

        recorder.record(&EngineEvent::RunStarted {
            run_id,
            plan: "2 ad hoc command(s)".to_string(),
            devices: 2,
            timestamp: Utc::now(),
        });
        recorder.record(&state_change("sw1", SessionState::Connecting));
        recorder.record(&applied("sw1", "vlan 10"));
        recorder.record(&applied("sw2", "vlan 10"));
        recorder.record(&state_change("sw2", SessionState::Failed));

        (HistoryStore::open(&config(dir)), run_id)
    }

    #[test]
    fn run_id_is_stamped_onto_per_device_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (store, run_id) = populate(dir.path());

        let entries = store.load().unwrap();
        assert_eq!(entries.len(), 5);
        assert!(entries.iter().all(|e| e.run_id == Some(run_id)));
    }

    #[test]
    fn query_filters_by_device_kind_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = populate(dir.path());

        let sw1 = store
            .query(&HistoryFilter {
                device: Some("sw1".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(sw1.len(), 2);

        let applied = store
            .query(&HistoryFilter {
                kind: Some("command_applied".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(applied.len(), 2);

        let last_two = store
            .query(&HistoryFilter {
                limit: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[1].kind, "session_state_changed");
    }

    #[test]
    fn stats_count_runs_commands_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = populate(dir.path());

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_entries, 5);
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.commands_applied, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.devices, vec!["sw1".to_string(), "sw2".to_string()]);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = populate(dir.path());

        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(HISTORY_FILE))
            .unwrap();
        writeln!(file, "not json at all").unwrap();

        assert_eq!(store.load().unwrap().len(), 5);
    }

    #[test]
    fn clear_removes_the_file_and_reports_the_count() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = populate(dir.path());

        assert_eq!(store.clear().unwrap(), 5);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(&config(dir.path()));
        assert!(store.load().unwrap().is_empty());
    }
}
