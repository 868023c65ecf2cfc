//! The history recorder: an engine event sink that appends JSON lines.

use commandeer_core::HistoryConfig;
use commandeer_engine::{EngineEvent, EventSink};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

use crate::HISTORY_FILE;
use crate::entry::HistoryEntry;
use crate::error::HistoryError;

/// Appends one history entry per engine event. Recording failures are
/// logged and swallowed: history must never fail a run.
pub struct HistoryRecorder {
    path: PathBuf,
    file: Option<Mutex<File>>,
    /// The run currently in flight, stamped onto per-device entries.
    current_run: Mutex<Option<Uuid>>,
}

impl HistoryRecorder {
    /// Create a recorder for the configured directory. A disabled config
    /// yields a no-op recorder.
    pub fn new(config: &HistoryConfig) -> Result<Self, HistoryError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        fs::create_dir_all(&config.directory).map_err(|e| HistoryError::InitializationFailed {
            path: config.directory.clone(),
            source: e,
        })?;

        let path = config.directory.join(HISTORY_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| HistoryError::InitializationFailed {
                path: path.clone(),
                source: e,
            })?;

        Ok(Self {
            path,
            file: Some(Mutex::new(file)),
            current_run: Mutex::new(None),
        })
    }

    /// A recorder that drops everything.
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            file: None,
            current_run: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }
}

impl EventSink for HistoryRecorder {
    fn record(&self, event: &EngineEvent) {
        let Some(file) = &self.file else {
            return;
        };

        let run_id = {
            let mut current = self.current_run.lock().unwrap_or_else(|e| e.into_inner());
            match event {
                EngineEvent::RunStarted { run_id, .. } => {
                    *current = Some(*run_id);
                    Some(*run_id)
                }
                EngineEvent::RunCompleted { result, .. } => {
                    current.take();
                    Some(result.run_id)
                }
                _ => *current,
            }
        };

        let line = HistoryEntry::from_event(event, run_id)
            .and_then(|entry| serde_json::to_string(&entry));

        match line {
            Ok(line) => {
                let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
                if let Err(e) = writeln!(file, "{line}") {
                    tracing::error!(path = %self.path.display(), error = %e, "failed to append history entry");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize history entry");
            }
        }
    }
}
