//! One history record per engine event.

use chrono::{DateTime, Utc};
use commandeer_engine::EngineEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Command output longer than this is truncated before it is persisted.
const MAX_OUTPUT_LEN: usize = 500;

/// A single flattened history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    /// Event discriminant, e.g. `session_state_changed`.
    pub kind: String,
    /// The run this entry belongs to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// The device the entry concerns, for per-device events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Full event payload.
    pub detail: serde_json::Value,
}

impl HistoryEntry {
    /// Flatten an engine event, stamping it with the current run id.
    pub fn from_event(event: &EngineEvent, run_id: Option<Uuid>) -> Result<Self, serde_json::Error> {
        let mut detail = serde_json::to_value(event)?;

        // Long command output is useful live, not in the archive.
        if let Some(output) = detail.get_mut("output").and_then(|v| v.as_str().map(String::from)) {
            if output.len() > MAX_OUTPUT_LEN {
                let truncated: String = output.chars().take(MAX_OUTPUT_LEN).collect();
                detail["output"] = serde_json::Value::String(truncated);
            }
        }

        let (timestamp, device) = match event {
            EngineEvent::RunStarted { timestamp, .. } => (*timestamp, None),
            EngineEvent::SessionStateChanged { device, timestamp, .. }
            | EngineEvent::FindingsRecorded { device, timestamp, .. }
            | EngineEvent::ConfirmationResolved { device, timestamp, .. }
            | EngineEvent::CommandApplied { device, timestamp, .. }
            | EngineEvent::RollbackPlanned { device, timestamp, .. } => {
                (*timestamp, Some(device.clone()))
            }
            EngineEvent::RunCompleted { timestamp, .. } => (*timestamp, None),
        };

        Ok(Self {
            timestamp,
            kind: event.kind().to_string(),
            run_id,
            device,
            detail,
        })
    }
}
