//! Per-device and run-level timing and outcome counters.
//!
//! Workers write [`DeviceMetrics`] on their own session; the run-level
//! aggregate is collected exactly once, after every session is terminal, and
//! never influences control flow.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::session::DeviceSession;

/// Timing and counters for one device session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceMetrics {
    /// Time to an established session, if one was attempted.
    pub connect_ms: Option<u64>,
    /// Time spent fetching the snapshot and validating.
    pub validate_ms: Option<u64>,
    /// Per-command send durations, in plan order, successful sends only.
    pub command_send_ms: Vec<u64>,
    /// Transient-error retries consumed across all sends.
    pub retries: u32,
    /// Total elapsed from dispatch to terminal state.
    pub total_ms: Option<u64>,
}

/// Aggregate counters for a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub devices: usize,
    /// Device count per final session state.
    pub by_state: BTreeMap<String, usize>,
    pub commands_applied: usize,
    pub retries: u32,
    pub rollback_occurred: bool,
    pub total_ms: u64,
}

impl RunMetrics {
    /// Collect the run summary from terminal session snapshots.
    pub fn collect(
        sessions: &[DeviceSession],
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let mut by_state: BTreeMap<String, usize> = BTreeMap::new();
        for session in sessions {
            *by_state.entry(session.state.to_string()).or_insert(0) += 1;
        }

        Self {
            devices: sessions.len(),
            by_state,
            commands_applied: sessions.iter().map(|s| s.applied.len()).sum(),
            retries: sessions.iter().map(|s| s.metrics.retries).sum(),
            rollback_occurred: sessions.iter().any(|s| s.rollback.is_some()),
            total_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use commandeer_core::Device;

    #[test]
    fn collect_counts_states_commands_and_retries() {
        let mut committed = DeviceSession::new(Device::new("a", "10.0.0.1"));
        committed.state = SessionState::Committed;
        committed.metrics.retries = 1;

        let mut failed = DeviceSession::new(Device::new("b", "10.0.0.2"));
        failed.state = SessionState::Failed;

        let started = Utc::now();
        let finished = started + chrono::Duration::milliseconds(1500);
        let metrics = RunMetrics::collect(&[committed, failed], started, finished);

        assert_eq!(metrics.devices, 2);
        assert_eq!(metrics.by_state.get("committed"), Some(&1));
        assert_eq!(metrics.by_state.get("failed"), Some(&1));
        assert_eq!(metrics.retries, 1);
        assert!(!metrics.rollback_occurred);
        assert_eq!(metrics.total_ms, 1500);
    }
}
