//! The engine's ordered lifecycle event stream.
//!
//! Events are the only channel by which history and presentation layers see
//! a run; the engine itself never writes to storage. Sinks are fanned out to
//! under a single lock so every sink observes the same order.

use chrono::{DateTime, Utc};
use commandeer_core::SafetyFinding;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::confirm::ConfirmationKind;
use crate::orchestrator::RunResult;
use crate::session::SessionState;

/// A lifecycle event emitted by the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum EngineEvent {
    RunStarted {
        run_id: Uuid,
        plan: String,
        devices: usize,
        timestamp: DateTime<Utc>,
    },
    SessionStateChanged {
        device: String,
        from: SessionState,
        to: SessionState,
        timestamp: DateTime<Utc>,
    },
    FindingsRecorded {
        device: String,
        findings: Vec<SafetyFinding>,
        timestamp: DateTime<Utc>,
    },
    ConfirmationResolved {
        device: String,
        kind: ConfirmationKind,
        approved: bool,
        timestamp: DateTime<Utc>,
    },
    CommandApplied {
        device: String,
        command: String,
        output: String,
        attempts: u32,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },
    RollbackPlanned {
        device: String,
        commands: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        result: RunResult,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Short discriminant for filtering and display.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::RunStarted { .. } => "run_started",
            EngineEvent::SessionStateChanged { .. } => "session_state_changed",
            EngineEvent::FindingsRecorded { .. } => "findings_recorded",
            EngineEvent::ConfirmationResolved { .. } => "confirmation_resolved",
            EngineEvent::CommandApplied { .. } => "command_applied",
            EngineEvent::RollbackPlanned { .. } => "rollback_planned",
            EngineEvent::RunCompleted { .. } => "run_completed",
        }
    }
}

/// Receives engine events. Implementations must be cheap and non-blocking;
/// they run inline on the emitting worker.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &EngineEvent);
}

/// Fans events out to sinks, serializing emission so the stream every sink
/// sees is identically ordered.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    sinks: Vec<Arc<dyn EventSink>>,
    order: Mutex<()>,
}

impl EventBus {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                sinks,
                order: Mutex::new(()),
            }),
        }
    }

    /// A bus with no sinks.
    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }

    pub fn emit(&self, event: EngineEvent) {
        let _order = self.inner.order.lock().unwrap_or_else(|e| e.into_inner());
        tracing::trace!(kind = event.kind(), "engine event");
        for sink in &self.inner.sinks {
            sink.record(&event);
        }
    }
}

/// Logs every event through `tracing`.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &EngineEvent) {
        match event {
            EngineEvent::SessionStateChanged { device, from, to, .. } => {
                tracing::info!(%device, %from, %to, "session state changed");
            }
            EngineEvent::CommandApplied { device, command, attempts, .. } => {
                tracing::info!(%device, %command, attempts, "command applied");
            }
            other => {
                tracing::info!(kind = other.kind(), "engine event");
            }
        }
    }
}

/// Captures events in memory; used by tests and preview reports.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn drain(&self) -> Vec<EngineEvent> {
        let mut guard = self.events.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *guard)
    }

    pub fn snapshot(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &EngineEvent) {
        let mut guard = self.events.lock().unwrap_or_else(|e| e.into_inner());
        guard.push(event.clone());
    }
}
