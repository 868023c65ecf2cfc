//! The run orchestrator: fans a plan out across devices under bounded
//! parallelism, enforces stop-on-failure, drives the rollback sweep, and
//! aggregates everything into a single [`RunResult`].

use chrono::{DateTime, Utc};
use commandeer_core::{Command, CommandPlan, Credentials, Device, EngineConfig};
use commandeer_safety::PlanValidator;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::confirm::{ConfirmationGate, ConfirmationKind, ConfirmationRequest, Decision};
use crate::connector::Connector;
use crate::error::{SessionError, SessionErrorKind};
use crate::events::{EngineEvent, EventBus};
use crate::metrics::RunMetrics;
use crate::retry::RetryPolicy;
use crate::rollback::RollbackOutcome;
use crate::session::{self, DeviceSession, SessionContext, SessionState};

/// Run-level cancellation shared across workers. `cancelled` stops further
/// dispatch and advancement; `halted` additionally stops the rollback sweep
/// after a rollback failure.
#[derive(Debug, Default)]
pub(crate) struct CancelFlag {
    cancelled: AtomicBool,
    halted: AtomicBool,
}

impl CancelFlag {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn halt(&self) {
        self.cancel();
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}

/// Tunables for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum simultaneous in-flight device sessions.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            retry: RetryPolicy::from_config(config),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }
}

/// Aggregate outcome of one orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every device committed.
    Completed,
    /// At least one device did not commit; nothing was rolled back.
    Aborted,
    /// At least one device entered a rollback cycle.
    PartiallyRolledBack,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Completed => "completed",
            RunStatus::Aborted => "aborted",
            RunStatus::PartiallyRolledBack => "partially_rolled_back",
        };
        f.write_str(s)
    }
}

/// The orchestrator's public result: produced exactly once, after every
/// session reached a terminal state, never an unhandled failure.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub sessions: Vec<DeviceSession>,
    pub metrics: RunMetrics,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn session(&self, device: &str) -> Option<&DeviceSession> {
        self.sessions.iter().find(|s| s.device.name == device)
    }
}

/// Drives one [`CommandPlan`] across a device set. Owns all device sessions
/// for the run and is the only writer of their state.
pub struct Orchestrator {
    connector: Arc<dyn Connector>,
    validator: Arc<dyn PlanValidator>,
    gate: Arc<dyn ConfirmationGate>,
    events: EventBus,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(
        connector: Arc<dyn Connector>,
        validator: Arc<dyn PlanValidator>,
        gate: Arc<dyn ConfirmationGate>,
        events: EventBus,
    ) -> Self {
        Self {
            connector,
            validator,
            gate,
            events,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Execute (or dry-run) a plan against the given devices.
    ///
    /// Devices are dispatched in the order supplied, up to the concurrency
    /// bound; queued devices fill freed capacity as sessions settle. The
    /// first failure cancels the run; cancelled-but-undispatched devices are
    /// marked `Aborted` without a single command sent.
    pub async fn run(
        &self,
        plan: CommandPlan,
        devices: Vec<Device>,
        credentials: Credentials,
    ) -> RunResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let plan = Arc::new(plan);

        // Device identifiers must be unique within a run.
        let mut seen = BTreeSet::new();
        let devices: Vec<Device> = devices
            .into_iter()
            .filter(|d| {
                let fresh = seen.insert(d.name.clone());
                if !fresh {
                    tracing::warn!(device = %d.name, "duplicate device dropped from run");
                }
                fresh
            })
            .collect();

        self.events.emit(EngineEvent::RunStarted {
            run_id,
            plan: plan.describe(),
            devices: devices.len(),
            timestamp: started_at,
        });

        let cancel = Arc::new(CancelFlag::default());
        let prompt_lock = Arc::new(tokio::sync::Mutex::new(()));
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));

        let mut handles = Vec::with_capacity(devices.len());
        for device in &devices {
            let device = device.clone();
            let plan = Arc::clone(&plan);
            let credentials = credentials.clone();
            let connector = Arc::clone(&self.connector);
            let validator = Arc::clone(&self.validator);
            let gate = Arc::clone(&self.gate);
            let events = self.events.clone();
            let cancel = Arc::clone(&cancel);
            let prompt_lock = Arc::clone(&prompt_lock);
            let retry = self.options.retry.clone();
            let connect_timeout = self.options.connect_timeout;
            let command_timeout = self.options.command_timeout;
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let mut session = DeviceSession::new(device);

                let Ok(_permit) = semaphore.acquire_owned().await else {
                    // The semaphore lives as long as the run; it is never closed.
                    session.abort(&events);
                    return session;
                };

                // Cancellation propagates to queued devices by simply never
                // dispatching them.
                if cancel.is_cancelled() {
                    session.abort(&events);
                    return session;
                }

                let ctx = SessionContext {
                    plan: &plan,
                    credentials: &credentials,
                    connector: connector.as_ref(),
                    validator: validator.as_ref(),
                    gate: gate.as_ref(),
                    prompt_lock: &prompt_lock,
                    events: &events,
                    cancel: &cancel,
                    retry: &retry,
                    connect_timeout,
                    command_timeout,
                };
                session::drive(&mut session, &ctx).await;

                // Stop-on-failure: the first failed session (user denial
                // included) cancels the run.
                if session.state.is_failure() && !cancel.is_cancelled() {
                    tracing::warn!(device = %session.device.name, "failure detected, cancelling run");
                    cancel.cancel();
                }

                session
            }));
        }

        let mut sessions = Vec::with_capacity(devices.len());
        for (handle, device) in handles.into_iter().zip(devices.iter()) {
            match handle.await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    // A worker panic must not take the run down with it.
                    tracing::error!(device = %device.name, error = %e, "worker task failed");
                    let mut session = DeviceSession::new(device.clone());
                    session.error = Some(SessionError::new(
                        SessionErrorKind::Cancelled,
                        format!("worker task failed: {e}"),
                    ));
                    session.state = SessionState::Aborted;
                    sessions.push(session);
                }
            }
        }

        self.rollback_sweep(&plan, &credentials, &cancel, &prompt_lock, &mut sessions)
            .await;

        let finished_at = Utc::now();
        let status = global_status(&sessions);
        let metrics = RunMetrics::collect(&sessions, started_at, finished_at);
        let result = RunResult {
            run_id,
            status,
            sessions,
            metrics,
            started_at,
            finished_at,
        };

        self.events.emit(EngineEvent::RunCompleted {
            result: result.clone(),
            timestamp: finished_at,
        });
        result
    }

    /// Offer rollback to every non-committed session that actually applied
    /// something. Declines and non-reversible logs are recorded as skips; a
    /// rollback failure halts the rest of the sweep.
    async fn rollback_sweep(
        &self,
        plan: &Arc<CommandPlan>,
        credentials: &Credentials,
        cancel: &Arc<CancelFlag>,
        prompt_lock: &Arc<tokio::sync::Mutex<()>>,
        sessions: &mut [DeviceSession],
    ) {
        for session in sessions.iter_mut() {
            if session.state == SessionState::Committed || session.applied.is_empty() {
                continue;
            }

            if cancel.is_halted() {
                session.rollback_outcome = Some(RollbackOutcome::Skipped {
                    reason: "run halted by an earlier rollback failure".to_string(),
                });
                continue;
            }

            if !session.applied.iter().all(Command::is_reversible) {
                tracing::warn!(
                    device = %session.device.name,
                    "rollback skipped: applied log contains non-reversible commands"
                );
                session.rollback_outcome = Some(RollbackOutcome::Skipped {
                    reason: "applied commands include non-reversible entries".to_string(),
                });
                continue;
            }

            // The admin may decline rollback for an individual device.
            let decision = {
                let _prompt = prompt_lock.lock().await;
                self.gate
                    .confirm(ConfirmationRequest {
                        kind: ConfirmationKind::Rollback,
                        device: session.device.clone(),
                        plan: plan.describe(),
                        commands: session
                            .applied
                            .iter()
                            .rev()
                            .filter_map(|c| c.inverse.clone())
                            .collect(),
                        findings: Vec::new(),
                    })
                    .await
            };
            self.events.emit(EngineEvent::ConfirmationResolved {
                device: session.device.name.clone(),
                kind: ConfirmationKind::Rollback,
                approved: decision == Decision::Approve,
                timestamp: Utc::now(),
            });

            if decision == Decision::Deny {
                session.rollback_outcome = Some(RollbackOutcome::Skipped {
                    reason: "declined at the confirmation gate".to_string(),
                });
                continue;
            }

            let ctx = SessionContext {
                plan,
                credentials,
                connector: self.connector.as_ref(),
                validator: self.validator.as_ref(),
                gate: self.gate.as_ref(),
                prompt_lock,
                events: &self.events,
                cancel,
                retry: &self.options.retry,
                connect_timeout: self.options.connect_timeout,
                command_timeout: self.options.command_timeout,
            };
            session::run_rollback(session, &ctx).await;

            if session.state == SessionState::RollbackFailed {
                cancel.halt();
            }
        }
    }
}

fn global_status(sessions: &[DeviceSession]) -> RunStatus {
    if sessions
        .iter()
        .all(|s| s.state == SessionState::Committed)
    {
        RunStatus::Completed
    } else if sessions.iter().any(|s| {
        matches!(
            s.state,
            SessionState::RolledBack | SessionState::RollbackFailed
        )
    }) {
        RunStatus::PartiallyRolledBack
    } else {
        RunStatus::Aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commandeer_core::Device;

    fn session_in(state: SessionState) -> DeviceSession {
        let mut session = DeviceSession::new(Device::new("sw", "10.0.0.1"));
        session.state = state;
        session
    }

    #[test]
    fn global_status_reflects_session_outcomes() {
        assert_eq!(
            global_status(&[session_in(SessionState::Committed)]),
            RunStatus::Completed
        );
        assert_eq!(
            global_status(&[
                session_in(SessionState::Committed),
                session_in(SessionState::Failed)
            ]),
            RunStatus::Aborted
        );
        assert_eq!(
            global_status(&[
                session_in(SessionState::Committed),
                session_in(SessionState::RolledBack),
                session_in(SessionState::Aborted)
            ]),
            RunStatus::PartiallyRolledBack
        );
        assert_eq!(
            global_status(&[session_in(SessionState::RollbackFailed)]),
            RunStatus::PartiallyRolledBack
        );
    }

    #[test]
    fn halt_implies_cancel() {
        let flag = CancelFlag::default();
        assert!(!flag.is_cancelled());
        flag.halt();
        assert!(flag.is_cancelled());
        assert!(flag.is_halted());
    }

    #[test]
    fn run_options_come_from_engine_config() {
        let config = EngineConfig {
            concurrency: 3,
            max_retries: 1,
            backoff_ms: 100,
            connect_timeout_secs: 5,
            command_timeout_secs: 7,
        };
        let options = RunOptions::from_config(&config);
        assert_eq!(options.concurrency, 3);
        assert_eq!(options.retry.max_retries, 1);
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
        assert_eq!(options.command_timeout, Duration::from_secs(7));
    }
}
