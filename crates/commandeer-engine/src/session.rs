//! Per-device session state machine.
//!
//! One `DeviceSession` tracks one device's progress through a plan:
//! `Pending → Connecting → Validating → AwaitingConfirmation → Applying →
//! Verifying → Committed`, with failure exits to `Failed` (or `Aborted` when
//! nothing was sent), and a single conditional rollback cycle
//! `Failed → RollingBack → RolledBack | RollbackFailed`.
//!
//! Sessions are exclusively owned by the worker driving them; the
//! orchestrator is the only component that hands them out and collects them
//! back, so no per-session locking exists.

use chrono::{DateTime, Utc};
use commandeer_core::{Command, CommandPlan, Credentials, Device, SafetyFinding, Severity};
use commandeer_safety::PlanValidator;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::confirm::{ConfirmationGate, ConfirmationKind, ConfirmationRequest, Decision};
use crate::connector::{Connector, ConnectorError, DeviceShell};
use crate::error::SessionError;
use crate::events::{EngineEvent, EventBus};
use crate::metrics::DeviceMetrics;
use crate::orchestrator::CancelFlag;
use crate::retry::RetryPolicy;
use crate::rollback::{RollbackOutcome, RollbackPlan};

/// The states a device session moves through. Transitions are monotonic
/// except for the single rollback cycle out of `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Connecting,
    Validating,
    AwaitingConfirmation,
    Applying,
    Verifying,
    Committed,
    Failed,
    /// Cancelled before anything was sent; a sub-state of failure.
    Aborted,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

impl SessionState {
    /// Terminal for dispatch accounting. A `Failed` session may still enter
    /// one rollback cycle during the sweep, which ends in another terminal
    /// state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Committed
                | SessionState::Failed
                | SessionState::Aborted
                | SessionState::RolledBack
                | SessionState::RollbackFailed
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SessionState::Failed | SessionState::Aborted | SessionState::RollbackFailed
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Pending => "pending",
            SessionState::Connecting => "connecting",
            SessionState::Validating => "validating",
            SessionState::AwaitingConfirmation => "awaiting_confirmation",
            SessionState::Applying => "applying",
            SessionState::Verifying => "verifying",
            SessionState::Committed => "committed",
            SessionState::Failed => "failed",
            SessionState::Aborted => "aborted",
            SessionState::RollingBack => "rolling_back",
            SessionState::RolledBack => "rolled_back",
            SessionState::RollbackFailed => "rollback_failed",
        };
        f.write_str(s)
    }
}

/// Execution of one plan against one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSession {
    pub device: Device,
    pub state: SessionState,
    /// Findings recorded during validation (plus any verification finding).
    pub findings: Vec<SafetyFinding>,
    /// Exactly the commands that were successfully sent, in order. This log
    /// is what the rollback generator consumes.
    pub applied: Vec<Command>,
    /// Generated inverse plan, present once a rollback cycle started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackPlan>,
    /// How rollback concluded, when it was considered at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_outcome: Option<RollbackOutcome>,
    /// Raw output of the plan's verification command, for the operator to
    /// interpret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
    pub metrics: DeviceMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl DeviceSession {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            state: SessionState::Pending,
            findings: Vec::new(),
            applied: Vec::new(),
            rollback: None,
            rollback_outcome: None,
            verification_output: None,
            error: None,
            metrics: DeviceMetrics::default(),
            started_at: None,
            finished_at: None,
        }
    }

    pub(crate) fn transition(&mut self, to: SessionState, events: &EventBus) {
        let from = self.state;
        self.state = to;
        events.emit(EngineEvent::SessionStateChanged {
            device: self.device.name.clone(),
            from,
            to,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn fail(&mut self, error: SessionError, events: &EventBus) {
        tracing::warn!(device = %self.device.name, kind = ?error.kind, %error, "session failed");
        self.error = Some(error);
        self.transition(SessionState::Failed, events);
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn abort(&mut self, events: &EventBus) {
        self.error = Some(SessionError::cancelled());
        self.transition(SessionState::Aborted, events);
        self.finished_at = Some(Utc::now());
    }
}

/// Everything a worker needs to drive one session. Borrowed from the
/// orchestrator for the duration of the run.
pub(crate) struct SessionContext<'a> {
    pub plan: &'a CommandPlan,
    pub credentials: &'a Credentials,
    pub connector: &'a dyn Connector,
    pub validator: &'a dyn PlanValidator,
    pub gate: &'a dyn ConfirmationGate,
    /// Serializes confirmation prompts run-wide.
    pub prompt_lock: &'a tokio::sync::Mutex<()>,
    pub events: &'a EventBus,
    pub cancel: &'a CancelFlag,
    pub retry: &'a RetryPolicy,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

/// Drive a session from `Pending` to a terminal state (rollback excluded;
/// the orchestrator's sweep handles that separately).
pub(crate) async fn drive(session: &mut DeviceSession, ctx: &SessionContext<'_>) {
    session.started_at = Some(Utc::now());
    let overall = Instant::now();

    drive_inner(session, ctx).await;

    session.metrics.total_ms = Some(elapsed_ms(overall));
    if session.finished_at.is_none() {
        session.finished_at = Some(Utc::now());
    }
}

async fn drive_inner(session: &mut DeviceSession, ctx: &SessionContext<'_>) {
    if ctx.cancel.is_cancelled() {
        session.abort(ctx.events);
        return;
    }
    session.transition(SessionState::Connecting, ctx.events);

    let connect_started = Instant::now();
    let mut shell = match ctx
        .connector
        .open(&session.device, ctx.credentials, ctx.connect_timeout)
        .await
    {
        Ok(shell) => shell,
        Err(e) => {
            session.fail(SessionError::connection(&e), ctx.events);
            return;
        }
    };
    session.metrics.connect_ms = Some(elapsed_ms(connect_started));

    if ctx.cancel.is_cancelled() {
        shell.close().await;
        session.abort(ctx.events);
        return;
    }
    session.transition(SessionState::Validating, ctx.events);

    let validate_started = Instant::now();
    let snapshot = match shell.running_config(ctx.command_timeout).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            shell.close().await;
            session.fail(SessionError::from_connector(&e), ctx.events);
            return;
        }
    };
    session.findings = ctx
        .validator
        .validate(ctx.plan, &session.device, Some(&snapshot));
    session.metrics.validate_ms = Some(elapsed_ms(validate_started));
    ctx.events.emit(EngineEvent::FindingsRecorded {
        device: session.device.name.clone(),
        findings: session.findings.clone(),
        timestamp: Utc::now(),
    });

    if ctx.plan.dry_run {
        // Findings are recorded and nothing is sent on a dry run, whatever
        // their severity.
        shell.close().await;
        session.transition(SessionState::Committed, ctx.events);
        return;
    }

    let critical = session
        .findings
        .iter()
        .filter(|f| f.severity == Severity::Critical)
        .count();
    if critical > 0 {
        shell.close().await;
        session.fail(SessionError::validation_blocked(critical), ctx.events);
        return;
    }

    if ctx.cancel.is_cancelled() {
        shell.close().await;
        session.abort(ctx.events);
        return;
    }
    session.transition(SessionState::AwaitingConfirmation, ctx.events);

    let decision = {
        // One prompt at a time across the whole run, even though sessions
        // are otherwise parallel.
        let _prompt = ctx.prompt_lock.lock().await;
        ctx.gate
            .confirm(ConfirmationRequest {
                kind: ConfirmationKind::Apply,
                device: session.device.clone(),
                plan: ctx.plan.describe(),
                commands: ctx.plan.commands.iter().map(|c| c.text.clone()).collect(),
                findings: session.findings.clone(),
            })
            .await
    };
    ctx.events.emit(EngineEvent::ConfirmationResolved {
        device: session.device.name.clone(),
        kind: ConfirmationKind::Apply,
        approved: decision == Decision::Approve,
        timestamp: Utc::now(),
    });

    if decision == Decision::Deny {
        shell.close().await;
        session.fail(SessionError::user_aborted(), ctx.events);
        return;
    }

    if ctx.cancel.is_cancelled() {
        shell.close().await;
        session.abort(ctx.events);
        return;
    }
    session.transition(SessionState::Applying, ctx.events);

    for command in &ctx.plan.commands {
        // Cooperative cancellation: checked between sends, never mid-send.
        if ctx.cancel.is_cancelled() {
            shell.close().await;
            if session.applied.is_empty() {
                session.abort(ctx.events);
            } else {
                session.fail(SessionError::cancelled(), ctx.events);
            }
            return;
        }

        match send_with_retry(shell.as_mut(), &session.device.name, command, ctx).await {
            Ok(send) => {
                session.applied.push(command.clone());
                session.metrics.command_send_ms.push(send.elapsed_ms);
                session.metrics.retries += send.attempts - 1;
                ctx.events.emit(EngineEvent::CommandApplied {
                    device: session.device.name.clone(),
                    command: command.text.clone(),
                    output: send.output,
                    attempts: send.attempts,
                    elapsed_ms: send.elapsed_ms,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                shell.close().await;
                session.fail(SessionError::command(&e), ctx.events);
                return;
            }
        }
    }

    session.transition(SessionState::Verifying, ctx.events);
    if let Some(verify) = &ctx.plan.verify_command {
        // Output is attached for the operator to interpret; a failure here
        // is a finding, never a session failure.
        match shell.send(verify, ctx.command_timeout).await {
            Ok(output) => session.verification_output = Some(output),
            Err(e) => session.findings.push(SafetyFinding::new(
                Severity::Low,
                "verification_failed",
                format!("verification command failed: {e}"),
            )),
        }
    }

    shell.close().await;
    session.transition(SessionState::Committed, ctx.events);
}

struct SendOutcome {
    output: String,
    attempts: u32,
    elapsed_ms: u64,
}

/// Send one command, retrying transient failures within the injected budget
/// with linear backoff.
async fn send_with_retry(
    shell: &mut dyn DeviceShell,
    device: &str,
    command: &Command,
    ctx: &SessionContext<'_>,
) -> Result<SendOutcome, ConnectorError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let started = Instant::now();
        match shell.send(&command.text, ctx.command_timeout).await {
            Ok(output) => {
                return Ok(SendOutcome {
                    output,
                    attempts,
                    elapsed_ms: elapsed_ms(started),
                });
            }
            Err(e) if e.is_transient() && ctx.retry.allows_retry(attempts) => {
                tracing::warn!(
                    device,
                    command = %command.text,
                    attempts,
                    error = %e,
                    "transient send failure, retrying"
                );
                tokio::time::sleep(ctx.retry.delay_before(attempts)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run the rollback cycle for a failed session with a fully reversible
/// applied log. Inverse sends are never retried; the first failure is
/// terminal as `RollbackFailed`.
pub(crate) async fn run_rollback(session: &mut DeviceSession, ctx: &SessionContext<'_>) {
    let plan = match RollbackPlan::from_applied(&session.applied) {
        Ok(plan) => plan,
        Err(e) => {
            // The orchestrator checks reversibility before offering rollback,
            // so this is a skip, not a failure.
            session.rollback_outcome = Some(RollbackOutcome::Skipped {
                reason: e.to_string(),
            });
            return;
        }
    };

    session.transition(SessionState::RollingBack, ctx.events);
    ctx.events.emit(EngineEvent::RollbackPlanned {
        device: session.device.name.clone(),
        commands: plan.commands.iter().map(|c| c.text.clone()).collect(),
        timestamp: Utc::now(),
    });
    let commands = plan.commands.clone();
    session.rollback = Some(plan);

    let mut shell = match ctx
        .connector
        .open(&session.device, ctx.credentials, ctx.connect_timeout)
        .await
    {
        Ok(shell) => shell,
        Err(e) => {
            rollback_failed(session, format!("reconnect failed: {e}"), ctx.events);
            return;
        }
    };

    for command in &commands {
        if let Err(e) = shell.send(&command.text, ctx.command_timeout).await {
            shell.close().await;
            rollback_failed(session, e.to_string(), ctx.events);
            return;
        }
    }

    shell.close().await;
    session.rollback_outcome = Some(RollbackOutcome::RolledBack);
    session.transition(SessionState::RolledBack, ctx.events);
    session.finished_at = Some(Utc::now());
}

fn rollback_failed(session: &mut DeviceSession, message: String, events: &EventBus) {
    tracing::error!(device = %session.device.name, %message, "rollback failed");
    session.rollback_outcome = Some(RollbackOutcome::Failed {
        message: message.clone(),
    });
    session.error = Some(SessionError::rollback_failed(message));
    session.transition(SessionState::RollbackFailed, events);
    session.finished_at = Some(Utc::now());
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
