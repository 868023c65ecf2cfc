//! End-to-end orchestrator scenarios against a scripted in-memory connector.

use async_trait::async_trait;
use commandeer_core::{
    CommandPlan, Credentials, Device, PlanOptions, PlanSource, Severity,
};
use commandeer_engine::{
    AutoApprove, ConfirmationGate, ConfirmationKind, ConfirmationRequest, Connector,
    ConnectorError, Decision, DeviceShell, EngineEvent, EventBus, MemorySink, Orchestrator,
    RetryPolicy, RollbackOutcome, RunOptions, RunStatus, SessionErrorKind, SessionState,
};
use commandeer_safety::{RulesValidator, classify_command};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum SendResult {
    Ok(&'static str),
    Transient(&'static str),
    Permanent(&'static str),
}

#[derive(Default)]
struct ConnectorInner {
    configs: Mutex<HashMap<String, String>>,
    fail_open: Mutex<HashSet<String>>,
    responses: Mutex<HashMap<(String, String), VecDeque<SendResult>>>,
    sends: Mutex<Vec<(String, String)>>,
    opens: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// In-memory connector whose per-device, per-command behavior is scripted by
/// each test. Unscripted sends succeed with empty output.
#[derive(Clone, Default)]
struct ScriptedConnector {
    inner: Arc<ConnectorInner>,
}

impl ScriptedConnector {
    fn new() -> Self {
        Self::default()
    }

    fn set_config(&self, device: &str, config: &str) {
        self.inner
            .configs
            .lock()
            .unwrap()
            .insert(device.to_string(), config.to_string());
    }

    fn fail_open(&self, device: &str) {
        self.inner
            .fail_open
            .lock()
            .unwrap()
            .insert(device.to_string());
    }

    fn script(&self, device: &str, command: &str, results: Vec<SendResult>) {
        self.inner
            .responses
            .lock()
            .unwrap()
            .insert((device.to_string(), command.to_string()), results.into());
    }

    fn sends_for(&self, device: &str) -> Vec<String> {
        self.inner
            .sends
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == device)
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn opens_for(&self, device: &str) -> usize {
        self.inner
            .opens
            .lock()
            .unwrap()
            .iter()
            .filter(|d| *d == device)
            .count()
    }

    fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(
        &self,
        device: &Device,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<Box<dyn DeviceShell>, ConnectorError> {
        if self.inner.fail_open.lock().unwrap().contains(&device.name) {
            return Err(ConnectorError::Connection {
                device: device.name.clone(),
                reason: "simulated connection refusal".to_string(),
            });
        }

        self.inner.opens.lock().unwrap().push(device.name.clone());
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(ScriptedShell {
            device: device.name.clone(),
            inner: Arc::clone(&self.inner),
            open: true,
        }))
    }
}

struct ScriptedShell {
    device: String,
    inner: Arc<ConnectorInner>,
    open: bool,
}

#[async_trait]
impl DeviceShell for ScriptedShell {
    async fn send(&mut self, command: &str, _timeout: Duration) -> Result<String, ConnectorError> {
        self.inner
            .sends
            .lock()
            .unwrap()
            .push((self.device.clone(), command.to_string()));

        let scripted = self
            .inner
            .responses
            .lock()
            .unwrap()
            .get_mut(&(self.device.clone(), command.to_string()))
            .and_then(VecDeque::pop_front);

        match scripted {
            None => Ok(String::new()),
            Some(SendResult::Ok(output)) => Ok(output.to_string()),
            Some(SendResult::Transient(reason)) => Err(ConnectorError::Command {
                device: self.device.clone(),
                reason: reason.to_string(),
                transient: true,
            }),
            Some(SendResult::Permanent(reason)) => Err(ConnectorError::Command {
                device: self.device.clone(),
                reason: reason.to_string(),
                transient: false,
            }),
        }
    }

    async fn running_config(&mut self, _timeout: Duration) -> Result<String, ConnectorError> {
        Ok(self
            .inner
            .configs
            .lock()
            .unwrap()
            .get(&self.device)
            .cloned()
            .unwrap_or_default())
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ScriptedShell {
    fn drop(&mut self) {
        if self.open {
            self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Gate that must never be consulted; dry runs prompt nobody.
struct PanicGate;

#[async_trait]
impl ConfirmationGate for PanicGate {
    async fn confirm(&self, request: ConfirmationRequest) -> Decision {
        panic!("gate consulted unexpectedly for {}", request.device.name);
    }
}

/// Denies the apply decision.
struct DenyApply;

#[async_trait]
impl ConfirmationGate for DenyApply {
    async fn confirm(&self, _request: ConfirmationRequest) -> Decision {
        Decision::Deny
    }
}

/// Approves applies, declines rollback offers.
struct DeclineRollback;

#[async_trait]
impl ConfirmationGate for DeclineRollback {
    async fn confirm(&self, request: ConfirmationRequest) -> Decision {
        match request.kind {
            ConfirmationKind::Apply => Decision::Approve,
            ConfirmationKind::Rollback => Decision::Deny,
        }
    }
}

fn plan(lines: &[&str], options: PlanOptions) -> CommandPlan {
    let commands = lines
        .iter()
        .map(|l| classify_command(*l, commandeer_core::CommandKind::Literal))
        .collect();
    CommandPlan::new(commands, PlanSource::AdHoc, options).unwrap()
}

fn reversible_plan(lines: &[&str]) -> CommandPlan {
    plan(lines, PlanOptions::default())
}

fn devices(names: &[&str]) -> Vec<Device> {
    names.iter().map(|n| Device::new(*n, "10.0.0.1")).collect()
}

fn credentials() -> Credentials {
    Credentials {
        username: "admin".to_string(),
        password: "test".to_string(),
        enable_password: None,
    }
}

fn options(concurrency: usize) -> RunOptions {
    RunOptions {
        concurrency,
        retry: RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(1),
        },
        connect_timeout: Duration::from_secs(5),
        command_timeout: Duration::from_secs(5),
    }
}

fn orchestrator(
    connector: &ScriptedConnector,
    gate: Arc<dyn ConfirmationGate>,
    concurrency: usize,
) -> (Orchestrator, Arc<MemorySink>) {
    let sink = MemorySink::new();
    let bus = EventBus::new(vec![sink.clone()]);
    let orchestrator = Orchestrator::new(
        Arc::new(connector.clone()),
        Arc::new(RulesValidator),
        gate,
        bus,
    )
    .with_options(options(concurrency));
    (orchestrator, sink)
}

#[tokio::test]
async fn partial_failure_rolls_back_and_aborts_the_queue() {
    let connector = ScriptedConnector::new();
    connector.script("d2", "interface Vlan10", vec![SendResult::Permanent("rejected")]);

    let (orchestrator, sink) = orchestrator(
        &connector,
        Arc::new(AutoApprove::up_to(Severity::Medium)),
        1,
    );

    let result = orchestrator
        .run(
            reversible_plan(&["vlan 10", "interface Vlan10"]),
            devices(&["d1", "d2", "d3"]),
            credentials(),
        )
        .await;

    assert_eq!(result.status, RunStatus::PartiallyRolledBack);

    let d1 = result.session("d1").unwrap();
    assert_eq!(d1.state, SessionState::Committed);
    assert_eq!(d1.applied.len(), 2);

    let d2 = result.session("d2").unwrap();
    assert_eq!(d2.state, SessionState::RolledBack);
    // Partial application is recorded precisely: only the first command landed.
    assert_eq!(d2.applied.len(), 1);
    assert!(matches!(d2.rollback_outcome, Some(RollbackOutcome::RolledBack)));
    assert_eq!(
        d2.error.as_ref().map(|e| e.kind),
        Some(SessionErrorKind::Command)
    );
    // The inverse was actually sent on the rollback connection.
    assert!(connector.sends_for("d2").contains(&"no vlan 10".to_string()));

    let d3 = result.session("d3").unwrap();
    assert_eq!(d3.state, SessionState::Aborted);
    assert_eq!(connector.opens_for("d3"), 0);
    assert!(connector.sends_for("d3").is_empty());

    // Once cancelled, no pending session ever left Pending except to Aborted.
    let d3_transitions: Vec<(SessionState, SessionState)> = sink
        .snapshot()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::SessionStateChanged { device, from, to, .. } if device == "d3" => {
                Some((from, to))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        d3_transitions,
        vec![(SessionState::Pending, SessionState::Aborted)]
    );
}

#[tokio::test]
async fn dry_run_records_findings_and_sends_nothing() {
    let connector = ScriptedConnector::new();
    connector.set_config("d1", "hostname d1\n");

    // High-risk command; the gate must never be consulted on a dry run.
    let (orchestrator, _sink) = orchestrator(&connector, Arc::new(PanicGate), 1);
    let result = orchestrator
        .run(
            plan(
                &["no ip route 10.0.0.0 255.0.0.0 10.1.1.1"],
                PlanOptions {
                    dry_run: true,
                    ..Default::default()
                },
            ),
            devices(&["d1"]),
            credentials(),
        )
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    let d1 = result.session("d1").unwrap();
    assert_eq!(d1.state, SessionState::Committed);
    assert!(d1.applied.is_empty());
    assert!(d1
        .findings
        .iter()
        .any(|f| f.severity == Severity::High && f.code == "risky_command"));
    assert!(connector.sends_for("d1").is_empty());
}

#[tokio::test]
async fn dry_run_commits_even_with_critical_findings() {
    let connector = ScriptedConnector::new();
    let (orchestrator, _sink) = orchestrator(&connector, Arc::new(PanicGate), 1);

    let result = orchestrator
        .run(
            plan(
                &["reload"],
                PlanOptions {
                    dry_run: true,
                    ..Default::default()
                },
            ),
            devices(&["d1"]),
            credentials(),
        )
        .await;

    let d1 = result.session("d1").unwrap();
    assert_eq!(d1.state, SessionState::Committed);
    assert!(d1
        .findings
        .iter()
        .any(|f| f.severity == Severity::Critical));
    assert!(connector.sends_for("d1").is_empty());
}

#[tokio::test]
async fn critical_finding_blocks_execution_with_empty_applied_log() {
    let connector = ScriptedConnector::new();
    let (orchestrator, _sink) = orchestrator(
        &connector,
        Arc::new(AutoApprove::up_to(Severity::Critical)),
        1,
    );

    let result = orchestrator
        .run(
            plan(
                &["reload"],
                PlanOptions {
                    accept_non_reversible: true,
                    ..Default::default()
                },
            ),
            devices(&["d1"]),
            credentials(),
        )
        .await;

    assert_eq!(result.status, RunStatus::Aborted);
    let d1 = result.session("d1").unwrap();
    assert_eq!(d1.state, SessionState::Failed);
    assert_eq!(
        d1.error.as_ref().map(|e| e.kind),
        Some(SessionErrorKind::ValidationBlocked)
    );
    assert!(d1.applied.is_empty());
    assert!(connector.sends_for("d1").is_empty());
}

#[tokio::test]
async fn transient_send_error_is_retried_within_budget() {
    let connector = ScriptedConnector::new();
    connector.script(
        "d1",
        "vlan 10",
        vec![SendResult::Transient("link flap"), SendResult::Ok("")],
    );

    let (orchestrator, _sink) = orchestrator(
        &connector,
        Arc::new(AutoApprove::up_to(Severity::Medium)),
        1,
    );
    let result = orchestrator
        .run(reversible_plan(&["vlan 10"]), devices(&["d1"]), credentials())
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    let d1 = result.session("d1").unwrap();
    assert_eq!(d1.state, SessionState::Committed);
    assert_eq!(d1.metrics.retries, 1);
    assert_eq!(connector.sends_for("d1"), vec!["vlan 10", "vlan 10"]);
}

#[tokio::test]
async fn connection_failure_is_not_retried_by_the_engine() {
    let connector = ScriptedConnector::new();
    connector.fail_open("d1");

    let (orchestrator, _sink) = orchestrator(
        &connector,
        Arc::new(AutoApprove::up_to(Severity::Medium)),
        1,
    );
    let result = orchestrator
        .run(reversible_plan(&["vlan 10"]), devices(&["d1"]), credentials())
        .await;

    assert_eq!(result.status, RunStatus::Aborted);
    let d1 = result.session("d1").unwrap();
    assert_eq!(d1.state, SessionState::Failed);
    assert_eq!(
        d1.error.as_ref().map(|e| e.kind),
        Some(SessionErrorKind::Connection)
    );
    assert_eq!(connector.opens_for("d1"), 0);
}

#[tokio::test]
async fn concurrency_bound_is_respected() {
    let connector = ScriptedConnector::new();
    let (orchestrator, _sink) = orchestrator(
        &connector,
        Arc::new(AutoApprove::up_to(Severity::Medium)),
        3,
    );

    let names: Vec<String> = (0..8).map(|i| format!("d{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let result = orchestrator
        .run(
            reversible_plan(&["vlan 10"]),
            devices(&name_refs),
            credentials(),
        )
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert!(
        connector.max_in_flight() <= 3,
        "in-flight sessions exceeded the bound: {}",
        connector.max_in_flight()
    );
}

#[tokio::test]
async fn denied_confirmation_aborts_without_sending() {
    let connector = ScriptedConnector::new();
    let (orchestrator, _sink) = orchestrator(&connector, Arc::new(DenyApply), 1);

    let result = orchestrator
        .run(reversible_plan(&["vlan 10"]), devices(&["d1"]), credentials())
        .await;

    assert_eq!(result.status, RunStatus::Aborted);
    let d1 = result.session("d1").unwrap();
    assert_eq!(d1.state, SessionState::Failed);
    assert_eq!(
        d1.error.as_ref().map(|e| e.kind),
        Some(SessionErrorKind::UserAborted)
    );
    assert!(d1.applied.is_empty());
    assert!(connector.sends_for("d1").is_empty());
}

#[tokio::test]
async fn declined_rollback_is_recorded_as_skipped() {
    let connector = ScriptedConnector::new();
    connector.script("d1", "vlan 20", vec![SendResult::Permanent("rejected")]);

    let (orchestrator, _sink) = orchestrator(&connector, Arc::new(DeclineRollback), 1);
    let result = orchestrator
        .run(
            reversible_plan(&["vlan 10", "vlan 20"]),
            devices(&["d1"]),
            credentials(),
        )
        .await;

    assert_eq!(result.status, RunStatus::Aborted);
    let d1 = result.session("d1").unwrap();
    assert_eq!(d1.state, SessionState::Failed);
    match &d1.rollback_outcome {
        Some(RollbackOutcome::Skipped { reason }) => assert!(reason.contains("declined")),
        other => panic!("expected skipped rollback, got {other:?}"),
    }
    // The inverse was never sent.
    assert!(!connector.sends_for("d1").contains(&"no vlan 10".to_string()));
}

#[tokio::test]
async fn non_reversible_applied_log_skips_rollback() {
    let connector = ScriptedConnector::new();
    connector.script("d1", "vlan 6", vec![SendResult::Permanent("rejected")]);

    let (orchestrator, _sink) = orchestrator(
        &connector,
        Arc::new(AutoApprove::up_to(Severity::Medium)),
        1,
    );
    let result = orchestrator
        .run(
            plan(
                &["vlan 5", "description uplink", "vlan 6"],
                PlanOptions {
                    accept_non_reversible: true,
                    ..Default::default()
                },
            ),
            devices(&["d1"]),
            credentials(),
        )
        .await;

    assert_eq!(result.status, RunStatus::Aborted);
    let d1 = result.session("d1").unwrap();
    assert_eq!(d1.state, SessionState::Failed);
    assert_eq!(d1.applied.len(), 2);
    match &d1.rollback_outcome {
        Some(RollbackOutcome::Skipped { reason }) => {
            assert!(reason.contains("non-reversible"));
        }
        other => panic!("expected skipped rollback, got {other:?}"),
    }
    // No rollback connection was opened: one open for the forward pass only.
    assert_eq!(connector.opens_for("d1"), 1);
}

#[tokio::test]
async fn verification_output_is_attached_and_failure_is_nonblocking() {
    let connector = ScriptedConnector::new();
    connector.script("d1", "show vlan brief", vec![SendResult::Ok("10 DATA active")]);
    connector.script("d2", "show vlan brief", vec![SendResult::Permanent("timed out")]);

    let (orchestrator, _sink) = orchestrator(
        &connector,
        Arc::new(AutoApprove::up_to(Severity::Medium)),
        1,
    );
    let result = orchestrator
        .run(
            plan(
                &["vlan 10"],
                PlanOptions {
                    verify_command: Some("show vlan brief".to_string()),
                    ..Default::default()
                },
            ),
            devices(&["d1", "d2"]),
            credentials(),
        )
        .await;

    assert_eq!(result.status, RunStatus::Completed);

    let d1 = result.session("d1").unwrap();
    assert_eq!(d1.state, SessionState::Committed);
    assert_eq!(d1.verification_output.as_deref(), Some("10 DATA active"));

    // Verification failure is a finding, never a session failure.
    let d2 = result.session("d2").unwrap();
    assert_eq!(d2.state, SessionState::Committed);
    assert!(d2.verification_output.is_none());
    assert!(d2.findings.iter().any(|f| f.code == "verification_failed"));
}

#[tokio::test]
async fn rollback_failure_is_terminal_and_halts_the_run() {
    let connector = ScriptedConnector::new();
    connector.script("d1", "vlan 20", vec![SendResult::Permanent("rejected")]);
    connector.script("d1", "no vlan 10", vec![SendResult::Permanent("refused")]);

    let (orchestrator, _sink) = orchestrator(
        &connector,
        Arc::new(AutoApprove::up_to(Severity::Medium)),
        1,
    );
    let result = orchestrator
        .run(
            reversible_plan(&["vlan 10", "vlan 20"]),
            devices(&["d1", "d2"]),
            credentials(),
        )
        .await;

    assert_eq!(result.status, RunStatus::PartiallyRolledBack);

    let d1 = result.session("d1").unwrap();
    assert_eq!(d1.state, SessionState::RollbackFailed);
    assert!(matches!(
        d1.rollback_outcome,
        Some(RollbackOutcome::Failed { .. })
    ));
    assert_eq!(
        d1.error.as_ref().map(|e| e.kind),
        Some(SessionErrorKind::RollbackFailed)
    );

    // d2 was queued behind d1 and never dispatched.
    let d2 = result.session("d2").unwrap();
    assert_eq!(d2.state, SessionState::Aborted);
    assert_eq!(connector.opens_for("d2"), 0);
}

#[tokio::test]
async fn successful_run_emits_an_ordered_event_stream() {
    let connector = ScriptedConnector::new();
    let (orchestrator, sink) = orchestrator(
        &connector,
        Arc::new(AutoApprove::up_to(Severity::Medium)),
        1,
    );

    let result = orchestrator
        .run(reversible_plan(&["vlan 10"]), devices(&["d1"]), credentials())
        .await;
    assert_eq!(result.status, RunStatus::Completed);

    let events = sink.snapshot();
    assert!(matches!(events.first(), Some(EngineEvent::RunStarted { .. })));
    assert!(matches!(events.last(), Some(EngineEvent::RunCompleted { .. })));

    let transitions: Vec<(SessionState, SessionState)> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::SessionStateChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (SessionState::Pending, SessionState::Connecting),
            (SessionState::Connecting, SessionState::Validating),
            (SessionState::Validating, SessionState::AwaitingConfirmation),
            (SessionState::AwaitingConfirmation, SessionState::Applying),
            (SessionState::Applying, SessionState::Verifying),
            (SessionState::Verifying, SessionState::Committed),
        ]
    );

    // Applied-log invariant: full application on commit.
    let d1 = result.session("d1").unwrap();
    assert_eq!(d1.applied.len(), 1);
    assert!(d1.metrics.connect_ms.is_some());
    assert!(d1.metrics.validate_ms.is_some());
    assert_eq!(d1.metrics.command_send_ms.len(), 1);
}
