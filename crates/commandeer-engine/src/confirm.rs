//! The confirmation gate: an explicit suspension point with a typed
//! request/response pair, decoupled from any particular interactive surface.
//! A non-interactive decision policy is a drop-in substitute.

use async_trait::async_trait;
use commandeer_core::{Device, SafetyFinding, Severity, max_severity};
use serde::Serialize;

/// What the gate is being asked to approve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationKind {
    /// Apply the plan's commands to the device.
    Apply,
    /// Send the generated inverse sequence to undo applied commands.
    Rollback,
}

/// A confirmation request for one device. The run blocks (one prompt at a
/// time) until the gate answers.
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub kind: ConfirmationKind,
    pub device: Device,
    /// Short plan description for rendering.
    pub plan: String,
    /// The commands that would be sent if approved.
    pub commands: Vec<String>,
    /// Findings recorded during validation, highest severity first.
    pub findings: Vec<SafetyFinding>,
}

/// The gate's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Deny,
}

/// Resolves confirmation requests. Interactive callers prompt a human;
/// non-interactive callers install a pre-bound policy such as
/// [`AutoApprove`].
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, request: ConfirmationRequest) -> Decision;
}

/// Pre-bound decision policy: approve an apply when no finding exceeds the
/// configured severity, and always approve rollback (undoing a partial
/// application is safer than leaving it).
#[derive(Debug, Clone, Copy)]
pub struct AutoApprove {
    pub max_severity: Severity,
}

impl AutoApprove {
    pub fn up_to(max_severity: Severity) -> Self {
        Self { max_severity }
    }
}

#[async_trait]
impl ConfirmationGate for AutoApprove {
    async fn confirm(&self, request: ConfirmationRequest) -> Decision {
        match request.kind {
            ConfirmationKind::Rollback => Decision::Approve,
            ConfirmationKind::Apply => {
                let worst = max_severity(&request.findings);
                if worst.is_none_or(|w| w <= self.max_severity) {
                    Decision::Approve
                } else {
                    tracing::info!(
                        device = %request.device.name,
                        worst = %worst.map(|w| w.to_string()).unwrap_or_default(),
                        "auto-approve policy denied plan"
                    );
                    Decision::Deny
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commandeer_core::SafetyFinding;

    fn request(findings: Vec<SafetyFinding>, kind: ConfirmationKind) -> ConfirmationRequest {
        ConfirmationRequest {
            kind,
            device: Device::new("sw1", "10.0.0.1"),
            plan: "2 ad hoc command(s)".to_string(),
            commands: vec!["vlan 10".to_string()],
            findings,
        }
    }

    #[tokio::test]
    async fn approves_when_findings_do_not_exceed_threshold() {
        let gate = AutoApprove::up_to(Severity::Medium);
        let findings = vec![SafetyFinding::new(Severity::Medium, "risky_command", "vtp")];
        assert_eq!(
            gate.confirm(request(findings, ConfirmationKind::Apply)).await,
            Decision::Approve
        );
    }

    #[tokio::test]
    async fn denies_when_a_finding_exceeds_threshold() {
        let gate = AutoApprove::up_to(Severity::Medium);
        let findings = vec![SafetyFinding::new(Severity::High, "risky_command", "no vlan 10")];
        assert_eq!(
            gate.confirm(request(findings, ConfirmationKind::Apply)).await,
            Decision::Deny
        );
    }

    #[tokio::test]
    async fn rollback_is_always_approved() {
        let gate = AutoApprove::up_to(Severity::Low);
        let findings = vec![SafetyFinding::new(Severity::Critical, "risky_command", "reload")];
        assert_eq!(
            gate.confirm(request(findings, ConfirmationKind::Rollback)).await,
            Decision::Approve
        );
    }
}
