use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Configuration types shared across all Commandeer crates
pub mod config;

pub use config::{CommandeerConfig, ConfigError, CredentialsConfig, EngineConfig, HistoryConfig};

/// Severity scale shared by command risk classification and safety findings.
///
/// Ordering matters: gating decisions compare against a threshold
/// (e.g. "auto-approve anything at or below Medium").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// How a command came to be part of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CommandKind {
    /// Typed or loaded verbatim.
    Literal,
    /// Produced by rendering a template with variable bindings.
    Rendered { template: String },
    /// Generated by the rollback generator as the inverse of an applied command.
    GeneratedRollback,
}

/// One line of device-native instruction, classified before execution begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub text: String,
    pub kind: CommandKind,
    /// Risk classification assigned at plan-build time; never changed after.
    pub risk: Severity,
    /// Declared inverse command, either derived by negation or captured from
    /// the device's prior state. `None` means the command cannot be undone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
}

impl Command {
    pub fn is_reversible(&self) -> bool {
        self.inverse.is_some()
    }
}

/// Where a plan's commands came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum PlanSource {
    AdHoc,
    Template { name: String },
}

/// Options supplied when building a plan.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Preview only: validate and record findings without sending commands.
    pub dry_run: bool,
    /// Accept a plan containing non-reversible commands. Without this flag a
    /// plan with any non-reversible command is rejected before any device
    /// session starts.
    pub accept_non_reversible: bool,
    /// Optional command sent after the last plan command; its output is
    /// attached to the session for the operator to interpret.
    pub verify_command: Option<String>,
}

/// Ordered, validated command set for one logical change.
///
/// Immutable once execution starts: the engine takes it behind an `Arc` and
/// never writes to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPlan {
    pub plan_id: Uuid,
    pub commands: Vec<Command>,
    #[serde(flatten)]
    pub source: PlanSource,
    pub dry_run: bool,
    /// Recorded outcome of the upfront reversibility decision.
    pub accepted_non_reversible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_command: Option<String>,
}

impl CommandPlan {
    /// Build a plan, enforcing the upfront reversibility decision: a plan
    /// containing non-reversible commands must be explicitly accepted as
    /// such, otherwise it is rejected here — before any session starts.
    pub fn new(
        commands: Vec<Command>,
        source: PlanSource,
        options: PlanOptions,
    ) -> Result<Self, PlanError> {
        if commands.is_empty() {
            return Err(PlanError::Empty);
        }

        let irreversible: Vec<String> = commands
            .iter()
            .filter(|c| !c.is_reversible())
            .map(|c| c.text.clone())
            .collect();

        if !irreversible.is_empty() && !options.accept_non_reversible && !options.dry_run {
            return Err(PlanError::NotReversible {
                commands: irreversible,
            });
        }

        Ok(Self {
            plan_id: Uuid::new_v4(),
            commands,
            source,
            dry_run: options.dry_run,
            accepted_non_reversible: options.accept_non_reversible,
            verify_command: options.verify_command,
        })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// True when every command carries a declared inverse.
    pub fn is_reversible(&self) -> bool {
        self.commands.iter().all(Command::is_reversible)
    }

    /// Short human-readable label for prompts and events.
    pub fn describe(&self) -> String {
        match &self.source {
            PlanSource::AdHoc => format!("{} ad hoc command(s)", self.commands.len()),
            PlanSource::Template { name } => {
                format!("template '{}' ({} command(s))", name, self.commands.len())
            }
        }
    }
}

/// Errors raised while building a plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan contains no commands")]
    Empty,

    #[error(
        "plan contains {} non-reversible command(s) and was not accepted as non-reversible: {}",
        .commands.len(),
        .commands.join("; ")
    )]
    NotReversible { commands: Vec<String> },
}

/// Validator output for one command or command pair. Consumed for gating
/// only; never mutates the plan it describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyFinding {
    pub severity: Severity,
    /// Short snake_case discriminant, e.g. `risky_command`, `plan_conflict`.
    pub code: String,
    pub message: String,
    /// Zero-based indices of the offending command(s) within the plan, empty
    /// for plan-wide findings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<usize>,
}

impl SafetyFinding {
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            commands: Vec::new(),
        }
    }

    pub fn with_command(mut self, index: usize) -> Self {
        self.commands.push(index);
        self
    }

    pub fn with_commands(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.commands.extend(indices);
        self
    }
}

/// Highest severity present in a set of findings.
pub fn max_severity(findings: &[SafetyFinding]) -> Option<Severity> {
    findings.iter().map(|f| f.severity).max()
}

/// A managed endpoint, resolved once from the inventory at run start and
/// treated as read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique within a run.
    pub name: String,
    /// IP address or resolvable hostname.
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Device {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            model: None,
            site: None,
            role: None,
        }
    }

    /// Capability flags derived from the model string. The engine and
    /// validator consult flags only; model-specific logic stays here.
    pub fn capabilities(&self) -> DeviceCapabilities {
        match self.model.as_deref() {
            Some(model) => {
                let m = model.to_ascii_lowercase();
                // Base 2960 switches (non -X/-XR) lack stacking and advanced QoS.
                let basic_2960 = m.starts_with("2960") && !m.ends_with('x') && !m.ends_with("xr");
                DeviceCapabilities {
                    stacking: !basic_2960,
                    advanced_qos: !basic_2960,
                }
            }
            None => DeviceCapabilities::default(),
        }
    }
}

/// What a device model supports. Unknown models default to fully capable;
/// the validator only warns when a needed capability is known to be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub stacking: bool,
    pub advanced_qos: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            stacking: true,
            advanced_qos: true,
        }
    }
}

/// Opaque credentials passed through to the connector. The engine never
/// inspects these beyond handing them to `Connector::open`.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub enable_password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secrets, even at debug level.
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("enable_password", &self.enable_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reversible(text: &str) -> Command {
        Command {
            text: text.to_string(),
            kind: CommandKind::Literal,
            risk: Severity::Low,
            inverse: Some(format!("no {}", text)),
        }
    }

    fn irreversible(text: &str) -> Command {
        Command {
            text: text.to_string(),
            kind: CommandKind::Literal,
            risk: Severity::Medium,
            inverse: None,
        }
    }

    #[test]
    fn severity_ordering_supports_threshold_gating() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn plan_with_irreversible_command_is_rejected_by_default() {
        let err = CommandPlan::new(
            vec![reversible("vlan 10"), irreversible("description uplink")],
            PlanSource::AdHoc,
            PlanOptions::default(),
        )
        .unwrap_err();

        match err {
            PlanError::NotReversible { commands } => {
                assert_eq!(commands, vec!["description uplink".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn plan_with_irreversible_command_accepted_when_flagged() {
        let plan = CommandPlan::new(
            vec![irreversible("description uplink")],
            PlanSource::AdHoc,
            PlanOptions {
                accept_non_reversible: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(plan.accepted_non_reversible);
        assert!(!plan.is_reversible());
    }

    #[test]
    fn dry_run_plan_skips_reversibility_decision() {
        let plan = CommandPlan::new(
            vec![irreversible("reload")],
            PlanSource::AdHoc,
            PlanOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(plan.dry_run);
    }

    #[test]
    fn empty_plan_is_rejected() {
        let err = CommandPlan::new(vec![], PlanSource::AdHoc, PlanOptions::default()).unwrap_err();
        assert!(matches!(err, PlanError::Empty));
    }

    #[test]
    fn basic_2960_loses_stacking_and_qos() {
        let mut device = Device::new("sw1", "10.0.0.1");
        device.model = Some("2960".to_string());
        let caps = device.capabilities();
        assert!(!caps.stacking);
        assert!(!caps.advanced_qos);

        device.model = Some("2960X".to_string());
        let caps = device.capabilities();
        assert!(caps.stacking);
        assert!(caps.advanced_qos);
    }

    #[test]
    fn credentials_debug_redacts_secrets() {
        let creds = Credentials {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
            enable_password: Some("secret".to_string()),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("secret"));
    }
}
