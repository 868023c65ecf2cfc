//! Command risk classification and pre-flight validation.
//!
//! Everything in this crate is a pure function of its inputs: given a command
//! plan, a target device and (optionally) that device's running configuration
//! snapshot, it produces [`SafetyFinding`]s. It never executes anything and
//! never mutates the plan — findings are consumed by the engine for gating
//! only.
//!
//! Validation covers three perimeters:
//!
//! 1. **Command rules** - risky-pattern classification and syntax checks
//! 2. **Plan coherence** - conflicts and duplicates within one plan
//! 3. **Device fit** - capability flags and the live configuration snapshot

use commandeer_core::{CommandPlan, Device, SafetyFinding};

mod rules;
mod validator;

pub use rules::{classify_command, classify_commands, derive_inverse};
pub use validator::validate_plan;

/// Validator seam consumed by the execution engine.
pub trait PlanValidator: Send + Sync {
    fn validate(
        &self,
        plan: &CommandPlan,
        device: &Device,
        running_config: Option<&str>,
    ) -> Vec<SafetyFinding>;
}

/// The default rule-based validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesValidator;

impl PlanValidator for RulesValidator {
    fn validate(
        &self,
        plan: &CommandPlan,
        device: &Device,
        running_config: Option<&str>,
    ) -> Vec<SafetyFinding> {
        validate_plan(plan, device, running_config)
    }
}

/// A validator that reports nothing. Useful in tests and as an explicit
/// bypass for plans vetted elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveValidator;

impl PlanValidator for PermissiveValidator {
    fn validate(&self, _: &CommandPlan, _: &Device, _: Option<&str>) -> Vec<SafetyFinding> {
        Vec::new()
    }
}
