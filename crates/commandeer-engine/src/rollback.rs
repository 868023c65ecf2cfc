//! Rollback plan generation.
//!
//! A pure function of the applied-command log: each applied command's
//! declared inverse, emitted in reverse application order so ordered
//! dependent changes unwind correctly (remove the VLAN binding before the
//! VLAN itself).

use commandeer_core::{Command, CommandKind};
use serde::Serialize;
use thiserror::Error;

/// The inverse command sequence for one device's applied changes. Owned by
/// the device session that generated it.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackPlan {
    /// Inverse commands, in the order they must be sent.
    pub commands: Vec<Command>,
    /// For each inverse command, the index of the applied-log entry it was
    /// generated from.
    pub sources: Vec<usize>,
}

impl RollbackPlan {
    /// Generate the inverse sequence for an applied-command log.
    ///
    /// Only constructible when every entry is reversible; the orchestrator
    /// checks this before offering rollback, so an error here means the
    /// applied log was corrupted.
    pub fn from_applied(applied: &[Command]) -> Result<Self, RollbackError> {
        if applied.is_empty() {
            return Err(RollbackError::Empty);
        }

        let mut commands = Vec::with_capacity(applied.len());
        let mut sources = Vec::with_capacity(applied.len());

        for (index, command) in applied.iter().enumerate().rev() {
            let inverse = command
                .inverse
                .clone()
                .ok_or_else(|| RollbackError::NotReversible(command.text.clone()))?;

            commands.push(Command {
                text: inverse,
                kind: CommandKind::GeneratedRollback,
                risk: command.risk,
                // The inverse of the inverse is the command itself.
                inverse: Some(command.text.clone()),
            });
            sources.push(index);
        }

        Ok(Self { commands, sources })
    }
}

/// How a session's rollback concluded. Always reported explicitly, never
/// silently dropped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RollbackOutcome {
    /// Every inverse command was sent successfully.
    RolledBack,
    /// An inverse command send failed; the device is in a mixed state.
    Failed { message: String },
    /// Rollback was not attempted.
    Skipped { reason: String },
}

/// Errors raised while generating a rollback plan.
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("applied-command log is empty; nothing to roll back")]
    Empty,

    #[error("applied command '{0}' has no declared inverse")]
    NotReversible(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use commandeer_core::Severity;

    fn applied(text: &str, inverse: Option<&str>) -> Command {
        Command {
            text: text.to_string(),
            kind: CommandKind::Literal,
            risk: Severity::Low,
            inverse: inverse.map(str::to_string),
        }
    }

    #[test]
    fn inverses_are_emitted_in_reverse_application_order() {
        let log = vec![
            applied("vlan 10", Some("no vlan 10")),
            applied("interface Vlan10", Some("no interface Vlan10")),
        ];

        let plan = RollbackPlan::from_applied(&log).unwrap();
        let texts: Vec<&str> = plan.commands.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["no interface Vlan10", "no vlan 10"]);
        assert_eq!(plan.sources, vec![1, 0]);
        assert!(plan
            .commands
            .iter()
            .all(|c| c.kind == CommandKind::GeneratedRollback));
    }

    #[test]
    fn rollback_of_a_rollback_restores_the_forward_sequence() {
        let log = vec![
            applied("vlan 10", Some("no vlan 10")),
            applied("interface Vlan10", Some("no interface Vlan10")),
        ];

        let rollback = RollbackPlan::from_applied(&log).unwrap();
        let restore = RollbackPlan::from_applied(&rollback.commands).unwrap();
        let texts: Vec<&str> = restore.commands.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["vlan 10", "interface Vlan10"]);
    }

    #[test]
    fn non_reversible_entry_fails_generation() {
        let log = vec![
            applied("vlan 10", Some("no vlan 10")),
            applied("description uplink", None),
        ];

        let err = RollbackPlan::from_applied(&log).unwrap_err();
        assert!(matches!(err, RollbackError::NotReversible(ref text) if text == "description uplink"));
    }

    #[test]
    fn empty_log_fails_generation() {
        assert!(matches!(
            RollbackPlan::from_applied(&[]),
            Err(RollbackError::Empty)
        ));
    }
}
