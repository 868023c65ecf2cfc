//! Risky-command pattern tables, risk classification, and inverse derivation.

use commandeer_core::{Command, CommandKind, Severity};
use regex::Regex;
use std::sync::OnceLock;

pub(crate) struct RiskRule {
    pub pattern: Regex,
    pub severity: Severity,
    pub note: &'static str,
}

/// Compiled risky-command table, ordered Critical first so classification
/// picks the highest matching severity.
pub(crate) fn risk_rules() -> &'static [RiskRule] {
    static RULES: OnceLock<Vec<RiskRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let rule = |pattern: &str, severity, note| RiskRule {
            pattern: Regex::new(pattern).expect("static regex"),
            severity,
            note,
        };
        vec![
            // Critical: can cause outages or destroy state
            rule(r"^reload\s*$", Severity::Critical, "device reload will cause downtime"),
            rule(r"^shutdown\s*$", Severity::Critical, "interface shutdown will disconnect users"),
            rule(r"^erase\s+startup-config", Severity::Critical, "erasing startup config is irreversible"),
            rule(r"^write\s+erase", Severity::Critical, "write erase removes all configuration"),
            rule(r"^format\s+", Severity::Critical, "formatting storage will destroy data"),
            rule(r"^delete\s+flash:", Severity::Critical, "deleting files from flash"),
            // High: can cause significant issues
            rule(r"^no\s+vlan\s+\d+", Severity::High, "removing VLAN configuration"),
            rule(r"^no\s+ip\s+route", Severity::High, "removing IP routes"),
            rule(r"^no\s+spanning-tree", Severity::High, "disabling spanning-tree"),
            rule(
                r"^spanning-tree\s+portfast\s+bpduguard\s+default",
                Severity::High,
                "enabling BPDU guard globally",
            ),
            // Medium: should be reviewed
            rule(r"^vtp\s+mode\s+server", Severity::Medium, "changing VTP mode to server"),
            rule(r"^ip\s+routing\s*$", Severity::Medium, "enabling IP routing"),
            rule(r"^no\s+switchport", Severity::Medium, "converting switchport to routed port"),
            // Low: minor risk
            rule(r"^logging\s+", Severity::Low, "modifying logging configuration"),
            rule(r"^snmp-server\s+", Severity::Low, "modifying SNMP configuration"),
        ]
    })
}

/// Leading words of commands that belong in exec mode, not configuration.
pub(crate) const EXEC_ONLY: &[&str] = &[
    "show", "ping", "traceroute", "telnet", "ssh", "copy", "reload", "write", "erase", "delete",
    "format", "archive", "clear",
];

/// Risk classification for one command line. Unmatched commands are `Low`.
pub(crate) fn classify(text: &str) -> (Severity, Option<&'static str>) {
    let normalized = text.trim().to_lowercase();
    for rule in risk_rules() {
        if rule.pattern.is_match(&normalized) {
            return (rule.severity, Some(rule.note));
        }
    }
    (Severity::Low, None)
}

/// Derive a command-local inverse, if one exists.
///
/// Policy: `no X` restores by re-applying `X`; object-creating commands
/// (`interface`, `vlan`, `ip route`) invert by negation; a bare `shutdown`
/// inverts to `no shutdown`. Value-replacing commands have no derivable
/// inverse — the caller must capture the prior value itself.
pub fn derive_inverse(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let lowered = trimmed.to_lowercase();

    if lowered.is_empty() || lowered.starts_with('!') {
        return None;
    }

    if let Some(rest) = trimmed.strip_prefix("no ") {
        return Some(rest.trim().to_string());
    }

    if ["interface ", "vlan ", "ip route "]
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
    {
        return Some(format!("no {trimmed}"));
    }

    if lowered == "shutdown" {
        return Some("no shutdown".to_string());
    }

    None
}

/// Build a classified [`Command`] from raw text. Risk and inverse are fixed
/// here, before execution begins, and never change afterwards.
pub fn classify_command(text: impl Into<String>, kind: CommandKind) -> Command {
    let text = text.into();
    let (risk, _) = classify(&text);
    let inverse = derive_inverse(&text);
    Command {
        risk,
        inverse,
        text,
        kind,
    }
}

/// Classify a batch of command lines sharing one kind.
pub fn classify_commands(lines: &[String], kind: &CommandKind) -> Vec<Command> {
    lines
        .iter()
        .map(|line| classify_command(line.clone(), kind.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_and_shutdown_classify_as_critical() {
        assert_eq!(classify("reload").0, Severity::Critical);
        assert_eq!(classify("shutdown").0, Severity::Critical);
        assert_eq!(classify("  RELOAD  ").0, Severity::Critical);
    }

    #[test]
    fn vlan_removal_is_high_and_plain_config_is_low() {
        assert_eq!(classify("no vlan 10").0, Severity::High);
        assert_eq!(classify("vtp mode server").0, Severity::Medium);
        assert_eq!(classify("logging host 10.0.0.9").0, Severity::Low);
        assert_eq!(classify("description uplink").0, Severity::Low);
    }

    #[test]
    fn shutdown_inside_interface_is_exact_match_only() {
        // "no shutdown" must not classify as a shutdown.
        assert_eq!(classify("no shutdown").0, Severity::Low);
    }

    #[test]
    fn inverse_of_no_command_reapplies_it() {
        assert_eq!(derive_inverse("no ip routing"), Some("ip routing".to_string()));
        assert_eq!(derive_inverse("no shutdown"), Some("shutdown".to_string()));
    }

    #[test]
    fn object_creation_inverts_by_negation() {
        assert_eq!(derive_inverse("vlan 42"), Some("no vlan 42".to_string()));
        assert_eq!(
            derive_inverse("interface Vlan42"),
            Some("no interface Vlan42".to_string())
        );
        assert_eq!(
            derive_inverse("ip route 0.0.0.0 0.0.0.0 10.0.0.1"),
            Some("no ip route 0.0.0.0 0.0.0.0 10.0.0.1".to_string())
        );
    }

    #[test]
    fn value_replacing_commands_have_no_derived_inverse() {
        assert_eq!(derive_inverse("description uplink to core"), None);
        assert_eq!(derive_inverse("name DATA_VLAN"), None);
        assert_eq!(derive_inverse("! comment"), None);
    }

    #[test]
    fn classify_command_populates_risk_and_inverse() {
        let command = classify_command("vlan 10", CommandKind::Literal);
        assert_eq!(command.risk, Severity::Low);
        assert_eq!(command.inverse.as_deref(), Some("no vlan 10"));

        let command = classify_command("no vlan 10", CommandKind::Literal);
        assert_eq!(command.risk, Severity::High);
        assert_eq!(command.inverse.as_deref(), Some("vlan 10"));
    }
}
