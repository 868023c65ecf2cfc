//! Plan validation against command rules, plan coherence, and the device's
//! live configuration snapshot.

use crate::rules::{self, EXEC_ONLY};
use commandeer_core::{CommandPlan, Device, SafetyFinding, Severity};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

fn interface_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^interface\s+(\S+)").expect("static regex"))
}

fn vlan_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^vlan\s+(\d+)").expect("static regex"))
}

fn mgmt_interface_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)interface.*(management|mgmt|vlan\s*1)\b").expect("static regex"))
}

fn hashed_secret_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$[1589]\$").expect("static regex"))
}

/// Validate a plan for one target device.
///
/// `running_config` is the device's current configuration snapshot, fetched
/// by the engine via the connector; `None` skips snapshot-dependent checks
/// (offline validation). Returns findings ordered by command position; the
/// plan itself is never touched.
pub fn validate_plan(
    plan: &CommandPlan,
    device: &Device,
    running_config: Option<&str>,
) -> Vec<SafetyFinding> {
    let mut findings = Vec::new();

    check_syntax(plan, &mut findings);
    check_risky_commands(plan, &mut findings);
    check_plan_conflicts(plan, &mut findings);
    check_capabilities(plan, device, &mut findings);
    check_credentials(plan, &mut findings);
    check_bulk_changes(plan, &mut findings);

    if let Some(config) = running_config {
        check_against_running_config(plan, config, &mut findings);
    }

    tracing::debug!(
        device = %device.name,
        findings = findings.len(),
        "validated plan"
    );
    findings
}

fn check_syntax(plan: &CommandPlan, findings: &mut Vec<SafetyFinding>) {
    for (i, command) in plan.commands.iter().enumerate() {
        let text = command.text.trim();
        if text.is_empty() || text.starts_with('!') {
            continue;
        }

        if text.ends_with(',') {
            findings.push(
                SafetyFinding::new(
                    Severity::Critical,
                    "incomplete_command",
                    format!("incomplete command: '{text}'"),
                )
                .with_command(i),
            );
        }

        if command.text.starts_with(' ') {
            findings.push(
                SafetyFinding::new(
                    Severity::Low,
                    "leading_whitespace",
                    format!("command starts with whitespace: '{}'", command.text),
                )
                .with_command(i),
            );
        }

        if let Some(first_word) = text.split_whitespace().next() {
            if EXEC_ONLY.contains(&first_word.to_lowercase().as_str()) {
                findings.push(
                    SafetyFinding::new(
                        Severity::Low,
                        "exec_command",
                        format!("'{first_word}' is typically an exec command, not configuration"),
                    )
                    .with_command(i),
                );
            }
        }
    }
}

fn check_risky_commands(plan: &CommandPlan, findings: &mut Vec<SafetyFinding>) {
    for (i, command) in plan.commands.iter().enumerate() {
        if command.risk > Severity::Low {
            let (_, note) = rules::classify(&command.text);
            let reason = note.unwrap_or("risky command");
            findings.push(
                SafetyFinding::new(
                    command.risk,
                    "risky_command",
                    format!("{reason}: '{}'", command.text.trim()),
                )
                .with_command(i),
            );
        }

        if mgmt_interface_re().is_match(&command.text) {
            findings.push(
                SafetyFinding::new(
                    Severity::High,
                    "management_interface",
                    format!("modifying management interface: '{}'", command.text.trim()),
                )
                .with_command(i),
            );
        }
    }
}

fn check_plan_conflicts(plan: &CommandPlan, findings: &mut Vec<SafetyFinding>) {
    let mut interfaces: BTreeMap<String, usize> = BTreeMap::new();
    let mut vlans: BTreeMap<String, usize> = BTreeMap::new();
    let mut switchport_modes: BTreeMap<String, usize> = BTreeMap::new();

    for (i, command) in plan.commands.iter().enumerate() {
        let text = command.text.trim();

        if let Some(caps) = interface_re().captures(text) {
            let name = caps[1].to_lowercase();
            if let Some(&first) = interfaces.get(&name) {
                findings.push(
                    SafetyFinding::new(
                        Severity::Medium,
                        "plan_conflict",
                        format!("interface {name} configured multiple times"),
                    )
                    .with_commands([first, i]),
                );
            } else {
                interfaces.insert(name, i);
            }
        }

        if let Some(caps) = vlan_re().captures(text) {
            let id = caps[1].to_string();
            if let Some(&first) = vlans.get(&id) {
                findings.push(
                    SafetyFinding::new(
                        Severity::Medium,
                        "plan_conflict",
                        format!("VLAN {id} configured multiple times"),
                    )
                    .with_commands([first, i]),
                );
            } else {
                vlans.insert(id, i);
            }
        }

        if text.to_lowercase().contains("switchport mode") {
            if let Some(context) = interface_context(plan, i) {
                if let Some(&first) = switchport_modes.get(&context) {
                    findings.push(
                        SafetyFinding::new(
                            Severity::Medium,
                            "plan_conflict",
                            format!("multiple switchport modes for {context}"),
                        )
                        .with_commands([first, i]),
                    );
                } else {
                    switchport_modes.insert(context, i);
                }
            }
        }
    }
}

/// The interface stanza a command at `index` belongs to, if any.
fn interface_context(plan: &CommandPlan, index: usize) -> Option<String> {
    plan.commands[..=index]
        .iter()
        .rev()
        .find_map(|c| interface_re().captures(c.text.trim()))
        .map(|caps| caps[1].to_lowercase())
}

fn check_capabilities(plan: &CommandPlan, device: &Device, findings: &mut Vec<SafetyFinding>) {
    let caps = device.capabilities();
    let model = device.model.as_deref().unwrap_or("unknown");

    for (i, command) in plan.commands.iter().enumerate() {
        let lowered = command.text.to_lowercase();

        if !caps.stacking && lowered.contains("stack") {
            findings.push(
                SafetyFinding::new(
                    Severity::Medium,
                    "capability",
                    format!("stack commands may not be supported on {model}"),
                )
                .with_command(i),
            );
        }

        if !caps.advanced_qos
            && ["class-map", "policy-map", "service-policy"]
                .iter()
                .any(|term| lowered.contains(term))
        {
            findings.push(
                SafetyFinding::new(
                    Severity::Low,
                    "capability",
                    format!("advanced QoS features may be limited on {model}"),
                )
                .with_command(i),
            );
        }
    }
}

fn check_credentials(plan: &CommandPlan, findings: &mut Vec<SafetyFinding>) {
    for (i, command) in plan.commands.iter().enumerate() {
        let lowered = command.text.to_lowercase();
        let mentions_secret = ["password", "secret", "key"]
            .iter()
            .any(|kw| lowered.contains(kw));

        if mentions_secret && !hashed_secret_re().is_match(&command.text) {
            findings.push(
                SafetyFinding::new(
                    Severity::High,
                    "plaintext_credential",
                    format!("plaintext credential detected: '{}'", command.text.trim()),
                )
                .with_command(i),
            );
        }
    }
}

fn check_bulk_changes(plan: &CommandPlan, findings: &mut Vec<SafetyFinding>) {
    let interface_count = plan
        .commands
        .iter()
        .filter(|c| interface_re().is_match(c.text.trim()))
        .count();
    if interface_count > 20 {
        findings.push(SafetyFinding::new(
            Severity::Medium,
            "bulk_interface_config",
            format!("configuring {interface_count} interfaces in one plan"),
        ));
    }

    let vlan_count = plan
        .commands
        .iter()
        .filter(|c| vlan_re().is_match(c.text.trim()))
        .count();
    if vlan_count > 10 {
        findings.push(SafetyFinding::new(
            Severity::Medium,
            "bulk_vlan_config",
            format!("creating or modifying {vlan_count} VLANs in one plan"),
        ));
    }
}

fn check_against_running_config(
    plan: &CommandPlan,
    running_config: &str,
    findings: &mut Vec<SafetyFinding>,
) {
    let mut existing_lines = BTreeSet::new();
    let mut existing_interfaces = BTreeSet::new();
    let mut existing_vlans = BTreeSet::new();

    for line in running_config.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        existing_lines.insert(line.to_lowercase());
        if let Some(caps) = interface_re().captures(line) {
            existing_interfaces.insert(caps[1].to_lowercase());
        }
        if let Some(caps) = vlan_re().captures(line) {
            existing_vlans.insert(caps[1].to_string());
        }
    }

    for (i, command) in plan.commands.iter().enumerate() {
        let text = command.text.trim();
        if text.is_empty() || text.starts_with('!') {
            continue;
        }

        if existing_lines.contains(&text.to_lowercase()) {
            findings.push(
                SafetyFinding::new(
                    Severity::Low,
                    "duplicate_command",
                    format!("command already present in running config: '{text}'"),
                )
                .with_command(i),
            );
        }

        if let Some(caps) = interface_re().captures(text) {
            if existing_interfaces.contains(&caps[1].to_lowercase()) {
                findings.push(
                    SafetyFinding::new(
                        Severity::Low,
                        "existing_object",
                        format!("modifying existing interface: {}", &caps[1]),
                    )
                    .with_command(i),
                );
            }
        }

        if let Some(caps) = vlan_re().captures(text) {
            if existing_vlans.contains(&caps[1]) {
                findings.push(
                    SafetyFinding::new(
                        Severity::Low,
                        "existing_object",
                        format!("modifying existing VLAN: {}", &caps[1]),
                    )
                    .with_command(i),
                );
            }
        }
    }
}
