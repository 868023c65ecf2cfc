use clap::Args;
use commandeer_core::{CommandeerConfig, PlanOptions, Severity};
use commandeer_safety::validate_plan;
use std::path::PathBuf;

use super::{CommandSource, build_plan, collect_commands, load_inventory, resolve_devices};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Inventory file (overrides the config file)
    #[arg(long, short = 'i')]
    inventory: Option<PathBuf>,

    /// Device filter, e.g. "model=2960X,site=hq"
    #[arg(long, short = 'f')]
    filter: Option<String>,

    /// Target a specific device by name (repeatable)
    #[arg(long = "device")]
    devices: Vec<String>,

    /// Command to validate, in order (repeatable)
    #[arg(long = "command", short = 'c')]
    commands: Vec<String>,

    /// File with one command per line
    #[arg(long)]
    file: Option<PathBuf>,

    /// Template to render and validate
    #[arg(long, short = 't')]
    template: Option<String>,

    /// Template variable binding key=value (repeatable)
    #[arg(long = "var")]
    vars: Vec<String>,
}

/// Offline validation: classify and validate against each target device
/// without opening a single connection (no running-config checks).
pub fn run(args: PlanArgs, config: &CommandeerConfig) -> anyhow::Result<()> {
    let inventory = load_inventory(args.inventory.as_ref(), config)?;
    let devices = resolve_devices(&inventory, &args.devices, args.filter.as_deref())?;

    let source = CommandSource {
        commands: args.commands.clone(),
        file: args.file.clone(),
        template: args.template.clone(),
        vars: args.vars.clone(),
    };
    let (commands, plan_source) = collect_commands(&source, config)?;

    // Validation-only: reversibility is reported, not enforced here.
    let plan = build_plan(
        commands,
        plan_source,
        PlanOptions {
            accept_non_reversible: true,
            ..Default::default()
        },
    )?;

    println!("Plan: {}", plan.describe());
    for (i, command) in plan.commands.iter().enumerate() {
        let rollback = match &command.inverse {
            Some(inverse) => format!("rollback: {inverse}"),
            None => "not reversible".to_string(),
        };
        println!("  {:>3}. [{:<8}] {:<40} {}", i + 1, command.risk.to_string(), command.text, rollback);
    }

    let mut critical = 0;
    for device in &devices {
        let findings = validate_plan(&plan, device, None);
        if findings.is_empty() {
            continue;
        }
        println!();
        println!("{} ({} finding(s)):", device.name, findings.len());
        for finding in &findings {
            if finding.severity == Severity::Critical {
                critical += 1;
            }
            println!("  [{:<8}] {}: {}", finding.severity.to_string(), finding.code, finding.message);
        }
    }

    println!();
    if critical > 0 {
        anyhow::bail!("{critical} critical finding(s); this plan would be blocked at execution");
    }
    println!("Plan is clear to execute against {} device(s).", devices.len());
    Ok(())
}
