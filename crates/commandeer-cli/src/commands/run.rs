use clap::Args;
use commandeer_core::{CommandeerConfig, PlanOptions, Severity};
use commandeer_engine::{
    AutoApprove, ConfirmationGate, EventBus, EventSink, Orchestrator, RunOptions, RunResult,
    RunStatus, TracingSink,
};
use commandeer_history::HistoryRecorder;
use commandeer_safety::RulesValidator;
use commandeer_ssh::SshConnector;
use std::path::PathBuf;
use std::sync::Arc;

use super::{CommandSource, build_plan, collect_commands, load_inventory, resolve_devices};
use crate::prompt::StdinGate;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Inventory file (overrides the config file)
    #[arg(long, short = 'i')]
    inventory: Option<PathBuf>,

    /// Device filter, e.g. "model=2960X,site=hq" or "name=^core"
    #[arg(long, short = 'f')]
    filter: Option<String>,

    /// Target a specific device by name (repeatable)
    #[arg(long = "device")]
    devices: Vec<String>,

    /// Command to execute, in order (repeatable)
    #[arg(long = "command", short = 'c')]
    commands: Vec<String>,

    /// File with one command per line (# comments allowed)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Template to render and execute
    #[arg(long, short = 't')]
    template: Option<String>,

    /// Template variable binding key=value (repeatable)
    #[arg(long = "var")]
    vars: Vec<String>,

    /// Preview: validate and record findings without sending commands
    #[arg(long)]
    dry_run: bool,

    /// Auto-approve findings up to this severity (low/medium/high) instead
    /// of prompting
    #[arg(long)]
    auto_approve: Option<String>,

    /// Approve everything up to high severity without prompting
    #[arg(long, short = 'y')]
    yes: bool,

    /// Accept a plan containing non-reversible commands
    #[arg(long)]
    accept_non_reversible: bool,

    /// Verification command sent after the last plan command
    #[arg(long)]
    verify: Option<String>,

    /// Concurrency limit override
    #[arg(long)]
    limit: Option<usize>,
}

pub async fn run(args: RunArgs, config: &CommandeerConfig) -> anyhow::Result<()> {
    let inventory = load_inventory(args.inventory.as_ref(), config)?;
    let devices = resolve_devices(&inventory, &args.devices, args.filter.as_deref())?;

    let source = CommandSource {
        commands: args.commands.clone(),
        file: args.file.clone(),
        template: args.template.clone(),
        vars: args.vars.clone(),
    };
    let (commands, plan_source) = collect_commands(&source, config)?;

    let plan = build_plan(
        commands,
        plan_source,
        PlanOptions {
            dry_run: args.dry_run,
            accept_non_reversible: args.accept_non_reversible,
            verify_command: args.verify.clone(),
        },
    )?;

    let credentials = config.credentials.resolve()?;
    let gate = select_gate(&args)?;

    let history = HistoryRecorder::new(&config.history)?;
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink)];
    if history.is_enabled() {
        sinks.push(Arc::new(history));
    }

    let mut options = RunOptions::from_config(&config.engine);
    if let Some(limit) = args.limit {
        options.concurrency = limit;
    }

    let orchestrator = Orchestrator::new(
        Arc::new(SshConnector::new()),
        Arc::new(RulesValidator),
        gate,
        EventBus::new(sinks),
    )
    .with_options(options);

    println!(
        "{} {} across {} device(s)",
        if args.dry_run { "Previewing" } else { "Executing" },
        plan.describe(),
        devices.len()
    );

    let result = orchestrator.run(plan, devices, credentials).await;
    render_result(&result);

    match result.status {
        RunStatus::Completed => Ok(()),
        status => Err(anyhow::anyhow!("run finished with status '{status}'")),
    }
}

fn select_gate(args: &RunArgs) -> anyhow::Result<Arc<dyn ConfirmationGate>> {
    if args.yes {
        return Ok(Arc::new(AutoApprove::up_to(Severity::High)));
    }
    if let Some(level) = &args.auto_approve {
        let severity = match level.to_lowercase().as_str() {
            "low" => Severity::Low,
            "medium" => Severity::Medium,
            "high" => Severity::High,
            other => anyhow::bail!("invalid --auto-approve level '{other}' (low/medium/high)"),
        };
        return Ok(Arc::new(AutoApprove::up_to(severity)));
    }
    Ok(Arc::new(StdinGate))
}

fn render_result(result: &RunResult) {
    println!();
    println!("Run {} - {}", result.run_id, result.status);
    for session in &result.sessions {
        let state = session.state.to_string();
        let applied = format!("{} applied", session.applied.len());
        let note = match (&session.error, &session.rollback_outcome) {
            (_, Some(outcome)) => format!("rollback: {}", describe_rollback(outcome)),
            (Some(error), None) => error.to_string(),
            (None, None) => String::new(),
        };
        println!("  {:<20} {:<16} {:<12} {}", session.device.name, state, applied, note);

        if let Some(output) = &session.verification_output {
            for line in output.lines() {
                println!("      | {line}");
            }
        }
    }

    let m = &result.metrics;
    println!(
        "  {} device(s), {} command(s) applied, {} retr{}, {} ms{}",
        m.devices,
        m.commands_applied,
        m.retries,
        if m.retries == 1 { "y" } else { "ies" },
        m.total_ms,
        if m.rollback_occurred { ", rollback occurred" } else { "" }
    );
}

fn describe_rollback(outcome: &commandeer_engine::RollbackOutcome) -> String {
    match outcome {
        commandeer_engine::RollbackOutcome::RolledBack => "completed".to_string(),
        commandeer_engine::RollbackOutcome::Failed { message } => format!("FAILED ({message})"),
        commandeer_engine::RollbackOutcome::Skipped { reason } => format!("skipped ({reason})"),
    }
}
