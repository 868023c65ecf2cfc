pub mod history;
pub mod inventory;
pub mod plan;
pub mod run;
pub mod templates;

use anyhow::Context;
use commandeer_core::{
    Command, CommandKind, CommandPlan, CommandeerConfig, Device, PlanOptions, PlanSource,
};
use commandeer_inventory::{DeviceFilter, Inventory};
use commandeer_templates::TemplateLibrary;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Load the inventory named on the command line or in the config file.
pub(crate) fn load_inventory(
    override_path: Option<&PathBuf>,
    config: &CommandeerConfig,
) -> anyhow::Result<Inventory> {
    let path = override_path
        .or(config.inventory.as_ref())
        .context("no inventory given; pass --inventory or set `inventory` in commandeer.yaml")?;
    Ok(Inventory::load(path)?)
}

/// Resolve target devices: explicit names win over the attribute filter;
/// with neither, every device is targeted.
pub(crate) fn resolve_devices(
    inventory: &Inventory,
    names: &[String],
    filter: Option<&str>,
) -> anyhow::Result<Vec<Device>> {
    if !names.is_empty() {
        return names
            .iter()
            .map(|name| {
                inventory
                    .get(name)
                    .cloned()
                    .with_context(|| format!("device '{name}' not found in inventory"))
            })
            .collect();
    }

    let devices = match filter {
        Some(expr) => inventory.filter(&DeviceFilter::parse(expr)?)?,
        None => inventory.devices(),
    };

    anyhow::ensure!(!devices.is_empty(), "no devices matched the selection");
    Ok(devices)
}

/// Sources a plan's command lines from `--command`, a file, or a template.
pub(crate) struct CommandSource {
    pub commands: Vec<String>,
    pub file: Option<PathBuf>,
    pub template: Option<String>,
    pub vars: Vec<String>,
}

/// Build classified commands from whichever source the caller supplied.
pub(crate) fn collect_commands(
    source: &CommandSource,
    config: &CommandeerConfig,
) -> anyhow::Result<(Vec<Command>, PlanSource)> {
    if let Some(template_name) = &source.template {
        let library = match &config.templates_dir {
            Some(dir) => TemplateLibrary::load(dir)?,
            None => TemplateLibrary::builtin(),
        };
        let template = library.get(template_name)?;

        let mut bindings = BTreeMap::new();
        for pair in &source.vars {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("--var expects key=value, got '{pair}'"))?;
            bindings.insert(key.trim().to_string(), value.trim().to_string());
        }

        let lines = template.render(&bindings)?;
        let kind = CommandKind::Rendered {
            template: template_name.clone(),
        };
        let commands = commandeer_safety::classify_commands(&lines, &kind);
        return Ok((
            commands,
            PlanSource::Template {
                name: template_name.clone(),
            },
        ));
    }

    let lines: Vec<String> = if let Some(path) = &source.file {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read commands file {}", path.display()))?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect()
    } else {
        source.commands.clone()
    };

    anyhow::ensure!(
        !lines.is_empty(),
        "no commands given; use --command, --file, or --template"
    );

    let commands = commandeer_safety::classify_commands(&lines, &CommandKind::Literal);
    Ok((commands, PlanSource::AdHoc))
}

/// Build the plan, translating the reversibility rejection into actionable
/// CLI guidance.
pub(crate) fn build_plan(
    commands: Vec<Command>,
    source: PlanSource,
    options: PlanOptions,
) -> anyhow::Result<CommandPlan> {
    CommandPlan::new(commands, source, options).map_err(|e| match e {
        commandeer_core::PlanError::NotReversible { .. } => anyhow::anyhow!(
            "{e}\nRe-run with --accept-non-reversible to proceed without rollback coverage."
        ),
        other => anyhow::Error::new(other),
    })
}
