use clap::Subcommand;
use commandeer_core::CommandeerConfig;
use commandeer_inventory::DeviceAttribute;
use std::path::PathBuf;

use super::load_inventory;

#[derive(Subcommand, Debug)]
pub enum InventoryCommand {
    /// List devices, optionally filtered
    List {
        /// Inventory file (overrides the config file)
        #[arg(long, short = 'i')]
        inventory: Option<PathBuf>,

        /// Device filter, e.g. "model=2960X,site=hq"
        #[arg(long, short = 'f')]
        filter: Option<String>,
    },

    /// Summarize devices by site, role, and model
    Summary {
        /// Inventory file (overrides the config file)
        #[arg(long, short = 'i')]
        inventory: Option<PathBuf>,
    },
}

pub fn run(cmd: InventoryCommand, config: &CommandeerConfig) -> anyhow::Result<()> {
    match cmd {
        InventoryCommand::List { inventory, filter } => {
            let inventory = load_inventory(inventory.as_ref(), config)?;
            let devices = super::resolve_devices(&inventory, &[], filter.as_deref())?;

            println!(
                "{:<20} {:<16} {:<12} {:<12} {}",
                "NAME", "ADDRESS", "MODEL", "SITE", "ROLE"
            );
            for device in &devices {
                println!(
                    "{:<20} {:<16} {:<12} {:<12} {}",
                    device.name,
                    device.address,
                    device.model.as_deref().unwrap_or("-"),
                    device.site.as_deref().unwrap_or("-"),
                    device.role.as_deref().unwrap_or("-"),
                );
            }
            println!("{} device(s)", devices.len());
            Ok(())
        }

        InventoryCommand::Summary { inventory } => {
            let inventory = load_inventory(inventory.as_ref(), config)?;
            println!("{} device(s)", inventory.len());
            for (label, attribute) in [
                ("sites", DeviceAttribute::Site),
                ("roles", DeviceAttribute::Role),
                ("models", DeviceAttribute::Model),
            ] {
                let values = inventory.unique_values(attribute);
                if !values.is_empty() {
                    println!("  {label}: {}", values.join(", "));
                }
            }
            Ok(())
        }
    }
}
