use clap::Subcommand;
use commandeer_core::CommandeerConfig;
use commandeer_history::{HistoryFilter, HistoryStore};
use uuid::Uuid;

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    /// List recorded history entries, newest last
    List {
        /// Only entries for this device
        #[arg(long)]
        device: Option<String>,

        /// Only entries for this run id
        #[arg(long)]
        run: Option<Uuid>,

        /// Only entries of this kind (e.g. command_applied)
        #[arg(long)]
        kind: Option<String>,

        /// Keep only the most recent N entries
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Aggregate statistics over the recorded history
    Stats,

    /// Delete the recorded history
    Clear,
}

pub fn run(cmd: HistoryCommand, config: &CommandeerConfig) -> anyhow::Result<()> {
    let store = HistoryStore::open(&config.history);

    match cmd {
        HistoryCommand::List {
            device,
            run,
            kind,
            limit,
        } => {
            let entries = store.query(&HistoryFilter {
                run_id: run,
                device,
                kind,
                limit: Some(limit),
            })?;

            if entries.is_empty() {
                println!("No history entries match.");
                return Ok(());
            }

            for entry in &entries {
                println!(
                    "{}  {:<24} {:<16} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.kind,
                    entry.device.as_deref().unwrap_or("-"),
                    summarize(entry),
                );
            }
            println!("{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
            Ok(())
        }

        HistoryCommand::Stats => {
            let stats = store.stats()?;
            println!("{} entries across {} run(s)", stats.total_entries, stats.runs);
            println!("  commands applied: {}", stats.commands_applied);
            println!("  failed sessions:  {}", stats.failures);
            if !stats.devices.is_empty() {
                println!("  devices: {}", stats.devices.join(", "));
            }
            for (kind, count) in &stats.by_kind {
                println!("  {kind}: {count}");
            }
            Ok(())
        }

        HistoryCommand::Clear => {
            let count = store.clear()?;
            println!("Cleared {count} history entr{}", if count == 1 { "y" } else { "ies" });
            Ok(())
        }
    }
}

fn summarize(entry: &commandeer_history::HistoryEntry) -> String {
    match entry.kind.as_str() {
        "session_state_changed" => {
            let from = entry.detail.get("from").and_then(|v| v.as_str()).unwrap_or("?");
            let to = entry.detail.get("to").and_then(|v| v.as_str()).unwrap_or("?");
            format!("{from} -> {to}")
        }
        "command_applied" => entry
            .detail
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        "run_started" => entry
            .detail
            .get("plan")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        "run_completed" => entry
            .detail
            .pointer("/result/status")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        _ => String::new(),
    }
}
