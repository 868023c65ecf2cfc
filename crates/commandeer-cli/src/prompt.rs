//! Interactive confirmation gate over stdin.

use async_trait::async_trait;
use commandeer_engine::{ConfirmationGate, ConfirmationKind, ConfirmationRequest, Decision};
use std::io::{BufRead, Write};

/// Prompts the operator on the terminal. The engine serializes prompts, so
/// parallel sessions never interleave here.
pub struct StdinGate;

#[async_trait]
impl ConfirmationGate for StdinGate {
    async fn confirm(&self, request: ConfirmationRequest) -> Decision {
        render(&request);

        // Reading stdin blocks; keep it off the runtime worker threads.
        let answer = tokio::task::spawn_blocking(read_answer).await;
        match answer {
            Ok(true) => Decision::Approve,
            _ => Decision::Deny,
        }
    }
}

fn render(request: &ConfirmationRequest) {
    println!();
    match request.kind {
        ConfirmationKind::Apply => {
            println!(
                "Confirm apply on {} ({}): {}",
                request.device.name, request.device.address, request.plan
            );
        }
        ConfirmationKind::Rollback => {
            println!(
                "Confirm ROLLBACK on {} ({}): undo partially applied changes",
                request.device.name, request.device.address
            );
        }
    }

    for command in &request.commands {
        println!("    {command}");
    }

    if !request.findings.is_empty() {
        println!("  findings:");
        let mut findings = request.findings.clone();
        findings.sort_by(|a, b| b.severity.cmp(&a.severity));
        for finding in &findings {
            println!("    [{:<8}] {}", finding.severity.to_string(), finding.message);
        }
    }
}

fn read_answer() -> bool {
    print!("Proceed? [y/N]: ");
    let _ = std::io::stdout().flush();

    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
    }
}
