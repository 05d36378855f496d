//! Output formatting for CLI

use tracing::{info, warn};

use qarun_common::{Ledger, RunRecord};

/// Human-readable summary of one run
pub fn render_summary(record: &RunRecord) -> String {
    let mut out = String::new();
    out.push_str("\n=== Latest Run Details ===\n");
    out.push_str(&format!("Timestamp:  {}\n", record.timestamp));
    out.push_str(&format!("Run ID:     {}\n", record.run_id));
    out.push_str(&format!("Status:     {}\n", record.status));
    out.push_str(&format!("Actions:    {}\n", record.action_count));
    out.push_str("Data:\n");
    for (index, item) in record.items.iter().enumerate() {
        out.push_str(&format!("  {}. {} (ID: {})\n", index + 1, item.name, item.id));
    }
    out.push_str("===========================\n");
    out
}

pub fn no_runs_message(ledger: &Ledger) -> String {
    format!("\nNo runs found in {}.\n", ledger.display_name())
}

/// Print the newest ledger entry
pub fn print_latest(ledger: &Ledger) -> qarun_common::Result<()> {
    match ledger.latest()? {
        Some(record) => {
            info!("Latest Run Details:");
            print!("{}", render_summary(&record));
        }
        None => {
            warn!("No runs found in {}.", ledger.display_name());
            print!("{}", no_runs_message(ledger));
        }
    }
    Ok(())
}
