use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use uuid::Uuid;

use runbook_core::{HistoryStore, OrchestratorConfig, OverallStatus, RunbookExecutionRecord, StepStatus};

#[derive(Subcommand)]
pub enum HistoryCommand {
    #[command(about = "Delete all stored execution records")]
    Clear,
}

pub async fn handle_history_command(
    config: &OrchestratorConfig,
    action: Option<HistoryCommand>,
    runbook: Option<Uuid>,
    limit: usize,
) -> Result<()> {
    let store =
        HistoryStore::open(config.history.resolved_path(), config.history.max_entries).await;

    if let Some(HistoryCommand::Clear) = action {
        store.clear().await?;
        println!("{}", "Execution history cleared.".yellow());
        return Ok(());
    }

    let records = match runbook {
        Some(id) => store.query(id).await,
        None => store.all().await,
    };

    if records.is_empty() {
        println!("No execution records found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Time (UTC)", "Runbook", "Status", "Steps", "Conclusion"]);

    for record in records.iter().take(limit) {
        table.add_row(vec![
            Cell::new(record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(&record.title),
            status_cell(record),
            Cell::new(step_summary(record)),
            Cell::new(record.conclusion.as_deref().unwrap_or("-")),
        ]);
    }

    println!("{table}");
    println!(
        "{} record(s){}",
        records.len().min(limit),
        runbook
            .map(|id| format!(" for runbook {}", id))
            .unwrap_or_default()
    );
    Ok(())
}

fn status_cell(record: &RunbookExecutionRecord) -> Cell {
    match record.status {
        OverallStatus::Completed => Cell::new("completed").fg(Color::Green),
        OverallStatus::Failed => Cell::new("failed").fg(Color::Red),
    }
}

fn step_summary(record: &RunbookExecutionRecord) -> String {
    let passed = record
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Passed)
        .count();
    let failed = record
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Failed)
        .count();
    let skipped = record
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Skipped)
        .count();
    format!(
        "{}/{} passed, {} failed, {} skipped",
        passed,
        record.steps.len(),
        failed,
        skipped
    )
}
