use std::collections::HashMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde::Deserialize;
use uuid::Uuid;

use runbook_core::{
    AgentConfig, AutomationSpec, HistoryStore, OrchestratorConfig, Runbook, RunbookOrchestrator,
    RunbookStatus, RunbookStep, StepExecutionStatus, StepStatus, TcpConnector, VerdictStatus,
};

/// On-disk shape of a runbook definition. Ids are assigned at load time;
/// definitions only describe the checklist.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunbookDefinition {
    title: String,
    #[serde(default)]
    steps: Vec<StepDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepDefinition {
    label: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    expected_outcome: Option<String>,
    #[serde(default)]
    automation: Option<AutomationSpec>,
}

fn load_definition(path: &Path) -> Result<Runbook> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let definition: RunbookDefinition = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&contents)
            .with_context(|| format!("invalid JSON definition in {}", path.display()))?,
        _ => serde_yaml::from_str(&contents)
            .with_context(|| format!("invalid YAML definition in {}", path.display()))?,
    };

    if definition.steps.is_empty() {
        bail!("definition '{}' has no steps", definition.title);
    }

    let mut runbook = Runbook::new(definition.title);
    for step_def in definition.steps {
        let mut step = RunbookStep::new(step_def.label, step_def.description);
        step.expected_outcome = step_def.expected_outcome;
        step.automation = step_def.automation;
        runbook.add_step(step)?;
    }
    Ok(runbook)
}

pub fn handle_show_command(file: &Path) -> Result<()> {
    let runbook = load_definition(file)?;

    println!("{} {}", "Runbook:".bold(), runbook.title);
    println!("{} {}", "Steps:".bold(), runbook.steps.len());
    for (i, step) in runbook.steps.iter().enumerate() {
        let automation = if step.automation.is_some() {
            " [automated]".cyan().to_string()
        } else {
            String::new()
        };
        println!("  {}. {}{}", i + 1, step.label, automation);
        if !step.description.is_empty() {
            println!("     {}", step.description.dimmed());
        }
        if let Some(expected) = &step.expected_outcome {
            println!("     {} {}", "expect:".dimmed(), expected.dimmed());
        }
    }
    Ok(())
}

pub async fn handle_run_command(
    config: &OrchestratorConfig,
    file: &Path,
    auto: bool,
    endpoint: Option<String>,
) -> Result<()> {
    let runbook = load_definition(file)?;
    let history = Arc::new(
        HistoryStore::open(config.history.resolved_path(), config.history.max_entries).await,
    );
    let endpoint = endpoint.unwrap_or_else(|| config.agent.endpoint());
    let orchestrator = RunbookOrchestrator::new(
        runbook,
        history,
        Arc::new(TcpConnector::new()),
        endpoint.clone(),
    );

    if auto {
        run_auto(&orchestrator, &endpoint).await
    } else {
        run_manual(&orchestrator).await
    }
}

async fn run_manual(orchestrator: &RunbookOrchestrator) -> Result<()> {
    orchestrator.start_manual().await?;
    let total = orchestrator.runbook().await.steps.len();

    loop {
        let runbook = orchestrator.runbook().await;
        if runbook.status != RunbookStatus::Running {
            break;
        }
        let Some((index, step)) = runbook
            .steps
            .iter()
            .enumerate()
            .find(|(_, s)| s.status == StepStatus::Running)
        else {
            break;
        };

        println!();
        println!(
            "{} {}",
            format!("[{}/{}]", index + 1, total).bold(),
            step.label.bold()
        );
        if !step.description.is_empty() {
            println!("  {}", step.description);
        }
        if let Some(expected) = &step.expected_outcome {
            println!("  {} {}", "expect:".dimmed(), expected);
        }

        let outcome = loop {
            match prompt("  [p]ass / [f]ail / [s]kip / [q]uit > ")?.as_str() {
                "p" | "pass" => break Some(VerdictStatus::Passed),
                "f" | "fail" => break Some(VerdictStatus::Failed),
                "s" | "skip" => break Some(VerdictStatus::Skipped),
                "q" | "quit" => break None,
                _ => continue,
            }
        };
        let Some(outcome) = outcome else {
            orchestrator.reset().await;
            println!("{}", "Run abandoned, runbook reset to idle.".yellow());
            return Ok(());
        };

        let notes = prompt("  note (optional) > ")?;
        let notes = if notes.is_empty() { None } else { Some(notes) };
        orchestrator.advance(step.id, outcome, notes).await?;
    }

    print_summary(&orchestrator.runbook().await);
    Ok(())
}

async fn run_auto(orchestrator: &RunbookOrchestrator, endpoint: &str) -> Result<()> {
    let agent_config = agent_config_from_env()?;
    println!("Connecting to agent at {}...", endpoint);
    orchestrator.start_auto(agent_config).await?;
    println!("{}", "Agent is executing the runbook (Ctrl-C cancels).".dimmed());

    let mut seen_phases: HashMap<Uuid, StepExecutionStatus> = HashMap::new();
    let mut seen_data: HashMap<Uuid, usize> = HashMap::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                orchestrator.cancel().await;
                println!("{}", "Cancelled.".yellow());
                return Ok(());
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                let state = orchestrator.execution_state().await;
                let runbook = orchestrator.runbook().await;

                for step in &runbook.steps {
                    let Some(entry) = state.step(step.id) else { continue };

                    let printed = seen_data.entry(step.id).or_insert(0);
                    for line in entry.data_messages.iter().skip(*printed) {
                        println!("  {} {}", format!("{}:", step.label).dimmed(), line);
                    }
                    *printed = entry.data_messages.len();

                    if seen_phases.get(&step.id) != Some(&entry.status) {
                        seen_phases.insert(step.id, entry.status);
                        println!("{} {} ({})", "->".bold(), step.label, entry.status);
                    }
                }

                if !state.is_executing {
                    break;
                }
            }
        }
    }

    print_summary(&orchestrator.runbook().await);
    Ok(())
}

fn agent_config_from_env() -> Result<AgentConfig> {
    let ai_provider = std::env::var("RUNBOOK_AI_PROVIDER").unwrap_or_default();
    let ai_api_key = std::env::var("RUNBOOK_AI_API_KEY").unwrap_or_default();
    let ai_model = std::env::var("RUNBOOK_AI_MODEL").ok();

    let config = AgentConfig {
        ai_provider,
        ai_api_key,
        ai_model,
        providers: HashMap::new(),
    };
    config.validate().context(
        "set RUNBOOK_AI_PROVIDER and RUNBOOK_AI_API_KEY to run a runbook in auto mode",
    )?;
    Ok(config)
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_summary(runbook: &Runbook) {
    println!();
    for step in &runbook.steps {
        let status = match step.status {
            StepStatus::Passed => "passed".green(),
            StepStatus::Failed => "failed".red(),
            StepStatus::Skipped => "skipped".yellow(),
            other => other.to_string().dimmed(),
        };
        println!("  {:<10} {}", status, step.label);
        if let Some(notes) = &step.notes {
            println!("             {}", notes.dimmed());
        }
    }

    let overall = match runbook.status {
        RunbookStatus::Completed => "completed".green().bold(),
        RunbookStatus::Failed => "failed".red().bold(),
        other => other.to_string().normal(),
    };
    println!();
    println!("{} {}", "Result:".bold(), overall);
    if let Some(conclusion) = &runbook.conclusion {
        println!("{} {}", "Conclusion:".bold(), conclusion);
    }
}
