use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use runbook_core::OrchestratorConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::{handle_history_command, handle_run_command, handle_show_command, HistoryCommand};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "runbook")]
#[command(version = VERSION)]
#[command(about = "Run incident-response runbooks manually or through a remote agent")]
#[command(long_about = r#"
Runbooks are ordered incident-response checklists. Run one step by step
yourself, or hand it to a remote agent that gathers data from your
monitoring connectors and streams verdicts back.

Definitions are YAML or JSON files; see 'runbook show' to validate one.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (defaults to environment-only configuration)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Execute a runbook definition")]
    Run {
        /// Runbook definition file (.yaml, .yml or .json)
        file: PathBuf,

        /// Hand execution to the remote agent instead of stepping manually
        #[arg(long)]
        auto: bool,

        /// Override the agent endpoint (host:port)
        #[arg(long)]
        endpoint: Option<String>,
    },

    #[command(about = "Validate a definition file and print its steps")]
    Show { file: PathBuf },

    #[command(about = "List past executions")]
    History {
        #[command(subcommand)]
        action: Option<HistoryCommand>,

        /// Only records for this runbook id
        #[arg(long)]
        runbook: Option<uuid::Uuid>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    let config = match OrchestratorConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Run {
            file,
            auto,
            endpoint,
        } => handle_run_command(&config, &file, auto, endpoint).await,
        Commands::Show { file } => handle_show_command(&file),
        Commands::History {
            action,
            runbook,
            limit,
        } => handle_history_command(&config, action, runbook, limit).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
