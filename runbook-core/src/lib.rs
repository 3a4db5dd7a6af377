//! Core library for the runbook execution orchestrator.
//!
//! A runbook is an ordered incident-response checklist. It runs either
//! manually, with an operator recording each step's outcome, or in auto
//! mode, where a remote agent streams progress and verdicts over a
//! persistent connection. Terminal runs land in a bounded execution
//! history.

pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod models;
pub mod orchestrator;
pub mod protocol;
pub mod transport;

pub use config::{
    AgentConfig, AgentEndpointConfig, ConnectorCredentials, HistoryConfig, LoggingConfig,
    OrchestratorConfig,
};
pub use error::{RunbookError, RunbookResult};
pub use executor::{Reconciler, RunOutcome};
pub use history::HistoryStore;
pub use models::{
    AutomationSpec, ExecutionState, OverallStatus, Runbook, RunbookExecutionRecord, RunbookStatus,
    RunbookStep, StepExecution, StepExecutionStatus, StepPatch, StepSnapshot, StepStatus,
    StepVerdict, VerdictStatus,
};
pub use orchestrator::{ExecutionMode, RunbookOrchestrator};
pub use protocol::{
    decode_agent_message, encode_agent_message, encode_client_message, AgentMessage, ClientMessage,
    DataSource,
};
pub use transport::{AgentConnector, AgentSession, TcpConnector};
