use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step::StepVerdict;

/// Overall outcome of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Completed => write!(f, "completed"),
            OverallStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Transient per-step phase while the agent works on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepExecutionStatus {
    #[default]
    Waiting,
    Gathering,
    Analyzing,
    Completed,
}

impl std::fmt::Display for StepExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepExecutionStatus::Waiting => write!(f, "waiting"),
            StepExecutionStatus::Gathering => write!(f, "gathering"),
            StepExecutionStatus::Analyzing => write!(f, "analyzing"),
            StepExecutionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Streamed progress for one step during an auto run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepExecution {
    pub status: StepExecutionStatus,
    pub data_messages: Vec<String>,
    pub verdict: Option<StepVerdict>,
}

/// Orchestrator-local state of one in-flight auto run. Created fresh at the
/// start of every auto run and discarded on reset; never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionState {
    pub is_connected: bool,
    pub is_executing: bool,
    pub steps: HashMap<Uuid, StepExecution>,
    pub conclusion: Option<String>,
    pub overall_status: Option<OverallStatus>,
    pub error: Option<String>,
}

impl ExecutionState {
    /// Fresh state for a run that is about to connect.
    pub fn starting() -> Self {
        Self {
            is_executing: true,
            ..Default::default()
        }
    }

    pub fn step(&self, step_id: Uuid) -> Option<&StepExecution> {
        self.steps.get(&step_id)
    }

    pub fn step_mut(&mut self, step_id: Uuid) -> &mut StepExecution {
        self.steps.entry(step_id).or_default()
    }
}
