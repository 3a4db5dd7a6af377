use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RunbookError, RunbookResult};

use super::step::{AutomationSpec, RunbookStep};

/// Overall execution status of a runbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunbookStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunbookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunbookStatus::Idle => write!(f, "idle"),
            RunbookStatus::Running => write!(f, "running"),
            RunbookStatus::Completed => write!(f, "completed"),
            RunbookStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Fields of a step that may be edited while the runbook is idle.
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    pub label: Option<String>,
    pub description: Option<String>,
    pub expected_outcome: Option<Option<String>>,
    pub automation: Option<Option<AutomationSpec>>,
}

/// An ordered checklist of diagnostic/remediation steps.
///
/// The step list is structurally mutable only while the runbook is idle.
/// During a run the orchestrator owns the steps wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runbook {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub steps: Vec<RunbookStep>,
    #[serde(default)]
    pub status: RunbookStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
}

impl Runbook {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            steps: Vec::new(),
            status: RunbookStatus::Idle,
            started_at: None,
            completed_at: None,
            conclusion: None,
        }
    }

    fn require_idle(&self, operation: &str) -> RunbookResult<()> {
        if self.status != RunbookStatus::Idle {
            return Err(RunbookError::InvalidState(format!(
                "cannot {} while runbook is {}",
                operation, self.status
            )));
        }
        Ok(())
    }

    /// Append a new step with a fresh id. Idle only.
    pub fn add_step(&mut self, step: RunbookStep) -> RunbookResult<Uuid> {
        self.require_idle("add a step")?;
        let id = step.id;
        self.steps.push(step);
        Ok(id)
    }

    /// Remove a step by id. Absent ids are a no-op, not an error. Idle only.
    pub fn remove_step(&mut self, step_id: Uuid) -> RunbookResult<()> {
        self.require_idle("remove a step")?;
        self.steps.retain(|s| s.id != step_id);
        Ok(())
    }

    /// Move a step to a new position, preserving its identity. Idle only.
    pub fn move_step(&mut self, step_id: Uuid, new_index: usize) -> RunbookResult<()> {
        self.require_idle("reorder steps")?;
        let Some(current) = self.steps.iter().position(|s| s.id == step_id) else {
            return Ok(());
        };
        let step = self.steps.remove(current);
        let target = new_index.min(self.steps.len());
        self.steps.insert(target, step);
        Ok(())
    }

    /// Edit a step's definition fields. Idle only; absent ids are a no-op.
    pub fn update_step(&mut self, step_id: Uuid, patch: StepPatch) -> RunbookResult<()> {
        self.require_idle("edit a step")?;
        if let Some(step) = self.steps.iter_mut().find(|s| s.id == step_id) {
            if let Some(label) = patch.label {
                step.label = label;
            }
            if let Some(description) = patch.description {
                step.description = description;
            }
            if let Some(expected) = patch.expected_outcome {
                step.expected_outcome = expected;
            }
            if let Some(automation) = patch.automation {
                step.automation = automation;
            }
        }
        Ok(())
    }

    pub fn step(&self, step_id: Uuid) -> Option<&RunbookStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Clear all run-produced state, returning every step to pending and
    /// the runbook to idle.
    pub fn clear_progress(&mut self) {
        for step in &mut self.steps {
            step.clear_progress();
        }
        self.status = RunbookStatus::Idle;
        self.started_at = None;
        self.completed_at = None;
        self.conclusion = None;
    }
}
