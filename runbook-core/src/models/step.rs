use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a single checklist step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Terminal statuses end a step's participation in the current run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Passed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Passed => write!(f, "passed"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Judgement status an agent can assign to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Passed,
    Failed,
    Skipped,
}

impl From<VerdictStatus> for StepStatus {
    fn from(status: VerdictStatus) -> Self {
        match status {
            VerdictStatus::Passed => StepStatus::Passed,
            VerdictStatus::Failed => StepStatus::Failed,
            VerdictStatus::Skipped => StepStatus::Skipped,
        }
    }
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictStatus::Passed => write!(f, "passed"),
            VerdictStatus::Failed => write!(f, "failed"),
            VerdictStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Agent-produced judgement about a step's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepVerdict {
    pub status: VerdictStatus,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub explanation: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Raw retrieved payload kept for audit, if the agent sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<serde_json::Value>,
}

/// Descriptor telling the agent how to gather data for a step. Opaque to
/// the orchestrator; forwarded verbatim with `execute_runbook`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationSpec {
    pub connector: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One checklist item of a runbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunbookStep {
    pub id: Uuid,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Set when the step reaches a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<StepVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation: Option<AutomationSpec>,
    /// Documentation only; never interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<String>,
}

impl RunbookStep {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            description: description.into(),
            status: StepStatus::Pending,
            notes: None,
            timestamp: None,
            verdict: None,
            automation: None,
            expected_outcome: None,
        }
    }

    pub fn with_automation(mut self, automation: AutomationSpec) -> Self {
        self.automation = Some(automation);
        self
    }

    pub fn with_expected_outcome(mut self, expected: impl Into<String>) -> Self {
        self.expected_outcome = Some(expected.into());
        self
    }

    /// Clear everything a run may have written, returning the step to
    /// pending. Identity and definition fields are untouched.
    pub fn clear_progress(&mut self) {
        self.status = StepStatus::Pending;
        self.notes = None;
        self.timestamp = None;
        self.verdict = None;
    }

    /// Mark the step terminal with the given outcome.
    pub fn finish(&mut self, outcome: VerdictStatus, notes: Option<String>) {
        self.status = outcome.into();
        self.notes = notes;
        self.timestamp = Some(Utc::now());
    }
}
