use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::execution::OverallStatus;
use super::runbook::{Runbook, RunbookStatus};
use super::step::StepStatus;

/// Final state of one step as captured in a history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub label: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Immutable snapshot of one completed or failed run. Created once at the
/// terminal outcome and never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunbookExecutionRecord {
    pub id: Uuid,
    pub runbook_id: Uuid,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub status: OverallStatus,
    pub steps: Vec<StepSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
}

impl RunbookExecutionRecord {
    /// Snapshot a runbook that has just reached a terminal status.
    pub fn from_runbook(runbook: &Runbook) -> Self {
        let status = match runbook.status {
            RunbookStatus::Completed => OverallStatus::Completed,
            _ => OverallStatus::Failed,
        };

        let steps = runbook
            .steps
            .iter()
            .map(|step| StepSnapshot {
                label: step.label.clone(),
                status: step.status,
                confidence: step.verdict.as_ref().map(|v| v.confidence),
                explanation: step.verdict.as_ref().map(|v| v.explanation.clone()),
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            runbook_id: runbook.id,
            title: runbook.title.clone(),
            timestamp: Utc::now(),
            status,
            steps,
            conclusion: runbook.conclusion.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunbookStep, StepVerdict, VerdictStatus};

    #[test]
    fn test_from_completed_runbook() {
        let mut runbook = Runbook::new("DB failover check");
        runbook
            .add_step(RunbookStep::new("Check replication lag", ""))
            .unwrap();
        runbook.steps[0].status = StepStatus::Passed;
        runbook.steps[0].verdict = Some(StepVerdict {
            status: VerdictStatus::Passed,
            confidence: 0.9,
            explanation: "lag under 1s".to_string(),
            suggestions: vec![],
            raw_data: None,
        });
        runbook.status = RunbookStatus::Completed;
        runbook.conclusion = Some("All clear".to_string());

        let record = RunbookExecutionRecord::from_runbook(&runbook);
        assert_eq!(record.runbook_id, runbook.id);
        assert_eq!(record.status, OverallStatus::Completed);
        assert_eq!(record.steps.len(), 1);
        assert_eq!(record.steps[0].confidence, Some(0.9));
        assert_eq!(record.steps[0].explanation.as_deref(), Some("lag under 1s"));
        assert_eq!(record.conclusion.as_deref(), Some("All clear"));
    }

    #[test]
    fn test_from_failed_runbook() {
        let mut runbook = Runbook::new("Triage");
        runbook.add_step(RunbookStep::new("a", "")).unwrap();
        runbook.steps[0].status = StepStatus::Failed;
        runbook.status = RunbookStatus::Failed;

        let record = RunbookExecutionRecord::from_runbook(&runbook);
        assert_eq!(record.status, OverallStatus::Failed);
        assert!(record.steps[0].confidence.is_none());
    }

    #[test]
    fn test_record_serialization_roundtrip() {
        let mut runbook = Runbook::new("Triage");
        runbook.add_step(RunbookStep::new("a", "")).unwrap();
        runbook.status = RunbookStatus::Completed;

        let record = RunbookExecutionRecord::from_runbook(&runbook);
        let json = serde_json::to_string(&record).unwrap();
        let back: RunbookExecutionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.status, record.status);
    }
}
