//! Operator-driven sequential execution.
//!
//! Entirely local; never touches the agent transport. Exactly one step is
//! running at any point mid-run, and advancement proceeds by array order.

use tracing::info;
use uuid::Uuid;

use crate::error::{RunbookError, RunbookResult};
use crate::models::{
    Runbook, RunbookExecutionRecord, RunbookStatus, StepStatus, VerdictStatus,
};

/// Begin a manual run: all steps reset to pending, step 0 running.
pub fn start(runbook: &mut Runbook) -> RunbookResult<()> {
    if runbook.status != RunbookStatus::Idle {
        return Err(RunbookError::InvalidState(format!(
            "cannot start while runbook is {}",
            runbook.status
        )));
    }
    if runbook.steps.is_empty() {
        return Err(RunbookError::InvalidState(
            "cannot start a runbook with no steps".to_string(),
        ));
    }

    for step in &mut runbook.steps {
        step.clear_progress();
    }
    runbook.steps[0].status = StepStatus::Running;
    runbook.status = RunbookStatus::Running;
    runbook.started_at = Some(chrono::Utc::now());
    runbook.completed_at = None;
    runbook.conclusion = None;

    info!(runbook_id = %runbook.id, "Started manual execution");
    Ok(())
}

/// Record an operator outcome for the running step and promote the next
/// pending step. Returns the history record when the run just finished.
///
/// Fails with `InvalidTransition` (without mutating anything) if the target
/// step is not currently running.
pub fn advance(
    runbook: &mut Runbook,
    step_id: Uuid,
    outcome: VerdictStatus,
    notes: Option<String>,
) -> RunbookResult<Option<RunbookExecutionRecord>> {
    let Some(index) = runbook.steps.iter().position(|s| s.id == step_id) else {
        return Err(RunbookError::InvalidTransition {
            step_id: step_id.to_string(),
            message: "step not found".to_string(),
        });
    };

    if runbook.steps[index].status != StepStatus::Running {
        return Err(RunbookError::InvalidTransition {
            step_id: step_id.to_string(),
            message: format!(
                "step is {}, only a running step can be advanced",
                runbook.steps[index].status
            ),
        });
    }

    runbook.steps[index].finish(outcome, notes);

    let next_pending = runbook
        .steps
        .iter()
        .skip(index + 1)
        .position(|s| s.status == StepStatus::Pending)
        .map(|offset| index + 1 + offset);

    if let Some(next) = next_pending {
        runbook.steps[next].status = StepStatus::Running;
        return Ok(None);
    }

    // All steps terminal: one failure fails the run.
    let any_failed = runbook.steps.iter().any(|s| s.status == StepStatus::Failed);
    runbook.status = if any_failed {
        RunbookStatus::Failed
    } else {
        RunbookStatus::Completed
    };
    runbook.completed_at = Some(chrono::Utc::now());

    info!(
        runbook_id = %runbook.id,
        status = %runbook.status,
        "Manual execution finished"
    );
    Ok(Some(RunbookExecutionRecord::from_runbook(runbook)))
}

/// Return the runbook to a clean idle state from any status.
pub fn reset(runbook: &mut Runbook) {
    runbook.clear_progress();
    info!(runbook_id = %runbook.id, "Runbook reset to idle");
}
