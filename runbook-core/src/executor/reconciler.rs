//! Merges agent-streamed events into per-step state for auto mode.
//!
//! The agent delivers messages in order for one session, but handlers may
//! still see the same event more than once under re-entrant consumption, so
//! started/completed sets guard the non-additive transitions.

use std::collections::HashSet;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ExecutionState, OverallStatus, Runbook, StepExecutionStatus};
use crate::protocol::{AgentMessage, DataSource};

/// Terminal result of one auto run, as reported by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Finished {
        conclusion: String,
        overall_status: OverallStatus,
    },
    Errored {
        message: String,
    },
}

/// Per-run reconciliation state. Scoped to exactly one auto run and
/// discarded with it.
#[derive(Debug, Default)]
pub struct Reconciler {
    started_ids: HashSet<Uuid>,
    completed_ids: HashSet<Uuid>,
    dropped: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages discarded for targeting an unknown step.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped
    }

    /// Apply one inbound message to the execution state and runbook.
    /// Returns the run outcome when the message is terminal.
    pub fn apply(
        &mut self,
        runbook: &mut Runbook,
        state: &mut ExecutionState,
        message: AgentMessage,
    ) -> Option<RunOutcome> {
        match message {
            AgentMessage::StepStarted { step_id } => {
                if runbook.step(step_id).is_none() {
                    self.drop_message(step_id, "step_started");
                    return None;
                }
                if self.started_ids.insert(step_id) {
                    state.step_mut(step_id).status = StepExecutionStatus::Gathering;
                    debug!(%step_id, "Step started gathering");
                }
                None
            }

            AgentMessage::StepData {
                step_id,
                data,
                source,
            } => {
                if runbook.step(step_id).is_none() {
                    self.drop_message(step_id, "step_data");
                    return None;
                }
                // Data is additive by construction; no idempotency guard.
                let step = state.step_mut(step_id);
                step.data_messages.push(data);
                step.status = match source {
                    DataSource::Reasoning => StepExecutionStatus::Analyzing,
                    DataSource::Retrieval => StepExecutionStatus::Gathering,
                };
                None
            }

            AgentMessage::StepCompleted { step_id, verdict } => {
                if runbook.step(step_id).is_none() {
                    self.drop_message(step_id, "step_completed");
                    return None;
                }
                if self.completed_ids.insert(step_id) {
                    let entry = state.step_mut(step_id);
                    entry.status = StepExecutionStatus::Completed;
                    entry.verdict = Some(verdict.clone());

                    if let Some(step) = runbook.steps.iter_mut().find(|s| s.id == step_id) {
                        step.status = verdict.status.into();
                        step.notes = Some(verdict.explanation.clone());
                        step.timestamp = Some(chrono::Utc::now());
                        step.verdict = Some(verdict);
                    }
                    debug!(%step_id, "Step completed with verdict");
                }
                None
            }

            AgentMessage::ExecutionCompleted {
                conclusion,
                overall_status,
            } => {
                state.conclusion = Some(conclusion.clone());
                state.overall_status = Some(overall_status);
                Some(RunOutcome::Finished {
                    conclusion,
                    overall_status,
                })
            }

            AgentMessage::ExecutionError { error } => Some(RunOutcome::Errored { message: error }),
        }
    }

    fn drop_message(&mut self, step_id: Uuid, kind: &str) {
        self.dropped += 1;
        warn!(%step_id, kind, dropped = self.dropped, "Dropped message for unknown step");
    }
}
