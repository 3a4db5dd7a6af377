//! Façade coordinating mode selection, transport lifecycle, reconciliation,
//! and history writes for one runbook.
//!
//! Single-writer model: exactly one orchestrator owns a runbook's execution
//! state, and at most one run is in flight at a time. Independent runbooks
//! share nothing but the history store.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::{RunbookError, RunbookResult};
use crate::executor::manual;
use crate::executor::{Reconciler, RunOutcome};
use crate::history::HistoryStore;
use crate::models::{
    ExecutionState, OverallStatus, Runbook, RunbookExecutionRecord, RunbookStatus,
    VerdictStatus,
};
use crate::protocol::ClientMessage;
use crate::transport::{AgentConnector, AgentSession};

/// How the current (or most recent) run was driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Manual,
    Auto,
}

pub struct RunbookOrchestrator {
    runbook: Arc<RwLock<Runbook>>,
    execution: Arc<RwLock<ExecutionState>>,
    history: Arc<HistoryStore>,
    connector: Arc<dyn AgentConnector>,
    endpoint: String,
    mode: Arc<RwLock<Option<ExecutionMode>>>,
    // Replaced per run so a permit left over from a cancel that raced a
    // terminal message cannot leak into the next run.
    cancel: RwLock<Arc<Notify>>,
    run_task: Mutex<Option<JoinHandle<()>>>,
}

impl RunbookOrchestrator {
    /// The agent endpoint is resolved once here and fixed for the
    /// orchestrator's lifetime.
    pub fn new(
        runbook: Runbook,
        history: Arc<HistoryStore>,
        connector: Arc<dyn AgentConnector>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            runbook: Arc::new(RwLock::new(runbook)),
            execution: Arc::new(RwLock::new(ExecutionState::default())),
            history,
            connector,
            endpoint: endpoint.into(),
            mode: Arc::new(RwLock::new(None)),
            cancel: RwLock::new(Arc::new(Notify::new())),
            run_task: Mutex::new(None),
        }
    }

    /// Snapshot of the runbook.
    pub async fn runbook(&self) -> Runbook {
        self.runbook.read().await.clone()
    }

    /// Snapshot of the in-flight execution state.
    pub async fn execution_state(&self) -> ExecutionState {
        self.execution.read().await.clone()
    }

    pub async fn is_executing(&self) -> bool {
        self.execution.read().await.is_executing
    }

    /// Begin operator-driven execution. No transport is involved.
    pub async fn start_manual(&self) -> RunbookResult<()> {
        self.guard_not_running().await?;

        let mut runbook = self.runbook.write().await;
        manual::start(&mut runbook)?;
        *self.mode.write().await = Some(ExecutionMode::Manual);
        Ok(())
    }

    /// Record an operator outcome for the running step. Manual mode only.
    pub async fn advance(
        &self,
        step_id: Uuid,
        outcome: VerdictStatus,
        notes: Option<String>,
    ) -> RunbookResult<()> {
        if *self.mode.read().await == Some(ExecutionMode::Auto) {
            return Err(RunbookError::WrongMode(
                "runbook ran in auto mode; reset before advancing manually".to_string(),
            ));
        }

        let record = {
            let mut runbook = self.runbook.write().await;
            manual::advance(&mut runbook, step_id, outcome, notes)?
        };

        if let Some(record) = record {
            self.history.record(record).await?;
        }
        Ok(())
    }

    /// Begin agent-driven execution over a fresh transport session.
    ///
    /// Credentials are validated before any connection attempt. A failed
    /// connect (or a failed initial send) finishes the run exactly like an
    /// agent-reported `execution_error` with message "connection failed",
    /// and the error is also returned to the caller.
    pub async fn start_auto(&self, config: AgentConfig) -> RunbookResult<()> {
        config.validate()?;
        self.guard_not_running().await?;

        let (runbook_id, title, steps) = {
            let mut runbook = self.runbook.write().await;
            if runbook.steps.is_empty() {
                return Err(RunbookError::InvalidState(
                    "cannot start a runbook with no steps".to_string(),
                ));
            }
            runbook.clear_progress();
            runbook.status = RunbookStatus::Running;
            runbook.started_at = Some(chrono::Utc::now());
            (runbook.id, runbook.title.clone(), runbook.steps.clone())
        };

        *self.mode.write().await = Some(ExecutionMode::Auto);
        *self.execution.write().await = ExecutionState::starting();

        info!(%runbook_id, endpoint = %self.endpoint, "Starting auto execution");

        let mut session = match self.connector.connect(&self.endpoint).await {
            Ok(session) => session,
            Err(e) => {
                self.finish_errored("connection failed".to_string()).await;
                return Err(e);
            }
        };

        let execute = ClientMessage::ExecuteRunbook {
            title,
            steps,
            config,
        };
        if let Err(e) = session.send(runbook_id, &execute).await {
            session.close().await;
            self.finish_errored("connection failed".to_string()).await;
            return Err(e);
        }

        self.execution.write().await.is_connected = true;

        let cancel = Arc::new(Notify::new());
        *self.cancel.write().await = Arc::clone(&cancel);

        let handle = self.spawn_receive_loop(runbook_id, session, cancel);
        *self.run_task.lock().await = Some(handle);
        Ok(())
    }

    /// Request cancellation of an in-flight auto run. No-op when nothing is
    /// executing. Never waits for an agent response.
    pub async fn cancel(&self) {
        {
            let mut execution = self.execution.write().await;
            if !execution.is_executing {
                return;
            }
            // Flags flip immediately; the receive loop observes the signal
            // and does the best-effort cancel send and teardown.
            execution.is_executing = false;
            execution.is_connected = false;
        }
        info!("Cancelling auto execution");
        self.cancel.read().await.notify_one();
    }

    /// Return the runbook to a clean idle state from any status, cancelling
    /// any in-flight run first. Always succeeds.
    pub async fn reset(&self) {
        self.cancel().await;
        if let Some(handle) = self.run_task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Receive loop task ended abnormally: {}", e);
            }
        }

        self.runbook.write().await.clear_progress();
        *self.execution.write().await = ExecutionState::default();
        *self.mode.write().await = None;
    }

    async fn guard_not_running(&self) -> RunbookResult<()> {
        if self.execution.read().await.is_executing
            || self.runbook.read().await.status == RunbookStatus::Running
        {
            let title = self.runbook.read().await.title.clone();
            return Err(RunbookError::AlreadyRunning(title));
        }
        Ok(())
    }

    fn spawn_receive_loop(
        &self,
        runbook_id: Uuid,
        mut session: Box<dyn AgentSession>,
        cancel: Arc<Notify>,
    ) -> JoinHandle<()> {
        let runbook = Arc::clone(&self.runbook);
        let execution = Arc::clone(&self.execution);
        let history = Arc::clone(&self.history);

        tokio::spawn(async move {
            let mut reconciler = Reconciler::new();

            let outcome = loop {
                tokio::select! {
                    _ = cancel.notified() => {
                        // Fire-and-forget; the send may fail and that is fine.
                        let _ = session.send(runbook_id, &ClientMessage::CancelExecution).await;
                        break None;
                    }
                    inbound = session.next_message() => {
                        match inbound {
                            Some((envelope_id, message)) => {
                                if envelope_id != runbook_id {
                                    warn!(%envelope_id, "Dropped message for a different runbook");
                                    continue;
                                }
                                let mut runbook = runbook.write().await;
                                let mut execution = execution.write().await;
                                if let Some(outcome) =
                                    reconciler.apply(&mut runbook, &mut execution, message)
                                {
                                    break Some(outcome);
                                }
                            }
                            // Dropped unexpectedly: same as an agent error.
                            None => break Some(RunOutcome::Errored {
                                message: "connection failed".to_string(),
                            }),
                        }
                    }
                }
            };

            session.close().await;
            if reconciler.dropped_messages() > 0 || session.dropped_messages() > 0 {
                warn!(
                    reconciler_drops = reconciler.dropped_messages(),
                    transport_drops = session.dropped_messages(),
                    "Run finished with dropped messages"
                );
            }

            match outcome {
                Some(outcome) => {
                    finalize_run(&runbook, &execution, &history, runbook_id, outcome).await
                }
                // Cancelled: flags were already cleared by cancel(); no
                // history record is written for an abandoned run.
                None => {}
            }
        })
    }

    async fn finish_errored(&self, message: String) {
        let runbook_id = self.runbook.read().await.id;
        finalize_run(
            &self.runbook,
            &self.execution,
            &self.history,
            runbook_id,
            RunOutcome::Errored { message },
        )
        .await;
    }
}

async fn finalize_run(
    runbook: &Arc<RwLock<Runbook>>,
    execution: &Arc<RwLock<ExecutionState>>,
    history: &Arc<HistoryStore>,
    runbook_id: Uuid,
    outcome: RunOutcome,
) {
    let record = {
        let mut runbook = runbook.write().await;
        match &outcome {
            RunOutcome::Finished {
                conclusion,
                overall_status,
            } => {
                runbook.status = match overall_status {
                    OverallStatus::Completed => RunbookStatus::Completed,
                    OverallStatus::Failed => RunbookStatus::Failed,
                };
                runbook.conclusion = Some(conclusion.clone());
            }
            RunOutcome::Errored { message } => {
                runbook.status = RunbookStatus::Failed;
                runbook.conclusion = Some(format!("Auto-execution error: {}", message));
            }
        }
        runbook.completed_at = Some(chrono::Utc::now());
        RunbookExecutionRecord::from_runbook(&runbook)
    };

    {
        let mut execution = execution.write().await;
        execution.is_executing = false;
        execution.is_connected = false;
        if let RunOutcome::Errored { message } = &outcome {
            execution.error = Some(message.clone());
        }
    }

    if let Err(e) = history.record(record).await {
        warn!(%runbook_id, "Failed to persist execution record: {}", e);
    }

    info!(%runbook_id, "Auto execution finished");
}
