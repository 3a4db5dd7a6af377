use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use runbook_core::{
    AgentConfig, AgentConnector, AgentMessage, AgentSession, ClientMessage, DataSource,
    HistoryStore, OverallStatus, Runbook, RunbookOrchestrator, RunbookResult, RunbookStatus,
    RunbookStep, StepExecutionStatus, StepStatus, StepVerdict, VerdictStatus,
};

/// Connector handing out sessions backed by in-process channels, in place
/// of a live agent socket.
struct MockConnector {
    inbound: Mutex<Option<mpsc::UnboundedReceiver<(Uuid, AgentMessage)>>>,
    sent: Arc<std::sync::Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    connects: Arc<AtomicUsize>,
    refuse: bool,
}

impl MockConnector {
    fn new() -> (
        Arc<Self>,
        mpsc::UnboundedSender<(Uuid, AgentMessage)>,
        Arc<std::sync::Mutex<Vec<String>>>,
        Arc<AtomicBool>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(std::sync::Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let connector = Arc::new(Self {
            inbound: Mutex::new(Some(rx)),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
            connects: Arc::new(AtomicUsize::new(0)),
            refuse: false,
        });
        (connector, tx, sent, closed)
    }

    fn refusing() -> Arc<Self> {
        Arc::new(Self {
            inbound: Mutex::new(None),
            sent: Arc::new(std::sync::Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            connects: Arc::new(AtomicUsize::new(0)),
            refuse: true,
        })
    }
}

#[async_trait]
impl AgentConnector for MockConnector {
    async fn connect(&self, _endpoint: &str) -> RunbookResult<Box<dyn AgentSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(runbook_core::RunbookError::Connection(
                "connection refused".to_string(),
            ));
        }
        let rx = self
            .inbound
            .lock()
            .await
            .take()
            .expect("mock session already taken");
        Ok(Box::new(MockSession {
            inbound: rx,
            sent: Arc::clone(&self.sent),
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct MockSession {
    inbound: mpsc::UnboundedReceiver<(Uuid, AgentMessage)>,
    sent: Arc<std::sync::Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl AgentSession for MockSession {
    async fn send(&mut self, _runbook_id: Uuid, message: &ClientMessage) -> RunbookResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push(message.message_type().to_string());
        Ok(())
    }

    async fn next_message(&mut self) -> Option<(Uuid, AgentMessage)> {
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn dropped_messages(&self) -> u64 {
        0
    }
}

fn runbook_with_steps(n: usize) -> Runbook {
    let mut runbook = Runbook::new("incident triage");
    for i in 0..n {
        runbook
            .add_step(RunbookStep::new(format!("step {}", i), ""))
            .unwrap();
    }
    runbook
}

fn valid_config() -> AgentConfig {
    AgentConfig {
        ai_provider: "anthropic".to_string(),
        ai_api_key: "sk-test".to_string(),
        ..Default::default()
    }
}

fn verdict(status: VerdictStatus, confidence: f64, explanation: &str) -> StepVerdict {
    StepVerdict {
        status,
        confidence,
        explanation: explanation.to_string(),
        suggestions: vec![],
        raw_data: None,
    }
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

// ---------------------------------------------------------------------------
// Manual mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_three_step_run_with_one_failure() {
    let history = Arc::new(HistoryStore::in_memory());
    let (connector, _tx, _sent, _closed) = MockConnector::new();
    let orchestrator = RunbookOrchestrator::new(
        runbook_with_steps(3),
        Arc::clone(&history),
        connector,
        "127.0.0.1:8765",
    );

    orchestrator.start_manual().await.unwrap();
    let runbook = orchestrator.runbook().await;
    assert_eq!(runbook.steps[0].status, StepStatus::Running);
    assert_eq!(runbook.steps[1].status, StepStatus::Pending);

    orchestrator
        .advance(runbook.steps[0].id, VerdictStatus::Passed, None)
        .await
        .unwrap();
    assert_eq!(
        orchestrator.runbook().await.steps[1].status,
        StepStatus::Running
    );

    orchestrator
        .advance(runbook.steps[1].id, VerdictStatus::Failed, Some("5xx spike".to_string()))
        .await
        .unwrap();
    assert_eq!(
        orchestrator.runbook().await.steps[2].status,
        StepStatus::Running
    );

    orchestrator
        .advance(runbook.steps[2].id, VerdictStatus::Passed, None)
        .await
        .unwrap();

    let finished = orchestrator.runbook().await;
    assert_eq!(finished.status, RunbookStatus::Failed);
    assert!(finished.completed_at.is_some());

    let records = history.query(finished.id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, OverallStatus::Failed);
}

#[tokio::test]
async fn start_manual_twice_is_already_running() {
    let (connector, _tx, _sent, _closed) = MockConnector::new();
    let orchestrator = RunbookOrchestrator::new(
        runbook_with_steps(1),
        Arc::new(HistoryStore::in_memory()),
        connector,
        "127.0.0.1:8765",
    );

    orchestrator.start_manual().await.unwrap();
    let err = orchestrator.start_manual().await.unwrap_err();
    assert_eq!(err.error_code(), "E1004");
}

#[tokio::test]
async fn reset_returns_manual_run_to_idle() {
    let (connector, _tx, _sent, _closed) = MockConnector::new();
    let orchestrator = RunbookOrchestrator::new(
        runbook_with_steps(2),
        Arc::new(HistoryStore::in_memory()),
        connector,
        "127.0.0.1:8765",
    );

    orchestrator.start_manual().await.unwrap();
    let first = orchestrator.runbook().await.steps[0].id;
    orchestrator
        .advance(first, VerdictStatus::Failed, Some("note".to_string()))
        .await
        .unwrap();

    orchestrator.reset().await;

    let runbook = orchestrator.runbook().await;
    assert_eq!(runbook.status, RunbookStatus::Idle);
    assert!(runbook.started_at.is_none());
    assert!(runbook
        .steps
        .iter()
        .all(|s| s.status == StepStatus::Pending && s.notes.is_none() && s.timestamp.is_none()));

    // A fresh manual run is allowed again after reset.
    orchestrator.start_manual().await.unwrap();
}

// ---------------------------------------------------------------------------
// Auto mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auto_single_step_scenario() {
    let history = Arc::new(HistoryStore::in_memory());
    let (connector, tx, sent, _closed) = MockConnector::new();
    let runbook = runbook_with_steps(1);
    let runbook_id = runbook.id;
    let step_id = runbook.steps[0].id;

    let orchestrator =
        RunbookOrchestrator::new(runbook, Arc::clone(&history), connector, "127.0.0.1:8765");

    orchestrator.start_auto(valid_config()).await.unwrap();
    let state = orchestrator.execution_state().await;
    assert!(state.is_executing);
    assert!(state.is_connected);
    assert_eq!(sent.lock().unwrap().as_slice(), ["execute_runbook"]);

    tx.send((runbook_id, AgentMessage::StepStarted { step_id }))
        .unwrap();
    wait_until(|| async {
        orchestrator
            .execution_state()
            .await
            .step(step_id)
            .map(|s| s.status == StepExecutionStatus::Gathering)
            .unwrap_or(false)
    })
    .await;

    tx.send((
        runbook_id,
        AgentMessage::StepData {
            step_id,
            data: "fetching metrics...".to_string(),
            source: DataSource::Retrieval,
        },
    ))
    .unwrap();
    tx.send((
        runbook_id,
        AgentMessage::StepData {
            step_id,
            data: "analyzing trend".to_string(),
            source: DataSource::Reasoning,
        },
    ))
    .unwrap();
    wait_until(|| async {
        orchestrator
            .execution_state()
            .await
            .step(step_id)
            .map(|s| s.status == StepExecutionStatus::Analyzing && s.data_messages.len() == 2)
            .unwrap_or(false)
    })
    .await;

    tx.send((
        runbook_id,
        AgentMessage::StepCompleted {
            step_id,
            verdict: verdict(VerdictStatus::Passed, 0.92, "within bounds"),
        },
    ))
    .unwrap();
    tx.send((
        runbook_id,
        AgentMessage::ExecutionCompleted {
            conclusion: "All clear".to_string(),
            overall_status: OverallStatus::Completed,
        },
    ))
    .unwrap();

    wait_until(|| async { !orchestrator.is_executing().await }).await;

    let finished = orchestrator.runbook().await;
    assert_eq!(finished.status, RunbookStatus::Completed);
    assert_eq!(finished.conclusion.as_deref(), Some("All clear"));
    assert_eq!(finished.steps[0].status, StepStatus::Passed);
    assert_eq!(
        finished.steps[0].verdict.as_ref().unwrap().confidence,
        0.92
    );

    let records = history.query(runbook_id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, OverallStatus::Completed);
    assert_eq!(records[0].steps[0].confidence, Some(0.92));
}

#[tokio::test]
async fn auto_execution_error_fails_runbook() {
    let history = Arc::new(HistoryStore::in_memory());
    let (connector, tx, _sent, closed) = MockConnector::new();
    let runbook = runbook_with_steps(1);
    let runbook_id = runbook.id;

    let orchestrator =
        RunbookOrchestrator::new(runbook, Arc::clone(&history), connector, "127.0.0.1:8765");
    orchestrator.start_auto(valid_config()).await.unwrap();

    tx.send((
        runbook_id,
        AgentMessage::ExecutionError {
            error: "connector timeout".to_string(),
        },
    ))
    .unwrap();

    wait_until(|| async { !orchestrator.is_executing().await }).await;

    let finished = orchestrator.runbook().await;
    assert_eq!(finished.status, RunbookStatus::Failed);
    assert_eq!(
        finished.conclusion.as_deref(),
        Some("Auto-execution error: connector timeout")
    );
    assert_eq!(
        orchestrator.execution_state().await.error.as_deref(),
        Some("connector timeout")
    );
    assert!(closed.load(Ordering::SeqCst));
    assert_eq!(history.query(runbook_id).await.len(), 1);
}

#[tokio::test]
async fn dropped_stream_is_a_connection_failure() {
    let history = Arc::new(HistoryStore::in_memory());
    let (connector, tx, _sent, _closed) = MockConnector::new();
    let runbook = runbook_with_steps(1);
    let runbook_id = runbook.id;

    let orchestrator =
        RunbookOrchestrator::new(runbook, Arc::clone(&history), connector, "127.0.0.1:8765");
    orchestrator.start_auto(valid_config()).await.unwrap();

    drop(tx);
    wait_until(|| async { !orchestrator.is_executing().await }).await;

    let finished = orchestrator.runbook().await;
    assert_eq!(finished.status, RunbookStatus::Failed);
    assert_eq!(
        finished.conclusion.as_deref(),
        Some("Auto-execution error: connection failed")
    );
    assert_eq!(history.query(runbook_id).await.len(), 1);
}

#[tokio::test]
async fn refused_connection_fails_before_streaming() {
    let history = Arc::new(HistoryStore::in_memory());
    let connector = MockConnector::refusing();
    let runbook = runbook_with_steps(1);
    let runbook_id = runbook.id;

    let orchestrator =
        RunbookOrchestrator::new(runbook, Arc::clone(&history), connector, "127.0.0.1:8765");

    let err = orchestrator.start_auto(valid_config()).await.unwrap_err();
    assert_eq!(err.error_code(), "E3001");

    let finished = orchestrator.runbook().await;
    assert_eq!(finished.status, RunbookStatus::Failed);
    assert_eq!(
        finished.conclusion.as_deref(),
        Some("Auto-execution error: connection failed")
    );
    assert!(!orchestrator.is_executing().await);
    assert_eq!(history.query(runbook_id).await.len(), 1);
}

#[tokio::test]
async fn invalid_config_never_connects() {
    let (connector, _tx, _sent, _closed) = MockConnector::new();
    let connects = Arc::clone(&connector.connects);
    let orchestrator = RunbookOrchestrator::new(
        runbook_with_steps(1),
        Arc::new(HistoryStore::in_memory()),
        connector,
        "127.0.0.1:8765",
    );

    let err = orchestrator
        .start_auto(AgentConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "E2001");
    assert_eq!(connects.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.runbook().await.status, RunbookStatus::Idle);
}

#[tokio::test]
async fn cancel_closes_session_without_waiting() {
    let (connector, tx, sent, closed) = MockConnector::new();
    let orchestrator = RunbookOrchestrator::new(
        runbook_with_steps(1),
        Arc::new(HistoryStore::in_memory()),
        connector,
        "127.0.0.1:8765",
    );

    orchestrator.start_auto(valid_config()).await.unwrap();
    assert!(orchestrator.is_executing().await);

    orchestrator.cancel().await;

    // Flags flip immediately, before the agent says anything back.
    let state = orchestrator.execution_state().await;
    assert!(!state.is_executing);
    assert!(!state.is_connected);

    wait_until(|| async { closed.load(Ordering::SeqCst) }).await;
    assert_eq!(
        sent.lock().unwrap().as_slice(),
        ["execute_runbook", "cancel_execution"]
    );

    // Keep the channel alive until after teardown is checked.
    drop(tx);
}

#[tokio::test]
async fn cancel_when_idle_is_a_noop() {
    let (connector, _tx, sent, _closed) = MockConnector::new();
    let orchestrator = RunbookOrchestrator::new(
        runbook_with_steps(1),
        Arc::new(HistoryStore::in_memory()),
        connector,
        "127.0.0.1:8765",
    );

    orchestrator.cancel().await;
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn advance_after_auto_run_is_wrong_mode() {
    let history = Arc::new(HistoryStore::in_memory());
    let (connector, tx, _sent, _closed) = MockConnector::new();
    let runbook = runbook_with_steps(1);
    let runbook_id = runbook.id;
    let step_id = runbook.steps[0].id;

    let orchestrator =
        RunbookOrchestrator::new(runbook, history, connector, "127.0.0.1:8765");
    orchestrator.start_auto(valid_config()).await.unwrap();

    tx.send((
        runbook_id,
        AgentMessage::ExecutionCompleted {
            conclusion: "done".to_string(),
            overall_status: OverallStatus::Completed,
        },
    ))
    .unwrap();
    wait_until(|| async { !orchestrator.is_executing().await }).await;

    let err = orchestrator
        .advance(step_id, VerdictStatus::Passed, None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "E1003");
}

#[tokio::test]
async fn reset_cancels_in_flight_auto_run() {
    let (connector, tx, _sent, closed) = MockConnector::new();
    let orchestrator = RunbookOrchestrator::new(
        runbook_with_steps(1),
        Arc::new(HistoryStore::in_memory()),
        connector,
        "127.0.0.1:8765",
    );

    orchestrator.start_auto(valid_config()).await.unwrap();
    orchestrator.reset().await;

    assert!(closed.load(Ordering::SeqCst));
    let runbook = orchestrator.runbook().await;
    assert_eq!(runbook.status, RunbookStatus::Idle);
    let state = orchestrator.execution_state().await;
    assert!(!state.is_executing);
    assert!(state.steps.is_empty());
    drop(tx);
}

#[tokio::test]
async fn messages_for_other_runbooks_are_ignored() {
    let (connector, tx, _sent, _closed) = MockConnector::new();
    let runbook = runbook_with_steps(1);
    let runbook_id = runbook.id;
    let step_id = runbook.steps[0].id;

    let orchestrator = RunbookOrchestrator::new(
        runbook,
        Arc::new(HistoryStore::in_memory()),
        connector,
        "127.0.0.1:8765",
    );
    orchestrator.start_auto(valid_config()).await.unwrap();

    // Wrong runbook id: must not touch state, even for a known step.
    tx.send((Uuid::new_v4(), AgentMessage::StepStarted { step_id }))
        .unwrap();
    tx.send((runbook_id, AgentMessage::StepStarted { step_id }))
        .unwrap();

    wait_until(|| async {
        orchestrator
            .execution_state()
            .await
            .step(step_id)
            .is_some()
    })
    .await;
    assert_eq!(orchestrator.execution_state().await.steps.len(), 1);
    drop(tx);
}
