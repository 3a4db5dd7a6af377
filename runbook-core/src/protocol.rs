//! Wire contract with the remote agent.
//!
//! Every message is a JSON envelope `{ "type", "runbookId", "payload" }`
//! sent over a persistent bidirectional channel. Decoding is deliberately
//! forgiving: malformed or unrecognized inbound messages decode to `None`
//! and the caller accounts for the drop.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::RunbookResult;
use crate::models::{OverallStatus, RunbookStep, StepVerdict};

/// Origin of a `step_data` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Retrieval,
    Reasoning,
}

/// Messages sent from the orchestrator to the agent.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    ExecuteRunbook {
        title: String,
        steps: Vec<RunbookStep>,
        config: AgentConfig,
    },
    CancelExecution,
}

impl ClientMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            ClientMessage::ExecuteRunbook { .. } => "execute_runbook",
            ClientMessage::CancelExecution => "cancel_execution",
        }
    }
}

/// Messages streamed from the agent to the orchestrator.
#[derive(Debug, Clone)]
pub enum AgentMessage {
    StepStarted {
        step_id: Uuid,
    },
    StepData {
        step_id: Uuid,
        data: String,
        source: DataSource,
    },
    StepCompleted {
        step_id: Uuid,
        verdict: StepVerdict,
    },
    ExecutionCompleted {
        conclusion: String,
        overall_status: OverallStatus,
    },
    ExecutionError {
        error: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "runbookId")]
    runbook_id: Uuid,
    payload: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutePayload {
    title: String,
    steps: Vec<RunbookStep>,
    config: AgentConfig,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepStartedPayload {
    step_id: Uuid,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepDataPayload {
    step_id: Uuid,
    data: String,
    source: DataSource,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepCompletedPayload {
    step_id: Uuid,
    verdict: StepVerdict,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionCompletedPayload {
    conclusion: String,
    overall_status: OverallStatus,
}

#[derive(Serialize, Deserialize)]
struct ExecutionErrorPayload {
    error: String,
}

/// Serialize an outbound message as one JSON envelope.
pub fn encode_client_message(runbook_id: Uuid, message: &ClientMessage) -> RunbookResult<String> {
    let payload = match message {
        ClientMessage::ExecuteRunbook {
            title,
            steps,
            config,
        } => serde_json::to_value(ExecutePayload {
            title: title.clone(),
            steps: steps.clone(),
            config: config.clone(),
        })?,
        ClientMessage::CancelExecution => serde_json::json!({}),
    };

    let envelope = Envelope {
        kind: message.message_type().to_string(),
        runbook_id,
        payload,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Serialize an agent-side message. Used by mock agents and the demo agent
/// in tests and tooling.
pub fn encode_agent_message(runbook_id: Uuid, message: &AgentMessage) -> RunbookResult<String> {
    let (kind, payload) = match message {
        AgentMessage::StepStarted { step_id } => (
            "step_started",
            serde_json::to_value(StepStartedPayload { step_id: *step_id })?,
        ),
        AgentMessage::StepData {
            step_id,
            data,
            source,
        } => (
            "step_data",
            serde_json::to_value(StepDataPayload {
                step_id: *step_id,
                data: data.clone(),
                source: *source,
            })?,
        ),
        AgentMessage::StepCompleted { step_id, verdict } => (
            "step_completed",
            serde_json::to_value(StepCompletedPayload {
                step_id: *step_id,
                verdict: verdict.clone(),
            })?,
        ),
        AgentMessage::ExecutionCompleted {
            conclusion,
            overall_status,
        } => (
            "execution_completed",
            serde_json::to_value(ExecutionCompletedPayload {
                conclusion: conclusion.clone(),
                overall_status: *overall_status,
            })?,
        ),
        AgentMessage::ExecutionError { error } => (
            "execution_error",
            serde_json::to_value(ExecutionErrorPayload {
                error: error.clone(),
            })?,
        ),
    };

    let envelope = Envelope {
        kind: kind.to_string(),
        runbook_id,
        payload,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Decode one inbound line into an agent message.
///
/// Returns `None` for anything malformed: bad JSON, unknown type, or a
/// payload missing required fields. Callers count these drops; nothing is
/// surfaced.
pub fn decode_agent_message(line: &str) -> Option<(Uuid, AgentMessage)> {
    let envelope: Envelope = serde_json::from_str(line).ok()?;
    let runbook_id = envelope.runbook_id;

    let message = match envelope.kind.as_str() {
        "step_started" => {
            let p: StepStartedPayload = serde_json::from_value(envelope.payload).ok()?;
            AgentMessage::StepStarted { step_id: p.step_id }
        }
        "step_data" => {
            let p: StepDataPayload = serde_json::from_value(envelope.payload).ok()?;
            AgentMessage::StepData {
                step_id: p.step_id,
                data: p.data,
                source: p.source,
            }
        }
        "step_completed" => {
            let p: StepCompletedPayload = serde_json::from_value(envelope.payload).ok()?;
            AgentMessage::StepCompleted {
                step_id: p.step_id,
                verdict: p.verdict,
            }
        }
        "execution_completed" => {
            let p: ExecutionCompletedPayload = serde_json::from_value(envelope.payload).ok()?;
            AgentMessage::ExecutionCompleted {
                conclusion: p.conclusion,
                overall_status: p.overall_status,
            }
        }
        "execution_error" => {
            let p: ExecutionErrorPayload = serde_json::from_value(envelope.payload).ok()?;
            AgentMessage::ExecutionError { error: p.error }
        }
        _ => return None,
    };

    Some((runbook_id, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VerdictStatus;

    #[test]
    fn test_execute_runbook_envelope() {
        let runbook_id = Uuid::new_v4();
        let step = RunbookStep::new("Check alerts", "PagerDuty queue");
        let message = ClientMessage::ExecuteRunbook {
            title: "Triage".to_string(),
            steps: vec![step],
            config: AgentConfig {
                ai_provider: "anthropic".to_string(),
                ai_api_key: "sk-test".to_string(),
                ..Default::default()
            },
        };

        let line = encode_client_message(runbook_id, &message).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "execute_runbook");
        assert_eq!(value["runbookId"], runbook_id.to_string());
        assert_eq!(value["payload"]["title"], "Triage");
        assert_eq!(value["payload"]["config"]["aiProvider"], "anthropic");
        assert_eq!(value["payload"]["steps"][0]["label"], "Check alerts");
    }

    #[test]
    fn test_cancel_envelope_has_empty_payload() {
        let runbook_id = Uuid::new_v4();
        let line = encode_client_message(runbook_id, &ClientMessage::CancelExecution).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "cancel_execution");
        assert_eq!(value["payload"], serde_json::json!({}));
    }

    #[test]
    fn test_agent_message_roundtrip() {
        let runbook_id = Uuid::new_v4();
        let step_id = Uuid::new_v4();
        let message = AgentMessage::StepCompleted {
            step_id,
            verdict: StepVerdict {
                status: VerdictStatus::Passed,
                confidence: 0.92,
                explanation: "within bounds".to_string(),
                suggestions: vec![],
                raw_data: None,
            },
        };

        let line = encode_agent_message(runbook_id, &message).unwrap();
        let (decoded_id, decoded) = decode_agent_message(&line).unwrap();
        assert_eq!(decoded_id, runbook_id);
        match decoded {
            AgentMessage::StepCompleted { step_id: id, verdict } => {
                assert_eq!(id, step_id);
                assert_eq!(verdict.status, VerdictStatus::Passed);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_step_data_source() {
        let runbook_id = Uuid::new_v4();
        let step_id = Uuid::new_v4();
        let line = encode_agent_message(
            runbook_id,
            &AgentMessage::StepData {
                step_id,
                data: "analyzing trend".to_string(),
                source: DataSource::Reasoning,
            },
        )
        .unwrap();

        assert!(line.contains("\"reasoning\""));
        let (_, decoded) = decode_agent_message(&line).unwrap();
        assert!(matches!(
            decoded,
            AgentMessage::StepData {
                source: DataSource::Reasoning,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        assert!(decode_agent_message("not json").is_none());
        assert!(decode_agent_message("{}").is_none());

        // Unknown type
        let line = format!(
            r#"{{"type":"step_paused","runbookId":"{}","payload":{{}}}}"#,
            Uuid::new_v4()
        );
        assert!(decode_agent_message(&line).is_none());

        // Missing required payload field
        let line = format!(
            r#"{{"type":"step_started","runbookId":"{}","payload":{{}}}}"#,
            Uuid::new_v4()
        );
        assert!(decode_agent_message(&line).is_none());
    }
}
