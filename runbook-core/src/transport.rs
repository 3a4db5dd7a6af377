//! Session-scoped, ordered, bidirectional channel to the agent.
//!
//! The orchestrator owns exactly one session per run and tears it down on
//! terminal outcome or cancellation. Sessions are never shared or reused.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{RunbookError, RunbookResult};
use crate::protocol::{decode_agent_message, encode_client_message, AgentMessage, ClientMessage};

/// Opens sessions against the agent endpoint.
#[async_trait]
pub trait AgentConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> RunbookResult<Box<dyn AgentSession>>;
}

/// One live conversation with the agent.
#[async_trait]
pub trait AgentSession: Send {
    /// Send one message. Errors are connection failures, never agent NAKs.
    async fn send(&mut self, runbook_id: Uuid, message: &ClientMessage) -> RunbookResult<()>;

    /// Next decodable inbound message, with the envelope's runbook id.
    /// `None` means the stream closed or dropped.
    async fn next_message(&mut self) -> Option<(Uuid, AgentMessage)>;

    /// Tear the session down without waiting for any agent acknowledgment.
    async fn close(&mut self);

    /// Inbound lines discarded because they failed to decode.
    fn dropped_messages(&self) -> u64;
}

/// Connector for agents speaking newline-delimited JSON over TCP.
#[derive(Debug, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentConnector for TcpConnector {
    async fn connect(&self, endpoint: &str) -> RunbookResult<Box<dyn AgentSession>> {
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| RunbookError::Connection(format!("{}: {}", endpoint, e)))?;
        debug!(endpoint, "Connected to agent");

        let (read_half, write_half) = stream.into_split();
        Ok(Box::new(TcpSession {
            lines: BufReader::new(read_half).lines(),
            writer: Some(write_half),
            dropped: 0,
        }))
    }
}

struct TcpSession {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: Option<OwnedWriteHalf>,
    dropped: u64,
}

#[async_trait]
impl AgentSession for TcpSession {
    async fn send(&mut self, runbook_id: Uuid, message: &ClientMessage) -> RunbookResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(RunbookError::Connection("session is closed".to_string()));
        };

        let mut line = encode_client_message(runbook_id, message)?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| RunbookError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn next_message(&mut self) -> Option<(Uuid, AgentMessage)> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => match decode_agent_message(&line) {
                    Some(decoded) => return Some(decoded),
                    None => {
                        // Silent drop by design; only the counter records it.
                        self.dropped += 1;
                        warn!(dropped = self.dropped, "Discarded undecodable agent message");
                    }
                },
                Ok(None) => return None,
                Err(e) => {
                    debug!("Agent stream read failed: {}", e);
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            // Best-effort shutdown; the agent observing the closed socket
            // handles its own cleanup.
            let _ = writer.shutdown().await;
        }
    }

    fn dropped_messages(&self) -> u64 {
        self.dropped
    }
}
