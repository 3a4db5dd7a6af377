//! Error types for the runbook core library.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E1001-E1099 | State machine | Invalid runbook/step transitions and mode misuse |
//! | E2001-E2099 | Config | Agent configuration and validation errors |
//! | E3001-E3099 | Agent link | Transport and agent-reported execution errors |
//! | E4001-E4099 | Protocol | Malformed inbound messages (observed, never surfaced) |
//! | E5001-E5099 | General | IO and serialization errors |

use thiserror::Error;

/// The main error type for runbook orchestration.
///
/// Step-level failures (a step marked `failed`) are *not* represented here;
/// they are ordinary outcomes recorded in state and history. Only contract
/// violations and connection/configuration failures are errors.
#[derive(Debug, Error)]
pub enum RunbookError {
    // ========================================================================
    // State machine errors (E1001-E1099)
    // ========================================================================
    /// Operation requires a different runbook status
    #[error("[E1001] Invalid state: {0}")]
    InvalidState(String),

    /// Advance targeted a step that is not currently running
    #[error("[E1002] Invalid transition for step {step_id}: {message}")]
    InvalidTransition { step_id: String, message: String },

    /// Manual advance attempted while the runbook ran (or runs) in auto mode
    #[error("[E1003] Wrong mode: {0}")]
    WrongMode(String),

    /// A run is already in flight for this runbook
    #[error("[E1004] Runbook '{0}' is already running")]
    AlreadyRunning(String),

    // ========================================================================
    // Configuration errors (E2001-E2099)
    // ========================================================================
    /// Auto mode requested without valid agent credentials
    #[error("[E2001] Configuration error: {0}")]
    Configuration(String),

    // ========================================================================
    // Agent link errors (E3001-E3099)
    // ========================================================================
    /// Transport failed to open or dropped unexpectedly
    #[error("[E3001] Connection error: {0}")]
    Connection(String),

    /// Agent-reported fatal execution failure
    #[error("[E3002] Execution error: {0}")]
    Execution(String),

    // ========================================================================
    // Protocol errors (E4001-E4099)
    // ========================================================================
    /// Malformed or unrecognized inbound message. Constructed only for drop
    /// accounting; inbound handling discards these without surfacing them.
    #[error("[E4001] Protocol error: {0}")]
    Protocol(String),

    // ========================================================================
    // General errors (E5001-E5099)
    // ========================================================================
    /// IO error (history file access)
    #[error("[E5001] IO error: {0}")]
    Io(String),

    /// Serialization/deserialization error
    #[error("[E5002] Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for runbook operations.
pub type RunbookResult<T> = Result<T, RunbookError>;

impl From<std::io::Error> for RunbookError {
    fn from(err: std::io::Error) -> Self {
        RunbookError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RunbookError {
    fn from(err: serde_json::Error) -> Self {
        RunbookError::Serialization(err.to_string())
    }
}

impl RunbookError {
    /// Returns true for caller-contract violations in the state machines.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            RunbookError::InvalidState(_)
                | RunbookError::InvalidTransition { .. }
                | RunbookError::WrongMode(_)
                | RunbookError::AlreadyRunning(_)
        )
    }

    /// Returns true if this error relates to the agent link.
    pub fn is_agent_error(&self) -> bool {
        matches!(
            self,
            RunbookError::Connection(_) | RunbookError::Execution(_)
        )
    }

    /// Returns an error code suitable for logging or external reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            RunbookError::InvalidState(_) => "E1001",
            RunbookError::InvalidTransition { .. } => "E1002",
            RunbookError::WrongMode(_) => "E1003",
            RunbookError::AlreadyRunning(_) => "E1004",
            RunbookError::Configuration(_) => "E2001",
            RunbookError::Connection(_) => "E3001",
            RunbookError::Execution(_) => "E3002",
            RunbookError::Protocol(_) => "E4001",
            RunbookError::Io(_) => "E5001",
            RunbookError::Serialization(_) => "E5002",
        }
    }

    /// Returns a user-friendly suggestion for how to resolve this error.
    pub fn user_suggestion(&self) -> Option<&'static str> {
        match self {
            RunbookError::InvalidState(_) => {
                Some("Reset the runbook to idle before editing or starting it")
            }
            RunbookError::WrongMode(_) => {
                Some("Reset the runbook before switching between manual and auto execution")
            }
            RunbookError::AlreadyRunning(_) => {
                Some("Wait for the current run to finish or cancel it first")
            }
            RunbookError::Configuration(_) => {
                Some("Check the AI provider and API key in the agent configuration")
            }
            RunbookError::Connection(_) => {
                Some("Check that the agent process is running and the endpoint is reachable")
            }
            _ => None,
        }
    }
}
