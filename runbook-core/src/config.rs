use std::collections::HashMap;
use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{RunbookError, RunbookResult};

/// Process-level orchestrator configuration, loaded once at startup.
///
/// Layered from an optional config file plus `RUNBOOK_`-prefixed environment
/// variables. The agent endpoint is resolved here and fixed for the lifetime
/// of an orchestrator; it is not configurable per call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrchestratorConfig {
    pub agent: AgentEndpointConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEndpointConfig {
    #[serde(default = "default_agent_host")]
    pub host: String,

    #[serde(default = "default_agent_port")]
    pub port: u16,
}

impl AgentEndpointConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AgentEndpointConfig {
    fn default() -> Self {
        Self {
            host: default_agent_host(),
            port: default_agent_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Path of the serialized history blob. Defaults to
    /// `<data_dir>/runbook/history.json` when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_history_max_entries")]
    pub max_entries: usize,
}

impl HistoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_history_path)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_entries: default_history_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_agent_host() -> String {
    "127.0.0.1".to_string()
}

fn default_agent_port() -> u16 {
    8765
}

fn default_history_max_entries() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_history_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("runbook")
        .join("history.json")
}

impl OrchestratorConfig {
    /// Load configuration from an optional file and the environment.
    ///
    /// Missing file is fine; environment variables override file values
    /// (`RUNBOOK_AGENT__HOST`, `RUNBOOK_AGENT__PORT`, ...).
    pub fn load(config_path: Option<&std::path::Path>) -> RunbookResult<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder = builder.add_source(Environment::with_prefix("RUNBOOK").separator("__"));

        let config = builder
            .build()
            .map_err(|e| RunbookError::Configuration(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| RunbookError::Configuration(e.to_string()))
    }
}

/// Per-run agent configuration, forwarded to the agent with
/// `execute_runbook`. Connector credentials are opaque to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub ai_provider: String,
    pub ai_api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,
    #[serde(default)]
    pub providers: HashMap<String, ConnectorCredentials>,
}

/// Credentials for one monitoring connector, passed through verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectorCredentials {
    #[serde(flatten)]
    pub values: HashMap<String, String>,
}

impl AgentConfig {
    /// Validate that auto mode has what it needs before any connection is
    /// attempted.
    pub fn validate(&self) -> RunbookResult<()> {
        if self.ai_provider.trim().is_empty() {
            return Err(RunbookError::Configuration(
                "AI provider is required for auto execution".to_string(),
            ));
        }
        if self.ai_api_key.trim().is_empty() {
            return Err(RunbookError::Configuration(
                "AI API key is required for auto execution".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.agent.host, "127.0.0.1");
        assert_eq!(config.agent.port, 8765);
        assert_eq!(config.history.max_entries, 50);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_endpoint_formatting() {
        let endpoint = AgentEndpointConfig {
            host: "agent.internal".to_string(),
            port: 9000,
        };
        assert_eq!(endpoint.endpoint(), "agent.internal:9000");
    }

    #[test]
    fn test_agent_config_validation() {
        let mut config = AgentConfig {
            ai_provider: "anthropic".to_string(),
            ai_api_key: "sk-test".to_string(),
            ai_model: None,
            providers: HashMap::new(),
        };
        assert!(config.validate().is_ok());

        config.ai_api_key = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "E2001");

        config.ai_api_key = "sk-test".to_string();
        config.ai_provider = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_agent_config_wire_shape() {
        let mut providers = HashMap::new();
        let mut values = HashMap::new();
        values.insert("api_key".to_string(), "pd-123".to_string());
        providers.insert("pagerduty".to_string(), ConnectorCredentials { values });

        let config = AgentConfig {
            ai_provider: "openai".to_string(),
            ai_api_key: "sk-abc".to_string(),
            ai_model: Some("gpt-4o".to_string()),
            providers,
        };

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["aiProvider"], "openai");
        assert_eq!(json["aiModel"], "gpt-4o");
        assert_eq!(json["providers"]["pagerduty"]["api_key"], "pd-123");
    }
}
