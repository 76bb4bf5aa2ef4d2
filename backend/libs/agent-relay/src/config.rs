//! Relay configuration: identity allow-list, type enumeration, worker timing.
//!
//! Agent names and message types live here and nowhere else. The client,
//! worker and thread validation all receive this object by injection.
//!
//! # Loading Order
//! 1. Embedded defaults (`config/defaults.toml`)
//! 2. Configuration file (if given and present)
//! 3. Environment variables prefixed `RELAY_` (highest priority), e.g.
//!    `RELAY_WORKER__POLL_INTERVAL_MS=1000` or `RELAY_AGENTS=AgentA,AgentB`

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::schema::PayloadSchema;
use crate::thread::WorkflowPattern;

const DEFAULTS: &str = include_str!("../config/defaults.toml");

/// Errors raised while loading or checking configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("Invalid configuration: {0}")]
    Semantic(String),
}

/// One entry of the message type enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MessageTypeConfig {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    /// Optional payload schema enforced on send
    #[serde(default)]
    pub payload: Option<PayloadSchema>,
}

/// Polling worker timing and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct WorkerConfig {
    /// Interval between cycles
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 10))]
    pub poll_interval_ms: u64,

    /// Maximum messages fetched per cycle
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 1000))]
    pub batch_size: usize,

    /// Consecutive failed health checks before a degraded event is raised
    #[serde(default = "default_degraded_threshold")]
    #[validate(range(min = 1))]
    pub degraded_threshold: u32,
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_batch_size() -> usize {
    50
}

fn default_degraded_threshold() -> u32 {
    3
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            degraded_threshold: default_degraded_threshold(),
        }
    }
}

/// Rules used to judge a context thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Types whose presence marks a workflow complete
    #[serde(default)]
    pub completion_types: Vec<String>,

    /// Types that block a workflow until a later completion
    #[serde(default)]
    pub blocker_types: Vec<String>,

    /// Expected type sequence, e.g. `"TASK_DELEGATION TASK_ACCEPTED PROGRESS_UPDATE* TASK_COMPLETED"`
    #[serde(default)]
    pub expected_sequence: Option<String>,
}

/// Root relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RelayConfig {
    /// Identity allow-list
    #[validate(length(min = 1))]
    pub agents: Vec<String>,

    /// Recipient every worker also polls; never a valid sender
    #[serde(default)]
    pub broadcast: Option<String>,

    /// Message type enumeration
    #[validate(length(min = 1), nested)]
    pub message_types: Vec<MessageTypeConfig>,

    #[serde(default)]
    #[validate(nested)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl RelayConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULTS, config::FileFormat::Toml));

        if let Some(path) = config_path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            } else {
                tracing::warn!(path = %path.display(), "Relay config file not found, using defaults");
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("agents")
                .with_list_parse_key("workflow.completion_types")
                .with_list_parse_key("workflow.blocker_types")
                .try_parsing(true),
        );

        let config: RelayConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Parse and validate a TOML document (no defaults, no environment).
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config in code, validated the same way as a loaded one.
    pub fn new<A, T>(agents: A, message_types: T) -> Result<Self, ConfigError>
    where
        A: IntoIterator,
        A::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        let config = RelayConfig {
            agents: agents.into_iter().map(Into::into).collect(),
            broadcast: None,
            message_types: message_types
                .into_iter()
                .map(|name| MessageTypeConfig {
                    name: name.into(),
                    payload: None,
                })
                .collect(),
            worker: WorkerConfig::default(),
            workflow: WorkflowConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Run derive validations plus cross-field checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Validate::validate(self)?;

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.trim().is_empty() {
                return Err(ConfigError::Semantic("agent names cannot be empty".into()));
            }
            if !seen.insert(agent.as_str()) {
                return Err(ConfigError::Semantic(format!("duplicate agent '{}'", agent)));
            }
        }

        if let Some(broadcast) = &self.broadcast {
            if broadcast.trim().is_empty() {
                return Err(ConfigError::Semantic("broadcast identity cannot be empty".into()));
            }
            if seen.contains(broadcast.as_str()) {
                return Err(ConfigError::Semantic(format!(
                    "broadcast identity '{}' must not also be an agent",
                    broadcast
                )));
            }
        }

        let mut types = HashSet::new();
        for message_type in &self.message_types {
            if !types.insert(message_type.name.as_str()) {
                return Err(ConfigError::Semantic(format!(
                    "duplicate message type '{}'",
                    message_type.name
                )));
            }
        }

        for name in self
            .workflow
            .completion_types
            .iter()
            .chain(&self.workflow.blocker_types)
        {
            if !types.contains(name.as_str()) {
                return Err(ConfigError::Semantic(format!(
                    "workflow references unknown message type '{}'",
                    name
                )));
            }
        }

        if let Some(sequence) = &self.workflow.expected_sequence {
            let pattern: WorkflowPattern = sequence.parse().map_err(ConfigError::Semantic)?;
            if let Some(step) = pattern
                .steps()
                .iter()
                .find(|step| !types.contains(step.message_type.as_str()))
            {
                return Err(ConfigError::Semantic(format!(
                    "expected sequence references unknown message type '{}'",
                    step.message_type
                )));
            }
        }

        Ok(())
    }

    /// Whether `name` may send or receive.
    pub fn is_agent(&self, name: &str) -> bool {
        self.agents.iter().any(|agent| agent == name)
    }

    /// Whether `name` may be addressed.
    pub fn is_recipient(&self, name: &str) -> bool {
        self.is_agent(name) || self.is_broadcast(name)
    }

    pub fn is_broadcast(&self, name: &str) -> bool {
        self.broadcast.as_deref() == Some(name)
    }

    pub fn message_type(&self, name: &str) -> Option<&MessageTypeConfig> {
        self.message_types.iter().find(|t| t.name == name)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;

    const SAMPLE: &str = r#"
agents = ["AgentA", "AgentB"]
broadcast = "ALL"

[[message_types]]
name = "TASK_DELEGATION"
[message_types.payload]
required = { task = "string" }

[[message_types]]
name = "TASK_COMPLETED"

[[message_types]]
name = "ERROR"

[worker]
poll_interval_ms = 250

[workflow]
completion_types = ["TASK_COMPLETED"]
blocker_types = ["ERROR"]
expected_sequence = "TASK_DELEGATION TASK_COMPLETED"
"#;

    #[test]
    fn test_from_toml_str() {
        let config = RelayConfig::from_toml_str(SAMPLE).unwrap();

        assert!(config.is_agent("AgentA"));
        assert!(!config.is_agent("ALL"));
        assert!(config.is_recipient("ALL"));
        assert!(!config.is_recipient("AgentC"));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.worker.batch_size, 50);
        assert_eq!(config.worker.degraded_threshold, 3);

        let delegation = config.message_type("TASK_DELEGATION").unwrap();
        let schema = delegation.payload.as_ref().unwrap();
        assert_eq!(schema.required.get("task"), Some(&FieldKind::String));
        assert!(config.message_type("TASK_COMPLETED").unwrap().payload.is_none());
        assert!(config.message_type("UNKNOWN").is_none());
    }

    #[test]
    fn test_new_uses_worker_defaults() {
        let config = RelayConfig::new(["A", "B"], ["X"]).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert!(config.broadcast.is_none());
    }

    #[test]
    fn test_rejects_empty_lists() {
        let err = RelayConfig::new(Vec::<String>::new(), ["X"]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = RelayConfig::new(["A"], Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_duplicates_and_bad_broadcast() {
        let err = RelayConfig::new(["A", "A"], ["X"]).unwrap_err();
        assert!(matches!(err, ConfigError::Semantic(_)));

        let err = RelayConfig::new(["A"], ["X", "X"]).unwrap_err();
        assert!(matches!(err, ConfigError::Semantic(_)));

        let mut config = RelayConfig::new(["A", "B"], ["X"]).unwrap();
        config.broadcast = Some("A".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Semantic(_))));
    }

    #[test]
    fn test_rejects_unknown_workflow_types() {
        let mut config = RelayConfig::new(["A"], ["X"]).unwrap();
        config.workflow.completion_types = vec!["Y".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::Semantic(_))));

        config.workflow.completion_types = vec!["X".to_string()];
        config.workflow.expected_sequence = Some("X Y*".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Semantic(_))));

        config.workflow.expected_sequence = Some("X+".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_worker_settings() {
        let mut config = RelayConfig::new(["A"], ["X"]).unwrap();
        config.worker.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.worker.batch_size = 10;
        config.worker.poll_interval_ms = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    #[serial_test::serial]
    fn test_load_embedded_defaults_with_env_override() {
        std::env::set_var("RELAY_WORKER__POLL_INTERVAL_MS", "1500");
        let config = RelayConfig::load(None);
        std::env::remove_var("RELAY_WORKER__POLL_INTERVAL_MS");

        let config = config.unwrap();
        assert_eq!(config.worker.poll_interval_ms, 1500);
        assert!(!config.agents.is_empty());
        assert!(!config.message_types.is_empty());
    }
}
