// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::NodeId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-node settings. Timings are in milliseconds.
///
/// Fields missing from a JSON document take their defaults, so a shared
/// file can carry just the timings while id and name come from elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Election priority; the highest live id becomes coordinator.
    pub id: NodeId,

    /// Display name shown next to this node's messages.
    pub name: String,

    /// Directory names of chat nodes are `name_prefix` followed by the id.
    /// Discovery only considers directory entries with this prefix.
    /// Default: "ChatNode_".
    pub name_prefix: String,

    /// How often the failure detector probes the coordinator.
    /// Default: 2000.
    pub probe_interval_ms: u64,

    /// How long a node waits in an election for a coordinator announcement
    /// before giving up on the round and starting over. Must be at least
    /// one probe interval, since the detector tick is what notices.
    /// Default: 6000.
    pub election_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            id: NodeId(0),
            name: "node".to_string(),
            name_prefix: "ChatNode_".to_string(),
            probe_interval_ms: 2000,
            election_timeout_ms: 6000,
        }
    }
}

impl NodeConfig {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        NodeConfig {
            id,
            name: name.into(),
            ..NodeConfig::default()
        }
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// The name this node is published under in the directory.
    pub fn directory_name(&self) -> String {
        format!("{}{}", self.name_prefix, self.id)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.name_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if self.probe_interval_ms == 0 {
            return Err(ConfigError::ZeroProbeInterval);
        }
        if self.election_timeout_ms < self.probe_interval_ms {
            return Err(ConfigError::ElectionTimeoutTooShort {
                timeout_ms: self.election_timeout_ms,
                probe_interval_ms: self.probe_interval_ms,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("node name must not be empty")]
    EmptyName,
    #[error("name_prefix must not be empty")]
    EmptyPrefix,
    #[error("probe_interval_ms must be > 0")]
    ZeroProbeInterval,
    #[error("election_timeout_ms ({timeout_ms}) must be >= probe_interval_ms ({probe_interval_ms})")]
    ElectionTimeoutTooShort {
        timeout_ms: u64,
        probe_interval_ms: u64,
    },
    #[error("malformed config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.name_prefix, "ChatNode_");
        assert_eq!(config.probe_interval(), Duration::from_secs(2));
        assert_eq!(config.election_timeout(), Duration::from_secs(6));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn directory_name_uses_prefix_and_id() {
        let config = NodeConfig::new(NodeId(7), "gus");
        assert_eq!(config.directory_name(), "ChatNode_7");
    }

    #[test]
    fn invalid_configs() {
        let mut config = NodeConfig::new(NodeId(1), "  ");
        assert_eq!(config.validate(), Err(ConfigError::EmptyName));

        config.name = "ann".into();
        config.probe_interval_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroProbeInterval));

        config.probe_interval_ms = 500;
        config.election_timeout_ms = 100;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ElectionTimeoutTooShort { .. })
        ));

        config.election_timeout_ms = 500;
        config.name_prefix = String::new();
        assert_eq!(config.validate(), Err(ConfigError::EmptyPrefix));
    }

    #[test]
    fn json_fills_in_defaults() {
        let config = NodeConfig::from_json(r#"{ "id": 4, "probe_interval_ms": 250 }"#).unwrap();
        assert_eq!(config.id, NodeId(4));
        assert_eq!(config.probe_interval_ms, 250);
        assert_eq!(config.name, "node");
        assert_eq!(config.election_timeout_ms, 6000);

        assert!(matches!(
            NodeConfig::from_json("{ \"id\": \"four\" }"),
            Err(ConfigError::Parse(_))
        ));
    }
}
