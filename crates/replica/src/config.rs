//! Cluster Configuration
//!
//! One JSON file describes the whole cluster and is shared by every replica and
//! by the workload client.

use bank_consensus::ReplicaId;
use bank_ledger::{Amount, DEFAULT_INITIAL_ACCOUNTS, DEFAULT_INITIAL_BALANCE};
use bank_rpc::ResolverConfig;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid cluster config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Cluster config lists no replicas")]
    Empty,

    #[error("Replica id {0} listed more than once")]
    DuplicateId(ReplicaId),

    #[error("Replica id {0} is not in the cluster config")]
    UnknownReplica(ReplicaId),
}

/// Where one replica listens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaEndpoint {
    pub id: ReplicaId,
    pub host: String,
    pub port: u16,
}

impl ReplicaEndpoint {
    /// `host:port`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub replicas: Vec<ReplicaEndpoint>,
    #[serde(default = "default_initial_accounts")]
    pub initial_accounts: u32,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Amount,
    /// First retry delay while resolving peers
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
    #[serde(default = "default_connect_backoff_max_ms")]
    pub connect_backoff_max_ms: u64,
    /// Timeout of a single call to a replica
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_initial_accounts() -> u32 {
    DEFAULT_INITIAL_ACCOUNTS
}

fn default_initial_balance() -> Amount {
    DEFAULT_INITIAL_BALANCE
}

fn default_connect_backoff_ms() -> u64 {
    250
}

fn default_connect_backoff_max_ms() -> u64 {
    5_000
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl ClusterConfig {
    /// Read and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate config text
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replicas.is_empty() {
            return Err(ConfigError::Empty);
        }
        let mut seen = HashSet::new();
        for endpoint in &self.replicas {
            if !seen.insert(endpoint.id) {
                return Err(ConfigError::DuplicateId(endpoint.id));
            }
        }
        Ok(())
    }

    pub fn endpoint(&self, id: ReplicaId) -> Result<&ReplicaEndpoint, ConfigError> {
        self.replicas
            .iter()
            .find(|e| e.id == id)
            .ok_or(ConfigError::UnknownReplica(id))
    }

    /// Every replica except `id`
    pub fn peers_of(&self, id: ReplicaId) -> impl Iterator<Item = &ReplicaEndpoint> {
        self.replicas.iter().filter(move |e| e.id != id)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Retry policy for peer resolution
    pub fn resolver(&self) -> ResolverConfig {
        ResolverConfig {
            backoff: Duration::from_millis(self.connect_backoff_ms),
            backoff_max: Duration::from_millis(self.connect_backoff_max_ms),
            request_timeout: self.request_timeout(),
            max_attempts: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const THREE: &str = r#"{
        "replicas": [
            { "id": 0, "host": "127.0.0.1", "port": 8013 },
            { "id": 1, "host": "127.0.0.1", "port": 8014 },
            { "id": 2, "host": "localhost", "port": 8015 }
        ]
    }"#;

    #[test]
    fn test_defaults_applied() {
        let config = ClusterConfig::from_json(THREE).unwrap();
        assert_eq!(config.initial_accounts, 20);
        assert_eq!(config.initial_balance, 1000);
        assert_eq!(config.request_timeout(), Duration::from_secs(300));

        let resolver = config.resolver();
        assert_eq!(resolver.backoff, Duration::from_millis(250));
        assert_eq!(resolver.backoff_max, Duration::from_secs(5));
        assert_eq!(resolver.max_attempts, None);
    }

    #[test]
    fn test_endpoints_and_peers() {
        let config = ClusterConfig::from_json(THREE).unwrap();
        assert_eq!(config.endpoint(2).unwrap().addr(), "localhost:8015");
        assert!(matches!(
            config.endpoint(9),
            Err(ConfigError::UnknownReplica(9))
        ));

        let peers: Vec<_> = config.peers_of(1).map(|e| e.id).collect();
        assert_eq!(peers, vec![0, 2]);
    }

    #[test]
    fn test_rejects_bad_clusters() {
        assert!(matches!(
            ClusterConfig::from_json(r#"{ "replicas": [] }"#),
            Err(ConfigError::Empty)
        ));
        assert!(matches!(
            ClusterConfig::from_json(
                r#"{ "replicas": [
                    { "id": 1, "host": "a", "port": 1 },
                    { "id": 1, "host": "b", "port": 2 }
                ] }"#
            ),
            Err(ConfigError::DuplicateId(1))
        ));
        assert!(matches!(
            ClusterConfig::from_json("replicas: 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "replicas": [{{ "id": 0, "host": "h", "port": 9 }}], "initial_accounts": 5, "initial_balance": 10 }}"#
        )
        .unwrap();

        let config = ClusterConfig::load(file.path()).unwrap();
        assert_eq!(config.initial_accounts, 5);
        assert_eq!(config.initial_balance, 10);

        assert!(matches!(
            ClusterConfig::load("/nonexistent/cluster.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
