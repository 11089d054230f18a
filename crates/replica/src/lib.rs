//! Bank Replica - process-level pieces shared by the replica and client binaries

pub mod config;

pub use config::{ClusterConfig, ConfigError, ReplicaEndpoint};
