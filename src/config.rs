//! WolfTopo Configuration
//!
//! This module provides configuration structures for the replication
//! topology engine and the `wolftopo` command line tool.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main WolfTopo configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolfTopoConfig {
    /// How the engine connects to instances
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Credentials written into CHANGE MASTER TO
    pub replication: ReplicationUserConfig,

    /// Engine timing and concurrency
    #[serde(default)]
    pub topology: TopologyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Administrative connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database user
    #[serde(default = "default_user")]
    pub user: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Port used when an address does not specify one
    #[serde(default = "default_db_port")]
    pub default_port: u16,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// CA certificate; enables verified TLS for remote instances
    #[serde(default)]
    pub ssl_ca: Option<PathBuf>,

    /// Local socket used for `localhost`
    #[serde(default)]
    pub socket: Option<PathBuf>,
}

/// Replication account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationUserConfig {
    /// Replication user
    pub user: String,

    /// Replication password
    #[serde(default)]
    pub password: String,

    /// Use MASTER_SSL=1 when configuring replicas
    #[serde(default = "default_true")]
    pub ssl: bool,
}

/// Engine timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Statement timeout, polling bound and lag bound in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Pause between stopping two siblings in milliseconds
    #[serde(default = "default_sync_grace_ms")]
    pub sync_grace_ms: u64,

    /// Thread start/stop confirmation poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Convergence poll interval in milliseconds
    #[serde(default = "default_sync_poll_interval_ms")]
    pub sync_poll_interval_ms: u64,

    /// Maximum replicas verified concurrently during discovery
    #[serde(default = "default_max_parallel_connections")]
    pub max_parallel_connections: usize,

    /// Maximum depth of a replication tree walk
    #[serde(default = "default_max_tree_depth")]
    pub max_tree_depth: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_user() -> String {
    "root".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_sync_grace_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_sync_poll_interval_ms() -> u64 {
    1000
}

fn default_max_parallel_connections() -> usize {
    16
}

fn default_max_tree_depth() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            password: String::new(),
            default_port: default_db_port(),
            connect_timeout_secs: default_connect_timeout(),
            ssl_ca: None,
            socket: None,
        }
    }
}

impl Default for ReplicationUserConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            ssl: true,
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            sync_grace_ms: default_sync_grace_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            sync_poll_interval_ms: default_sync_poll_interval_ms(),
            max_parallel_connections: default_max_parallel_connections(),
            max_tree_depth: default_max_tree_depth(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TopologyConfig {
    /// Get the operation timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the stop-in-sync grace interval as Duration
    pub fn sync_grace(&self) -> Duration {
        Duration::from_millis(self.sync_grace_ms)
    }

    /// Get the thread confirmation poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the convergence poll interval as Duration
    pub fn sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync_poll_interval_ms)
    }
}

impl WolfTopoConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfTopoConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.replication.user.is_empty() {
            return Err(crate::Error::Config("replication.user cannot be empty".into()));
        }

        if self.connection.connect_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "connection.connect_timeout_secs must be greater than 0".into(),
            ));
        }

        let topology = &self.topology;
        if topology.timeout_ms == 0 {
            return Err(crate::Error::Config("topology.timeout_ms must be greater than 0".into()));
        }

        if topology.poll_interval_ms == 0 || topology.sync_poll_interval_ms == 0 {
            return Err(crate::Error::Config("topology poll intervals must be greater than 0".into()));
        }

        if topology.max_parallel_connections == 0 {
            return Err(crate::Error::Config(
                "topology.max_parallel_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Sample configuration written by `wolftopo init`
    pub fn sample() -> String {
        r#"[connection]
user = "root"
password = ""
default_port = 3306
connect_timeout_secs = 10
# ssl_ca = "/etc/ssl/certs/ca.pem"
# socket = "/run/mysqld/mysqld.sock"

[replication]
user = "repl"
password = "changeme"
ssl = true

[topology]
timeout_ms = 5000
sync_grace_ms = 5000
poll_interval_ms = 100
sync_poll_interval_ms = 1000
max_parallel_connections = 16
max_tree_depth = 10

[logging]
level = "info"
"#
        .to_string()
    }
}
