//! Replication Module
//!
//! The topology engine. A [`Replication`] handle wraps an open connection to
//! one instance and exposes status snapshots, relationship checks, thread
//! control and topology moves for it.

mod classify;
mod mover;
mod sync;
mod threads;

use std::sync::Arc;
use std::time::Duration;

use crate::config::TopologyConfig;
use crate::error::{Error, Result};
use crate::executor::{Connector, QueryExecutor, QueryResult};
use crate::instance::Instance;
use crate::status::{GtidMode, MasterStatus, SlaveStatus};

pub use classify::{
    are_siblings, caught_up, classify, is_direct_replica_of, Lineage, Relationship,
};
pub use mover::{MoveReport, MoveStrategy};
pub use threads::ChangeMaster;

/// Timing knobs for the engine
#[derive(Debug, Clone)]
pub struct ReplicationOptions {
    /// Statement timeout, polling bound and acceptable lag
    pub timeout: Duration,
    /// Pause between stopping a replica and its sibling
    pub sync_grace: Duration,
    /// Thread start/stop confirmation interval
    pub poll_interval: Duration,
    /// Convergence check interval
    pub sync_poll_interval: Duration,
    /// MASTER_SSL value for CHANGE MASTER
    pub master_ssl: bool,
    /// Concurrency cap for replica verification
    pub max_parallel_connections: usize,
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            sync_grace: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            sync_poll_interval: Duration::from_secs(1),
            master_ssl: true,
            max_parallel_connections: 16,
        }
    }
}

impl ReplicationOptions {
    pub fn from_config(topology: &TopologyConfig, master_ssl: bool) -> Self {
        Self {
            timeout: topology.timeout(),
            sync_grace: topology.sync_grace(),
            poll_interval: topology.poll_interval(),
            sync_poll_interval: topology.sync_poll_interval(),
            master_ssl,
            max_parallel_connections: topology.max_parallel_connections,
        }
    }
}

/// Replication control for one instance
#[derive(Clone)]
pub struct Replication {
    conn: Arc<dyn QueryExecutor>,
    connector: Arc<dyn Connector>,
    options: ReplicationOptions,
}

impl Replication {
    pub fn new(
        conn: Arc<dyn QueryExecutor>,
        connector: Arc<dyn Connector>,
        options: ReplicationOptions,
    ) -> Self {
        Self {
            conn,
            connector,
            options,
        }
    }

    /// Connect to `instance` and wrap the connection
    pub async fn connect(
        instance: &Instance,
        connector: Arc<dyn Connector>,
        options: ReplicationOptions,
    ) -> Result<Self> {
        let conn = connector.connect(instance).await?;
        Ok(Self::new(conn, connector, options))
    }

    /// Open a handle to another instance with the same connector and options
    pub async fn open(&self, instance: &Instance) -> Result<Self> {
        Self::connect(instance, Arc::clone(&self.connector), self.options.clone()).await
    }

    pub fn instance(&self) -> &Instance {
        self.conn.instance()
    }

    pub fn options(&self) -> &ReplicationOptions {
        &self.options
    }

    pub(crate) fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub(crate) async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.conn.execute(sql, Some(self.options.timeout)).await
    }

    /// `SHOW SLAVE STATUS`; `None` when the instance is not a replica
    pub async fn slave_status(&self) -> Result<Option<SlaveStatus>> {
        let result = self.execute("SHOW SLAVE STATUS").await?;
        SlaveStatus::from_result(&result)
    }

    /// `SHOW MASTER STATUS`; `None` when binary logging is disabled
    pub async fn master_status(&self) -> Result<Option<MasterStatus>> {
        let result = self.execute("SHOW MASTER STATUS").await?;
        MasterStatus::from_result(&result)
    }

    /// Slave status, failing when the instance is not a replica
    pub(crate) async fn require_slave_status(&self) -> Result<SlaveStatus> {
        self.slave_status()
            .await?
            .ok_or_else(|| Error::Precondition("The server is not configured as a slave".into()))
    }

    /// Seconds behind master as reported by SHOW SLAVE STATUS
    pub async fn lag(&self) -> Result<Option<u64>> {
        Ok(self.slave_status().await?.and_then(|s| s.lag()))
    }

    /// Current GTID mode, `None` if not a replica or unsupported by the server
    pub async fn gtid_mode(&self) -> Result<Option<GtidMode>> {
        Ok(self.slave_status().await?.and_then(|s| s.using_gtid))
    }

    /// Current master; `None` if not a replica or the status is unreadable
    pub async fn master(&self) -> Option<Instance> {
        match self.slave_status().await {
            Ok(status) => status.map(|s| s.master),
            Err(e) => {
                tracing::debug!("Could not read slave status of {}: {}", self.instance(), e);
                None
            }
        }
    }

    /// One-line human readable replication summary
    pub async fn describe(&self) -> String {
        let name = self.instance().name();
        match self.slave_status().await {
            Ok(Some(status)) => format!("{}> {}", name, status),
            Ok(None) => format!("{}> Not configured as a slave", name),
            Err(e) => format!("{}> Error reading replication status: {}", name, e),
        }
    }
}

/// Bounded wait used by every polling loop in the engine
pub(crate) struct Deadline {
    until: tokio::time::Instant,
}

impl Deadline {
    pub(crate) fn after(timeout: Duration) -> Self {
        Self {
            until: tokio::time::Instant::now() + timeout,
        }
    }

    pub(crate) fn expired(&self) -> bool {
        tokio::time::Instant::now() >= self.until
    }
}
