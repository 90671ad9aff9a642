//! Replica Discovery Module
//!
//! Finds the replicas currently connected to an instance through
//! `SHOW SLAVE HOSTS` and verifies each candidate concurrently.
//!
//! Only replicas whose IO thread is connected are listed by the server.
//! Replicas without `report_host` are found by treating their server id as a
//! packed IPv4 address and resolving it back to a name.

mod tree;

use std::net::Ipv4Addr;

use futures::stream::{self, StreamExt};

use crate::error::{Error, Result};
use crate::executor::QueryResult;
use crate::instance::{Instance, DEFAULT_PORT};
use crate::replication::Replication;

pub use tree::{replication_tree, TreeNode};

/// One row of `SHOW SLAVE HOSTS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveHost {
    pub server_id: u32,
    /// Empty when the replica does not set `report_host`
    pub host: String,
    /// 0 when unknown
    pub port: u16,
}

/// Parse `SHOW SLAVE HOSTS`; columns must start with `Server_id, Host, Port`
///
/// An empty result carries no column names, so it is accepted as is.
pub fn parse_slave_hosts(result: &QueryResult) -> Result<Vec<SlaveHost>> {
    if result.rows.is_empty() {
        return Ok(Vec::new());
    }

    let expected = ["Server_id", "Host", "Port"];
    if result.fields.len() < expected.len() || result.fields[..expected.len()] != expected {
        return Err(Error::Status(format!(
            "unexpected SHOW SLAVE HOSTS columns: {}",
            result.fields.join(", ")
        )));
    }

    result
        .rows
        .iter()
        .map(|row| {
            let value = |i: usize| row.get(i).cloned().flatten().unwrap_or_default();
            let server_id = value(0);
            let port = value(2);
            Ok(SlaveHost {
                server_id: server_id
                    .parse()
                    .map_err(|_| Error::Status(format!("invalid Server_id '{}'", server_id)))?,
                host: value(1),
                port: if port.is_empty() {
                    0
                } else {
                    port.parse()
                        .map_err(|_| Error::Status(format!("invalid Port '{}'", port)))?
                },
            })
        })
        .collect()
}

impl Replication {
    /// `SHOW SLAVE HOSTS` on this instance
    pub async fn slave_hosts(&self) -> Result<Vec<SlaveHost>> {
        let result = self.execute("SHOW SLAVE HOSTS").await?;
        parse_slave_hosts(&result)
    }

    /// Turn a `SHOW SLAVE HOSTS` row into an instance address
    async fn resolve(&self, host: &SlaveHost) -> Result<Instance> {
        let name = if host.host.is_empty() {
            let ip = Ipv4Addr::from(host.server_id);
            self.connector().reverse_lookup(ip).await?
        } else {
            host.host.clone()
        };
        let port = if host.port == 0 { DEFAULT_PORT } else { host.port };
        Ok(Instance::new(name, port))
    }

    /// Connect to a candidate and confirm it replicates from this instance
    async fn verify(&self, host: SlaveHost) -> Option<Replication> {
        let instance = match self.resolve(&host).await {
            Ok(instance) => instance,
            Err(e) => {
                tracing::warn!("Could not resolve replica with server id {}, skipping: {}", host.server_id, e);
                return None;
            }
        };

        let replica = match self.open(&instance).await {
            Ok(replica) => replica,
            Err(e) => {
                tracing::warn!("Could not connect to instance {}, skipping: {}", instance, e);
                return None;
            }
        };

        if replica.is_direct_replica_of(self.instance()).await {
            Some(replica)
        } else {
            tracing::warn!("{} does not replicate from {}, skipping", instance, self.instance());
            None
        }
    }

    /// Replicas currently connected to this instance, in `SHOW SLAVE HOSTS` order
    ///
    /// Candidates that cannot be resolved, reached or verified are dropped
    /// with a warning.
    pub async fn replicas(&self) -> Vec<Replication> {
        let hosts = match self.slave_hosts().await {
            Ok(hosts) => hosts,
            Err(e) => {
                tracing::warn!("Could not list replicas of {}: {}", self.instance(), e);
                return Vec::new();
            }
        };
        if hosts.is_empty() {
            return Vec::new();
        }

        let limit = hosts.len().min(self.options().max_parallel_connections).max(1);
        stream::iter(hosts)
            .map(|host| self.verify(host))
            .buffered(limit)
            .filter_map(|replica| async move { replica })
            .collect()
            .await
    }
}
