//! Query Executor Module
//!
//! The engine reaches database instances only through two traits:
//! [`QueryExecutor`] runs one statement against one instance, and
//! [`Connector`] opens executors for other instances and resolves the
//! credentials and names the engine needs along the way.

mod mariadb;
#[cfg(test)]
pub(crate) mod simulated;

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::instance::Instance;

pub(crate) use mariadb::redact;
pub use mariadb::{MariaDbConnector, MariaDbExecutor};

/// One result row, values in column order, NULL as `None`
pub type Row = Vec<Option<String>>;

/// Outcome of a successful statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column names as reported by the server
    pub fields: Vec<String>,
    /// Rows in server order
    pub rows: Vec<Row>,
    /// Rows affected for statements that return no result set
    pub rows_affected: u64,
}

impl QueryResult {
    pub fn numrows(&self) -> usize {
        self.rows.len()
    }

    /// First row keyed by lower-cased column name
    pub fn first_row_map(&self) -> Option<BTreeMap<String, Option<String>>> {
        let row = self.rows.first()?;
        Some(
            self.fields
                .iter()
                .map(|f| f.to_lowercase())
                .zip(row.iter().cloned())
                .collect(),
        )
    }
}

/// Executes SQL against a single instance
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// The instance this executor is connected to
    fn instance(&self) -> &Instance;

    /// Run one statement, optionally bounded by `timeout`
    async fn execute(&self, sql: &str, timeout: Option<Duration>) -> Result<QueryResult>;
}

/// Credentials written into `CHANGE MASTER TO`
#[derive(Clone)]
pub struct ReplicationCredentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for ReplicationCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opens executors and resolves connection-level details
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open an exclusive connection to `instance`
    async fn connect(&self, instance: &Instance) -> Result<Arc<dyn QueryExecutor>>;

    /// Credentials replicas use to authenticate against their master
    fn replication_credentials(&self) -> Result<ReplicationCredentials>;

    /// Reverse-resolve an address to a hostname
    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Result<String>;
}
