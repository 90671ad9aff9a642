//! MariaDB Executor
//!
//! sqlx-backed implementation of the executor traits.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlDatabaseError, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use sqlx::{Column, Executor, Row};

use super::{Connector, QueryExecutor, QueryResult, ReplicationCredentials};
use crate::config::{ConnectionConfig, ReplicationUserConfig};
use crate::error::{Error, Result, LOCAL_ERRNO};
use crate::instance::Instance;

/// Executor holding a single dedicated connection to one instance
pub struct MariaDbExecutor {
    instance: Instance,
    pool: MySqlPool,
}

impl MariaDbExecutor {
    /// Connect to an instance
    pub async fn connect(instance: &Instance, config: &ConnectionConfig) -> Result<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(&instance.host)
            .port(instance.port)
            .username(&config.user)
            .password(&config.password)
            .charset("utf8mb4");

        if let Some(socket) = &instance.socket {
            options = options.socket(socket);
        }

        options = match &config.ssl_ca {
            Some(ca) if instance.socket.is_none() => {
                options.ssl_mode(MySqlSslMode::VerifyCa).ssl_ca(ca)
            }
            _ => options.ssl_mode(MySqlSslMode::Preferred),
        };

        tracing::debug!("Connecting to {}", instance);

        // One connection: the caller owns it for the whole operation
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| Error::ConnectionFailed {
                address: instance.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            instance: instance.clone(),
            pool,
        })
    }

    async fn run(&self, sql: &str) -> Result<QueryResult> {
        if !returns_rows(sql) {
            // A plain &str goes through the text protocol; replication
            // statements are not all preparable.
            let done = (&self.pool).execute(sql).await.map_err(query_error)?;
            return Ok(QueryResult {
                rows_affected: done.rows_affected(),
                ..Default::default()
            });
        }

        let rows = (&self.pool).fetch_all(sql).await.map_err(query_error)?;

        let fields = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(row.len());
            for i in 0..row.len() {
                // Text protocol: every value arrives as its textual form
                let value: Option<String> = row.try_get_unchecked(i).map_err(query_error)?;
                values.push(value);
            }
            out.push(values);
        }

        Ok(QueryResult {
            fields,
            rows: out,
            rows_affected: 0,
        })
    }
}

#[async_trait]
impl QueryExecutor for MariaDbExecutor {
    fn instance(&self) -> &Instance {
        &self.instance
    }

    async fn execute(&self, sql: &str, timeout: Option<Duration>) -> Result<QueryResult> {
        tracing::debug!("Executing on {}: {}", self.instance, redact(sql));

        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(sql))
                .await
                .map_err(|_| Error::ConnectionTimeout(format!("{} after {:?}", self.instance, limit)))?,
            None => self.run(sql).await,
        }
    }
}

/// Connector opening [`MariaDbExecutor`]s from the configured credentials
pub struct MariaDbConnector {
    connection: ConnectionConfig,
    replication: ReplicationUserConfig,
}

impl MariaDbConnector {
    pub fn new(connection: ConnectionConfig, replication: ReplicationUserConfig) -> Self {
        Self {
            connection,
            replication,
        }
    }

    /// Apply the local socket to `localhost` addresses
    fn endpoint(&self, instance: &Instance) -> Instance {
        match (&instance.socket, &self.connection.socket) {
            (None, Some(socket)) if instance.host == "localhost" => {
                instance.clone().with_socket(socket)
            }
            _ => instance.clone(),
        }
    }
}

#[async_trait]
impl Connector for MariaDbConnector {
    async fn connect(&self, instance: &Instance) -> Result<Arc<dyn QueryExecutor>> {
        let endpoint = self.endpoint(instance);
        let executor = MariaDbExecutor::connect(&endpoint, &self.connection).await?;
        Ok(Arc::new(executor))
    }

    fn replication_credentials(&self) -> Result<ReplicationCredentials> {
        if self.replication.user.is_empty() {
            return Err(Error::Config("replication.user is not set".into()));
        }
        Ok(ReplicationCredentials {
            user: self.replication.user.clone(),
            password: self.replication.password.clone(),
        })
    }

    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Result<String> {
        tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&IpAddr::V4(ip)))
            .await
            .map_err(|e| Error::Internal(format!("reverse lookup task failed: {}", e)))?
            .map_err(|e| Error::Resolve {
                address: ip.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Statements whose result set we need to read back
fn returns_rows(sql: &str) -> bool {
    let upper = sql.trim_start().to_uppercase();
    upper.starts_with("SHOW") || upper.starts_with("SELECT")
}

/// Convert a sqlx error into the executor error shape
///
/// Server errors keep their errno; anything else stays a driver error.
fn query_error(e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::Database(db) => Error::Query {
            errno: db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(|m| i32::from(m.number()))
                .unwrap_or(LOCAL_ERRNO),
            errmsg: db.message().to_string(),
        },
        other => Error::Database(other),
    }
}

/// Hide the password in CHANGE MASTER statements before logging
pub(crate) fn redact(sql: &str) -> String {
    const KEY: &str = "MASTER_PASSWORD='";
    match sql.find(KEY) {
        Some(start) => {
            let value_start = start + KEY.len();
            let mut end = value_start;
            let bytes = sql.as_bytes();
            while end < bytes.len() {
                if bytes[end] == b'\\' {
                    end += 2;
                    continue;
                }
                if bytes[end] == b'\'' {
                    if bytes.get(end + 1) == Some(&b'\'') {
                        end += 2;
                        continue;
                    }
                    break;
                }
                end += 1;
            }
            let end = end.min(sql.len());
            format!("{}****{}", &sql[..value_start], &sql[end..])
        }
        None => sql.to_string(),
    }
}
