//! Replication Status Model
//!
//! Typed snapshots of `SHOW SLAVE STATUS` and `SHOW MASTER STATUS`.
//! Wire strings (`Yes`/`No`, `Slave_Pos`, ...) are parsed into closed enums
//! here; anything unrecognized is reported as [`Error::Status`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::executor::QueryResult;
use crate::instance::Instance;

/// Status columns keyed by lower-cased name
pub type StatusFields = BTreeMap<String, Option<String>>;

/// Run state of one replication thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ThreadState {
    /// Reported as `Yes`
    Running,
    /// Reported as `No`
    Stopped,
    /// IO thread trying to reach the master
    Connecting,
    /// IO thread starting up
    Preparing,
}

impl ThreadState {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "Yes" => Ok(ThreadState::Running),
            "No" => Ok(ThreadState::Stopped),
            "Connecting" => Ok(ThreadState::Connecting),
            "Preparing" => Ok(ThreadState::Preparing),
            other => Err(Error::Status(format!("unrecognized thread state '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadState::Running => "Yes",
            ThreadState::Stopped => "No",
            ThreadState::Connecting => "Connecting",
            ThreadState::Preparing => "Preparing",
        }
    }

    /// Fully running (`Yes`)
    pub fn is_running(self) -> bool {
        self == ThreadState::Running
    }

    /// Fully stopped (`No`); connecting threads are not stopped
    pub fn is_stopped(self) -> bool {
        self == ThreadState::Stopped
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replication positioning scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GtidMode {
    /// File/position based
    No,
    SlavePos,
    CurrentPos,
}

impl GtidMode {
    /// Value used in `MASTER_USE_GTID=`
    pub fn as_sql(&self) -> &'static str {
        match self {
            GtidMode::No => "no",
            GtidMode::SlavePos => "slave_pos",
            GtidMode::CurrentPos => "current_pos",
        }
    }
}

impl FromStr for GtidMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "no" => Ok(GtidMode::No),
            "slave_pos" => Ok(GtidMode::SlavePos),
            "current_pos" => Ok(GtidMode::CurrentPos),
            other => Err(Error::Status(format!("unrecognized gtid mode '{}'", other))),
        }
    }
}

impl fmt::Display for GtidMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One of the two replication threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReplicationThread {
    Io,
    Sql,
}

impl ReplicationThread {
    /// Keyword used in START/STOP SLAVE
    pub fn keyword(&self) -> &'static str {
        match self {
            ReplicationThread::Io => "IO_THREAD",
            ReplicationThread::Sql => "SQL_THREAD",
        }
    }
}

impl FromStr for ReplicationThread {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "io" => Ok(ReplicationThread::Io),
            "sql" => Ok(ReplicationThread::Sql),
            _ => Err(Error::Precondition(
                "Slave Thread can only be SQL, IO or None (default)".into(),
            )),
        }
    }
}

impl fmt::Display for ReplicationThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationThread::Io => f.write_str("IO"),
            ReplicationThread::Sql => f.write_str("SQL"),
        }
    }
}

/// A binary log coordinate
///
/// Ordering is by file name, then position. Binary log names are zero-padded,
/// so the lexical order of files matches their creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BinlogCoordinates {
    pub file: String,
    pub position: u64,
}

impl BinlogCoordinates {
    pub fn new(file: impl Into<String>, position: u64) -> Self {
        Self {
            file: file.into(),
            position,
        }
    }
}

impl fmt::Display for BinlogCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.position)
    }
}

/// Snapshot of `SHOW SLAVE STATUS`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlaveStatus {
    /// Current master (`master_host`, `master_port`)
    pub master: Instance,
    pub io_running: ThreadState,
    pub sql_running: ThreadState,
    /// Last executed master coordinate (`relay_master_log_file`, `exec_master_log_pos`)
    pub executed: BinlogCoordinates,
    /// Raw `seconds_behind_master`, NULL while the SQL thread is down
    pub seconds_behind_master: Option<String>,
    /// `using_gtid`; absent on servers without MariaDB GTID support
    pub using_gtid: Option<GtidMode>,
    pub last_io_error: String,
    pub last_sql_error: String,
    /// Every column of the row
    #[serde(skip)]
    pub fields: StatusFields,
}

impl SlaveStatus {
    /// Parse a `SHOW SLAVE STATUS` result; no rows means not a replica
    pub fn from_result(result: &QueryResult) -> Result<Option<Self>> {
        match result.first_row_map() {
            Some(fields) => Self::from_fields(fields).map(Some),
            None => Ok(None),
        }
    }

    pub fn from_fields(fields: StatusFields) -> Result<Self> {
        let master_host = required(&fields, "master_host")?.to_string();
        let master_port = parse_number::<u16>(&fields, "master_port")?;
        let io_running = ThreadState::parse(required(&fields, "slave_io_running")?)?;
        let sql_running = ThreadState::parse(required(&fields, "slave_sql_running")?)?;
        let file = optional(&fields, "relay_master_log_file").unwrap_or_default().to_string();
        let position = parse_number::<u64>(&fields, "exec_master_log_pos")?;

        let using_gtid = match optional(&fields, "using_gtid") {
            Some(value) => Some(value.parse::<GtidMode>()?),
            None => None,
        };

        Ok(Self {
            master: Instance::new(master_host, master_port),
            io_running,
            sql_running,
            executed: BinlogCoordinates::new(file, position),
            seconds_behind_master: optional(&fields, "seconds_behind_master").map(str::to_string),
            using_gtid,
            last_io_error: optional(&fields, "last_io_error").unwrap_or_default().to_string(),
            last_sql_error: optional(&fields, "last_sql_error").unwrap_or_default().to_string(),
            fields,
        })
    }

    /// Raw column value
    pub fn get(&self, column: &str) -> Option<&str> {
        optional(&self.fields, &column.to_lowercase())
    }

    /// Lag in seconds; `None` when NULL or not a number
    pub fn lag(&self) -> Option<u64> {
        self.seconds_behind_master.as_deref()?.trim().parse().ok()
    }

    /// Whether the reported lag is known and strictly below `bound`
    pub fn lag_within(&self, bound: Duration) -> bool {
        matches!(self.lag(), Some(lag) if Duration::from_secs(lag) < bound)
    }

    /// State of one thread
    pub fn thread_state(&self, thread: ReplicationThread) -> ThreadState {
        match thread {
            ReplicationThread::Io => self.io_running,
            ReplicationThread::Sql => self.sql_running,
        }
    }

    pub fn both_running(&self) -> bool {
        self.io_running.is_running() && self.sql_running.is_running()
    }

    pub fn both_stopped(&self) -> bool {
        self.io_running.is_stopped() && self.sql_running.is_stopped()
    }

    /// Replication error text for the given thread(s)
    pub fn last_error(&self, thread: Option<ReplicationThread>) -> String {
        match thread {
            None => format!("{}{}", self.last_io_error, self.last_sql_error),
            Some(ReplicationThread::Io) => self.last_io_error.clone(),
            Some(ReplicationThread::Sql) => self.last_sql_error.clone(),
        }
    }
}

impl fmt::Display for SlaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "master: {}, io: {}, sql: {}, lag: {}, pos: {}",
            self.master,
            self.io_running,
            self.sql_running,
            self.lag().map(|l| l.to_string()).unwrap_or_else(|| "None".to_string()),
            self.executed
        )
    }
}

/// Snapshot of `SHOW MASTER STATUS`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterStatus {
    /// Current binary log coordinate (`file`, `position`)
    pub coordinates: BinlogCoordinates,
    #[serde(skip)]
    pub fields: StatusFields,
}

impl MasterStatus {
    /// Parse a `SHOW MASTER STATUS` result; no rows means binary logging is off
    pub fn from_result(result: &QueryResult) -> Result<Option<Self>> {
        match result.first_row_map() {
            Some(fields) => Self::from_fields(fields).map(Some),
            None => Ok(None),
        }
    }

    pub fn from_fields(fields: StatusFields) -> Result<Self> {
        let file = required(&fields, "file")?.to_string();
        let position = parse_number::<u64>(&fields, "position")?;
        Ok(Self {
            coordinates: BinlogCoordinates::new(file, position),
            fields,
        })
    }
}

fn optional<'a>(fields: &'a StatusFields, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(|v| v.as_deref())
}

fn required<'a>(fields: &'a StatusFields, key: &str) -> Result<&'a str> {
    optional(fields, key).ok_or_else(|| Error::Status(format!("missing column '{}'", key)))
}

fn parse_number<T: FromStr>(fields: &StatusFields, key: &str) -> Result<T> {
    let raw = required(fields, key)?;
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Status(format!("column '{}' is not a number: '{}'", key, raw)))
}
