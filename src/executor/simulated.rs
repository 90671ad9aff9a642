//! Simulated Replication Fleet
//!
//! In-memory MariaDB servers that understand the statements the engine
//! issues. Writes on a server's binary log flow down to its running replicas
//! every time a status is read, so polling loops observe progress.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{Connector, QueryExecutor, QueryResult, ReplicationCredentials, Row};
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::replication::{Replication, ReplicationOptions};
use crate::status::{BinlogCoordinates, GtidMode, ThreadState};

const ER_SYNTAX: i32 = 1064;
const ER_SLAVE_MUST_STOP: i32 = 1198;
const ER_BAD_SLAVE: i32 = 1200;

/// Replication configuration of one simulated server
#[derive(Debug, Clone)]
pub(crate) struct SimReplica {
    pub master: Instance,
    pub master_user: String,
    pub master_ssl: bool,
    pub io: ThreadState,
    pub sql: ThreadState,
    pub executed: BinlogCoordinates,
    /// Master position copied into the relay log
    pub received: u64,
    pub using_gtid: GtidMode,
    pub until: Option<BinlogCoordinates>,
    /// Reported Seconds_Behind_Master while both threads run
    pub lag: Option<u64>,
    pub last_io_error: String,
    pub last_sql_error: String,
    /// SQL thread reports running but applies nothing
    pub sql_frozen: bool,
}

#[derive(Debug, Clone)]
struct SimServer {
    server_id: u32,
    report_host: Option<String>,
    binlog: Option<BinlogCoordinates>,
    replica: Option<SimReplica>,
    write_rate: u64,
    failures: Vec<(String, i32, String)>,
    stale_hosts: Vec<(u32, String, u16)>,
    /// Lag reported by every replica of this server
    downstream_lag: Option<u64>,
    /// IO thread cannot reach any master, kept across CHANGE MASTER
    io_error: Option<String>,
}

#[derive(Debug, Default)]
struct FleetState {
    servers: HashMap<Instance, SimServer>,
    statements: Vec<(Instance, String)>,
    unreachable: HashSet<Instance>,
    reverse_dns: HashMap<Ipv4Addr, String>,
    next_server_id: u32,
}

/// A set of simulated servers sharing one replication universe
#[derive(Clone, Default)]
pub(crate) struct SimFleet {
    inner: Arc<Mutex<FleetState>>,
}

impl SimFleet {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FleetState> {
        self.inner.lock().expect("fleet lock poisoned")
    }

    fn server_mut<'a>(state: &'a mut FleetState, instance: &Instance) -> &'a mut SimServer {
        state
            .servers
            .get_mut(instance)
            .unwrap_or_else(|| panic!("unknown simulated instance {}", instance))
    }

    fn replica_mut<'a>(state: &'a mut FleetState, instance: &Instance) -> &'a mut SimReplica {
        Self::server_mut(state, instance)
            .replica
            .as_mut()
            .unwrap_or_else(|| panic!("{} is not a simulated replica", instance))
    }

    /// Add a server writing a binary log and replicating from nobody
    pub fn add_primary(&self, instance: &Instance, binlog: BinlogCoordinates) {
        let mut state = self.state();
        state.next_server_id += 1;
        let server = SimServer {
            server_id: state.next_server_id,
            report_host: Some(instance.host.clone()),
            binlog: Some(binlog),
            replica: None,
            write_rate: 0,
            failures: Vec::new(),
            stale_hosts: Vec::new(),
            downstream_lag: None,
            io_error: None,
        };
        state.servers.insert(instance.clone(), server);
    }

    /// Add a running, caught up replica of `master` with its own binary log
    pub fn add_replica(&self, instance: &Instance, master: &Instance) {
        self.add_primary(instance, BinlogCoordinates::new(format!("{}-bin.000001", instance.host), 4));
        self.replicate_from(instance, master);
    }

    /// Point an existing server at `master`, running and caught up
    pub fn replicate_from(&self, instance: &Instance, master: &Instance) {
        let mut state = self.state();
        let executed = state
            .servers
            .get(master)
            .and_then(|m| m.binlog.clone())
            .unwrap_or_else(|| panic!("{} has no binary log", master));
        Self::server_mut(&mut state, instance).replica = Some(SimReplica {
            master: master.clone(),
            master_user: "repl".to_string(),
            master_ssl: true,
            io: ThreadState::Running,
            sql: ThreadState::Running,
            received: executed.position,
            executed,
            using_gtid: GtidMode::No,
            until: None,
            lag: None,
            last_io_error: String::new(),
            last_sql_error: String::new(),
            sql_frozen: false,
        });
    }

    /// Append `bytes` worth of events to a server's binary log
    pub fn write(&self, instance: &Instance, bytes: u64) {
        let mut state = self.state();
        if let Some(binlog) = Self::server_mut(&mut state, instance).binlog.as_mut() {
            binlog.position += bytes;
        }
        state.tick();
    }

    /// Grow a server's binary log by `bytes` every time anything is observed
    pub fn set_write_rate(&self, instance: &Instance, bytes: u64) {
        Self::server_mut(&mut self.state(), instance).write_rate = bytes;
    }

    pub fn disable_binlog(&self, instance: &Instance) {
        Self::server_mut(&mut self.state(), instance).binlog = None;
    }

    pub fn set_threads(&self, instance: &Instance, io: ThreadState, sql: ThreadState) {
        let mut state = self.state();
        let replica = Self::replica_mut(&mut state, instance);
        replica.io = io;
        replica.sql = sql;
    }

    pub fn set_lag(&self, instance: &Instance, lag: Option<u64>) {
        Self::replica_mut(&mut self.state(), instance).lag = lag;
    }

    /// Replicas of `master` report `lag`, whenever they were pointed at it
    pub fn set_downstream_lag(&self, master: &Instance, lag: Option<u64>) {
        Self::server_mut(&mut self.state(), master).downstream_lag = lag;
    }

    pub fn freeze_sql(&self, instance: &Instance) {
        Self::replica_mut(&mut self.state(), instance).sql_frozen = true;
    }

    pub fn set_io_error(&self, instance: &Instance, message: &str) {
        Self::server_mut(&mut self.state(), instance).io_error = Some(message.to_string());
    }

    pub fn set_using_gtid(&self, instance: &Instance, mode: GtidMode) {
        Self::replica_mut(&mut self.state(), instance).using_gtid = mode;
    }

    pub fn set_unreachable(&self, instance: &Instance) {
        self.state().unreachable.insert(instance.clone());
    }

    pub fn set_server_id(&self, instance: &Instance, server_id: u32) {
        Self::server_mut(&mut self.state(), instance).server_id = server_id;
    }

    pub fn set_report_host(&self, instance: &Instance, host: Option<&str>) {
        Self::server_mut(&mut self.state(), instance).report_host = host.map(str::to_string);
    }

    pub fn add_reverse_dns(&self, ip: Ipv4Addr, hostname: &str) {
        self.state().reverse_dns.insert(ip, hostname.to_string());
    }

    /// Report a replica in SHOW SLAVE HOSTS that does not replicate from `master`
    pub fn add_stale_slave_host(&self, master: &Instance, server_id: u32, host: &str, port: u16) {
        Self::server_mut(&mut self.state(), master)
            .stale_hosts
            .push((server_id, host.to_string(), port));
    }

    /// Make statements starting with `prefix` fail on `instance`
    pub fn fail_statement(&self, instance: &Instance, prefix: &str, errno: i32, errmsg: &str) {
        Self::server_mut(&mut self.state(), instance)
            .failures
            .push((prefix.to_string(), errno, errmsg.to_string()));
    }

    /// Every statement executed on `instance`, in order
    pub fn statements(&self, instance: &Instance) -> Vec<String> {
        self.state()
            .statements
            .iter()
            .filter(|(i, _)| i == instance)
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    /// Statements on `instance` that change something
    pub fn mutations(&self, instance: &Instance) -> Vec<String> {
        self.statements(instance)
            .into_iter()
            .filter(|sql| !sql.starts_with("SHOW"))
            .collect()
    }

    pub fn clear_statements(&self) {
        self.state().statements.clear();
    }

    pub fn replica(&self, instance: &Instance) -> Option<SimReplica> {
        self.state().servers.get(instance).and_then(|s| s.replica.clone())
    }

    pub fn binlog(&self, instance: &Instance) -> Option<BinlogCoordinates> {
        self.state().servers.get(instance).and_then(|s| s.binlog.clone())
    }

    pub fn connector(&self) -> SimConnector {
        SimConnector { fleet: self.clone() }
    }

    /// Engine handle for `instance`
    pub fn replication(&self, instance: &Instance) -> Replication {
        self.replication_with(instance, ReplicationOptions::default())
    }

    pub fn replication_with(&self, instance: &Instance, options: ReplicationOptions) -> Replication {
        let executor = SimExecutor {
            fleet: self.clone(),
            instance: instance.clone(),
        };
        Replication::new(Arc::new(executor), Arc::new(self.connector()), options)
    }
}

impl FleetState {
    /// Move binlog events one step down every running replication channel
    fn tick(&mut self) {
        for server in self.servers.values_mut() {
            if let Some(binlog) = server.binlog.as_mut() {
                binlog.position += server.write_rate;
            }
        }

        // Bounded so that rings settle
        for _ in 0..16 {
            let mut changed = false;
            let instances: Vec<Instance> = self.servers.keys().cloned().collect();

            for instance in instances {
                let master_binlog = match self.servers.get(&instance).and_then(|s| s.replica.as_ref()) {
                    Some(replica) => self.servers.get(&replica.master).and_then(|m| m.binlog.clone()),
                    None => continue,
                };

                let Some(SimServer {
                    replica: Some(replica),
                    binlog,
                    ..
                }) = self.servers.get_mut(&instance)
                else {
                    continue;
                };

                if replica.io.is_running() {
                    if let Some(mb) = &master_binlog {
                        if mb.file == replica.executed.file && mb.position > replica.received {
                            replica.received = mb.position;
                            changed = true;
                        }
                    }
                }

                if replica.sql.is_running() && !replica.sql_frozen {
                    let mut target = replica.received;
                    let mut halt = false;
                    if let Some(until) = &replica.until {
                        if until.file == replica.executed.file && until.position <= target {
                            target = until.position;
                            halt = true;
                        }
                    }

                    if target > replica.executed.position {
                        let delta = target - replica.executed.position;
                        replica.executed.position = target;
                        if let Some(own) = binlog.as_mut() {
                            own.position += delta;
                        }
                        changed = true;
                    }

                    if halt {
                        replica.sql = ThreadState::Stopped;
                        replica.until = None;
                        changed = true;
                    }
                }
            }

            if !changed {
                break;
            }
        }
    }

    fn execute(&mut self, instance: &Instance, sql: &str) -> Result<QueryResult> {
        self.statements.push((instance.clone(), sql.to_string()));

        if self.unreachable.contains(instance) {
            return Err(Error::ConnectionFailed {
                address: instance.to_string(),
                reason: "Lost connection to MySQL server".into(),
            });
        }

        let server = self.servers.get(instance).ok_or_else(|| Error::ConnectionFailed {
            address: instance.to_string(),
            reason: "Unknown MySQL server host".into(),
        })?;
        if let Some((_, errno, errmsg)) = server.failures.iter().find(|(p, _, _)| sql.starts_with(p.as_str())) {
            return Err(Error::Query {
                errno: *errno,
                errmsg: errmsg.clone(),
            });
        }

        self.tick();

        match sql {
            "SHOW SLAVE STATUS" => Ok(self.show_slave_status(instance)),
            "SHOW MASTER STATUS" => Ok(self.show_master_status(instance)),
            "SHOW SLAVE HOSTS" => Ok(self.show_slave_hosts(instance)),
            "RESET SLAVE ALL" => self.reset_slave(instance),
            _ => {
                if let Some(rest) = sql.strip_prefix("START SLAVE") {
                    self.start_slave(instance, rest.trim())
                } else if let Some(rest) = sql.strip_prefix("STOP SLAVE") {
                    self.stop_slave(instance, rest.trim())
                } else if let Some(mode) = sql.strip_prefix("CHANGE MASTER TO MASTER_USE_GTID=") {
                    self.change_gtid(instance, mode)
                } else if let Some(rest) = sql.strip_prefix("CHANGE MASTER TO ") {
                    self.change_master(instance, rest)
                } else {
                    Err(syntax_error(sql))
                }
            }
        }
    }

    fn show_slave_status(&self, instance: &Instance) -> QueryResult {
        let fields = [
            "Slave_IO_State",
            "Master_Host",
            "Master_User",
            "Master_Port",
            "Read_Master_Log_Pos",
            "Relay_Master_Log_File",
            "Slave_IO_Running",
            "Slave_SQL_Running",
            "Exec_Master_Log_Pos",
            "Seconds_Behind_Master",
            "Last_IO_Error",
            "Last_SQL_Error",
            "Using_Gtid",
        ];

        let rows: Vec<Row> = match self.servers.get(instance).and_then(|s| s.replica.as_ref()) {
            Some(r) => {
                let downstream = self.servers.get(&r.master).and_then(|m| m.downstream_lag);
                let lag = if r.io.is_running() && r.sql.is_running() {
                    Some(r.lag.or(downstream).unwrap_or(0).to_string())
                } else {
                    None
                };
                let gtid = match r.using_gtid {
                    GtidMode::No => "No",
                    GtidMode::SlavePos => "Slave_Pos",
                    GtidMode::CurrentPos => "Current_Pos",
                };
                vec![vec![
                    Some("Waiting for master to send event".to_string()),
                    Some(r.master.host.clone()),
                    Some(r.master_user.clone()),
                    Some(r.master.port.to_string()),
                    Some(r.received.to_string()),
                    Some(r.executed.file.clone()),
                    Some(r.io.as_str().to_string()),
                    Some(r.sql.as_str().to_string()),
                    Some(r.executed.position.to_string()),
                    lag,
                    Some(r.last_io_error.clone()),
                    Some(r.last_sql_error.clone()),
                    Some(gtid.to_string()),
                ]]
            }
            None => Vec::new(),
        };

        result(&fields, rows)
    }

    fn show_master_status(&self, instance: &Instance) -> QueryResult {
        let rows: Vec<Row> = match self.servers.get(instance).and_then(|s| s.binlog.as_ref()) {
            Some(b) => vec![vec![
                Some(b.file.clone()),
                Some(b.position.to_string()),
                Some(String::new()),
                Some(String::new()),
            ]],
            None => Vec::new(),
        };
        result(&["File", "Position", "Binlog_Do_DB", "Binlog_Ignore_DB"], rows)
    }

    fn show_slave_hosts(&self, instance: &Instance) -> QueryResult {
        let master_id = self.servers.get(instance).map(|s| s.server_id).unwrap_or_default();

        let mut hosts: Vec<(u32, String, u16)> = self
            .servers
            .iter()
            .filter_map(|(inst, server)| {
                let replica = server.replica.as_ref()?;
                if &replica.master != instance || replica.io.is_stopped() {
                    return None;
                }
                Some((server.server_id, server.report_host.clone().unwrap_or_default(), inst.port))
            })
            .collect();
        if let Some(server) = self.servers.get(instance) {
            hosts.extend(server.stale_hosts.iter().cloned());
        }
        hosts.sort();

        let rows = hosts
            .into_iter()
            .map(|(id, host, port)| {
                vec![
                    Some(id.to_string()),
                    Some(host),
                    Some(port.to_string()),
                    Some(master_id.to_string()),
                ]
            })
            .collect();
        result(&["Server_id", "Host", "Port", "Master_id"], rows)
    }

    fn start_slave(&mut self, instance: &Instance, rest: &str) -> Result<QueryResult> {
        let (threads, until) = match rest.split_once(" UNTIL ") {
            Some((threads, until)) => {
                let pairs = parse_assignments(until)?;
                expect_keys(&pairs, &["MASTER_LOG_FILE", "MASTER_LOG_POS"])?;
                let position = pairs[1].1.parse().map_err(|_| syntax_error(until))?;
                (threads, Some(BinlogCoordinates::new(pairs[0].1.clone(), position)))
            }
            None => (rest, None),
        };
        let (io, sql) = match threads {
            "" => (true, true),
            "IO_THREAD" => (true, false),
            "SQL_THREAD" => (false, true),
            other => return Err(syntax_error(other)),
        };

        let master_known = {
            let replica = self.replica(instance)?;
            let master = replica.master.clone();
            self.servers.contains_key(&master)
        };
        let io_error = self.server_mut(instance)?.io_error.clone();
        let replica = self.replica_mut(instance)?;

        if io && replica.io.is_stopped() {
            match (&io_error, master_known) {
                (Some(message), _) => {
                    replica.io = ThreadState::Connecting;
                    replica.last_io_error = message.clone();
                }
                (None, false) => {
                    replica.io = ThreadState::Connecting;
                    replica.last_io_error = format!("error connecting to master '{}'", replica.master);
                }
                (None, true) => {
                    replica.io = ThreadState::Running;
                    replica.last_io_error.clear();
                }
            }
        }
        if sql && replica.sql.is_stopped() {
            replica.sql = ThreadState::Running;
            replica.last_sql_error.clear();
            replica.until = until;
        }

        self.tick();
        Ok(QueryResult::default())
    }

    fn stop_slave(&mut self, instance: &Instance, rest: &str) -> Result<QueryResult> {
        let (io, sql) = match rest {
            "" => (true, true),
            "IO_THREAD" => (true, false),
            "SQL_THREAD" => (false, true),
            other => return Err(syntax_error(other)),
        };
        let replica = self.replica_mut(instance)?;
        if io {
            replica.io = ThreadState::Stopped;
        }
        if sql {
            replica.sql = ThreadState::Stopped;
            replica.until = None;
        }
        Ok(QueryResult::default())
    }

    fn reset_slave(&mut self, instance: &Instance) -> Result<QueryResult> {
        let server = self.server_mut(instance)?;
        if let Some(replica) = &server.replica {
            if !(replica.io.is_stopped() && replica.sql.is_stopped()) {
                return Err(slave_must_stop());
            }
        }
        server.replica = None;
        Ok(QueryResult::default())
    }

    fn change_gtid(&mut self, instance: &Instance, mode: &str) -> Result<QueryResult> {
        let mode: GtidMode = mode.parse().map_err(|_| syntax_error(mode))?;
        let replica = self.replica_mut(instance)?;
        if !(replica.io.is_stopped() && replica.sql.is_stopped()) {
            return Err(slave_must_stop());
        }
        replica.using_gtid = mode;
        Ok(QueryResult::default())
    }

    fn change_master(&mut self, instance: &Instance, rest: &str) -> Result<QueryResult> {
        let pairs = parse_assignments(rest)?;
        expect_keys(
            &pairs,
            &[
                "MASTER_HOST",
                "MASTER_PORT",
                "MASTER_USER",
                "MASTER_PASSWORD",
                "MASTER_LOG_FILE",
                "MASTER_LOG_POS",
                "MASTER_SSL",
            ],
        )?;
        let number = |value: &str| value.parse::<u64>().map_err(|_| syntax_error(value));
        let port = u16::try_from(number(pairs[1].1.as_str())?).map_err(|_| syntax_error(rest))?;
        let position = number(pairs[5].1.as_str())?;
        let ssl = match pairs[6].1.as_str() {
            "0" => false,
            "1" => true,
            other => return Err(syntax_error(other)),
        };

        let server = self.server_mut(instance)?;
        let using_gtid = match &server.replica {
            Some(r) if !(r.io.is_stopped() && r.sql.is_stopped()) => return Err(slave_must_stop()),
            Some(r) => r.using_gtid,
            None => GtidMode::No,
        };

        server.replica = Some(SimReplica {
            master: Instance::new(pairs[0].1.clone(), port),
            master_user: pairs[2].1.clone(),
            master_ssl: ssl,
            io: ThreadState::Stopped,
            sql: ThreadState::Stopped,
            executed: BinlogCoordinates::new(pairs[4].1.clone(), position),
            received: position,
            using_gtid,
            until: None,
            lag: None,
            last_io_error: String::new(),
            last_sql_error: String::new(),
            sql_frozen: false,
        });
        Ok(QueryResult::default())
    }

    fn server_mut(&mut self, instance: &Instance) -> Result<&mut SimServer> {
        self.servers
            .get_mut(instance)
            .ok_or_else(|| Error::Internal(format!("unknown simulated instance {}", instance)))
    }

    fn replica(&self, instance: &Instance) -> Result<&SimReplica> {
        self.servers
            .get(instance)
            .and_then(|s| s.replica.as_ref())
            .ok_or_else(not_a_slave)
    }

    fn replica_mut(&mut self, instance: &Instance) -> Result<&mut SimReplica> {
        self.server_mut(instance)?.replica.as_mut().ok_or_else(not_a_slave)
    }
}

fn result(fields: &[&str], rows: Vec<Row>) -> QueryResult {
    QueryResult {
        fields: fields.iter().map(|f| f.to_string()).collect(),
        rows,
        rows_affected: 0,
    }
}

fn syntax_error(near: &str) -> Error {
    Error::Query {
        errno: ER_SYNTAX,
        errmsg: format!("You have an error in your SQL syntax near '{}'", near),
    }
}

fn slave_must_stop() -> Error {
    Error::Query {
        errno: ER_SLAVE_MUST_STOP,
        errmsg: "This operation cannot be performed as you have a running slave ''; run STOP SLAVE '' first"
            .into(),
    }
}

fn not_a_slave() -> Error {
    Error::Query {
        errno: ER_BAD_SLAVE,
        errmsg: "Misconfigured slave: MASTER_HOST was not set; Fix in config file or with CHANGE MASTER TO"
            .into(),
    }
}

/// Parse `KEY='value', KEY=number, ...`
fn parse_assignments(input: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            return Err(syntax_error(input));
        }

        let mut value = String::new();
        if chars.peek() == Some(&'\'') {
            chars.next();
            loop {
                match chars.next() {
                    Some('\\') => value.extend(chars.next()),
                    Some('\'') => break,
                    Some(c) => value.push(c),
                    None => return Err(syntax_error(input)),
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                value.push(*c);
                chars.next();
            }
        }
        pairs.push((key.trim().to_string(), value));

        match chars.next() {
            Some(',') => {
                if chars.next() != Some(' ') {
                    return Err(syntax_error(input));
                }
            }
            None => return Ok(pairs),
            Some(_) => return Err(syntax_error(input)),
        }
    }
}

fn expect_keys(pairs: &[(String, String)], keys: &[&str]) -> Result<()> {
    let found: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
    if found != keys {
        return Err(syntax_error(&found.join(", ")));
    }
    Ok(())
}

/// Connection to one simulated server
pub(crate) struct SimExecutor {
    fleet: SimFleet,
    instance: Instance,
}

#[async_trait]
impl QueryExecutor for SimExecutor {
    fn instance(&self) -> &Instance {
        &self.instance
    }

    async fn execute(&self, sql: &str, _timeout: Option<Duration>) -> Result<QueryResult> {
        self.fleet.state().execute(&self.instance, sql)
    }
}

/// Connector handing out [`SimExecutor`]s
pub(crate) struct SimConnector {
    fleet: SimFleet,
}

#[async_trait]
impl Connector for SimConnector {
    async fn connect(&self, instance: &Instance) -> Result<Arc<dyn QueryExecutor>> {
        let state = self.fleet.state();
        if state.unreachable.contains(instance) || !state.servers.contains_key(instance) {
            return Err(Error::ConnectionFailed {
                address: instance.to_string(),
                reason: "Can't connect to MySQL server".into(),
            });
        }
        Ok(Arc::new(SimExecutor {
            fleet: self.fleet.clone(),
            instance: instance.clone(),
        }))
    }

    fn replication_credentials(&self) -> Result<ReplicationCredentials> {
        Ok(ReplicationCredentials {
            user: "repl".into(),
            password: "replpass".into(),
        })
    }

    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Result<String> {
        self.fleet
            .state()
            .reverse_dns
            .get(&ip)
            .cloned()
            .ok_or_else(|| Error::Resolve {
                address: ip.to_string(),
                reason: "no PTR record".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignments() {
        let pairs = parse_assignments("MASTER_LOG_FILE='db-bin.000010', MASTER_LOG_POS=1000").unwrap();
        assert_eq!(pairs[0], ("MASTER_LOG_FILE".to_string(), "db-bin.000010".to_string()));
        assert_eq!(pairs[1], ("MASTER_LOG_POS".to_string(), "1000".to_string()));

        let pairs = parse_assignments("MASTER_PASSWORD='it\\'s, fine'").unwrap();
        assert_eq!(pairs[0].1, "it's, fine");

        assert!(parse_assignments("MASTER_LOG_POS=1,MASTER_SSL=1").is_err());
    }

    #[tokio::test]
    async fn test_events_flow_down_the_tree() {
        let fleet = SimFleet::new();
        let m = Instance::new("m", 3306);
        let i = Instance::new("i", 3306);
        let a = Instance::new("a", 3306);
        fleet.add_primary(&m, BinlogCoordinates::new("m-bin.000001", 100));
        fleet.add_replica(&i, &m);
        fleet.add_replica(&a, &i);

        fleet.write(&m, 50);
        assert_eq!(fleet.replica(&i).unwrap().executed.position, 150);
        assert_eq!(fleet.binlog(&i).unwrap().position, 54);
        assert_eq!(fleet.replica(&a).unwrap().executed.position, 54);

        fleet.set_threads(&i, ThreadState::Running, ThreadState::Stopped);
        fleet.write(&m, 10);
        let relay = fleet.replica(&i).unwrap();
        assert_eq!(relay.received, 160);
        assert_eq!(relay.executed.position, 150);
    }

    #[tokio::test]
    async fn test_statement_errors() {
        let fleet = SimFleet::new();
        let m = Instance::new("m", 3306);
        let r = Instance::new("r", 3306);
        fleet.add_primary(&m, BinlogCoordinates::new("m-bin.000001", 4));
        fleet.add_replica(&r, &m);

        let exec = SimExecutor {
            fleet: fleet.clone(),
            instance: r.clone(),
        };
        let err = exec.execute("RESET SLAVE ALL", None).await.unwrap_err();
        assert_eq!(err.errno(), ER_SLAVE_MUST_STOP);

        let err = exec.execute("FLUSH LOGS", None).await.unwrap_err();
        assert_eq!(err.errno(), ER_SYNTAX);

        let primary = SimExecutor { fleet: fleet.clone(), instance: m.clone() };
        let err = primary.execute("START SLAVE", None).await.unwrap_err();
        assert_eq!(err.errno(), ER_BAD_SLAVE);

        assert_eq!(fleet.statements(&r), vec!["RESET SLAVE ALL", "FLUSH LOGS"]);
    }
}
