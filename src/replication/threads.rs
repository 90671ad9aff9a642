//! Thread Controller
//!
//! START/STOP of the IO and SQL threads with bounded confirmation polling,
//! CHANGE MASTER / RESET SLAVE and GTID mode switching.

use super::{Deadline, Replication};
use crate::error::{Error, Result};
use crate::executor::redact;
use crate::instance::Instance;
use crate::status::{BinlogCoordinates, GtidMode, ReplicationThread, SlaveStatus, ThreadState};

/// Target of a `CHANGE MASTER TO`
#[derive(Debug, Clone)]
pub struct ChangeMaster {
    pub master: Instance,
    pub coordinates: BinlogCoordinates,
    pub ssl: bool,
}

/// Quote a string literal for MariaDB
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Threads addressed by an optional thread selector
fn targets(thread: Option<ReplicationThread>) -> &'static [ReplicationThread] {
    match thread {
        None => &[ReplicationThread::Io, ReplicationThread::Sql],
        Some(ReplicationThread::Io) => &[ReplicationThread::Io],
        Some(ReplicationThread::Sql) => &[ReplicationThread::Sql],
    }
}

fn slave_command(verb: &str, thread: Option<ReplicationThread>) -> String {
    match thread {
        None => format!("{} SLAVE", verb),
        Some(t) => format!("{} SLAVE {}", verb, t.keyword()),
    }
}

impl Replication {
    /// Start replication threads and wait until they report running
    ///
    /// With `until`, only the SQL thread may be started; reaching the
    /// coordinate and halting there also counts as success.
    pub async fn start_slave(
        &self,
        thread: Option<ReplicationThread>,
        until: Option<&BinlogCoordinates>,
    ) -> Result<SlaveStatus> {
        if until.is_some() && thread != Some(ReplicationThread::Sql) {
            return Err(Error::Precondition(
                "START SLAVE UNTIL is only supported for the SQL thread".into(),
            ));
        }

        let status = self.require_slave_status().await?;
        let already = |t: ReplicationThread| !status.thread_state(t).is_stopped();
        match thread {
            None if already(ReplicationThread::Io) && already(ReplicationThread::Sql) => {
                return Err(Error::Precondition(
                    "Both IO and SQL threads are already running or trying to connect".into(),
                ));
            }
            Some(ReplicationThread::Sql) if already(ReplicationThread::Sql) => {
                return Err(Error::Precondition("SQL thread is already running".into()));
            }
            Some(ReplicationThread::Io) if already(ReplicationThread::Io) => {
                return Err(Error::Precondition(
                    "IO thread is already running or trying to connect".into(),
                ));
            }
            _ => {}
        }

        let mut sql = slave_command("START", thread);
        if let Some(until) = until {
            sql.push_str(&format!(
                " UNTIL MASTER_LOG_FILE={}, MASTER_LOG_POS={}",
                quote(&until.file),
                until.position
            ));
        }
        tracing::info!("{}: {}", self.instance(), sql);
        self.execute(&sql).await?;

        self.wait_for_threads(thread, ThreadState::Running, until).await
    }

    /// Stop replication threads and wait until they report stopped
    pub async fn stop_slave(&self, thread: Option<ReplicationThread>) -> Result<SlaveStatus> {
        let status = self.require_slave_status().await?;
        let stopped = |t: ReplicationThread| status.thread_state(t).is_stopped();
        match thread {
            None if stopped(ReplicationThread::Io) && stopped(ReplicationThread::Sql) => {
                return Err(Error::Precondition(
                    "Both IO and SQL threads are already stopped".into(),
                ));
            }
            Some(ReplicationThread::Sql) if stopped(ReplicationThread::Sql) => {
                return Err(Error::Precondition("SQL thread is already stopped".into()));
            }
            Some(ReplicationThread::Io) if stopped(ReplicationThread::Io) => {
                return Err(Error::Precondition("IO thread is already stopped".into()));
            }
            _ => {}
        }

        let sql = slave_command("STOP", thread);
        tracing::info!("{}: {}", self.instance(), sql);
        self.execute(&sql).await?;

        self.wait_for_threads(thread, ThreadState::Stopped, None).await
    }

    async fn wait_for_threads(
        &self,
        thread: Option<ReplicationThread>,
        wanted: ThreadState,
        until: Option<&BinlogCoordinates>,
    ) -> Result<SlaveStatus> {
        let deadline = Deadline::after(self.options.timeout);
        let mut last: Option<SlaveStatus> = None;

        loop {
            match self.slave_status().await {
                Ok(Some(status)) => {
                    let reached = targets(thread).iter().all(|t| status.thread_state(*t) == wanted);
                    let halted_at_until = matches!(until, Some(u)
                        if status.sql_running.is_stopped() && status.executed == *u);
                    if reached || halted_at_until {
                        return Ok(status);
                    }
                    tracing::debug!("{}: waiting for {:?} threads to be {}", self.instance(), thread, wanted);
                    last = Some(status);
                }
                Ok(None) => {
                    return Err(Error::Internal(format!(
                        "{} lost its replication configuration while changing threads",
                        self.instance()
                    )));
                }
                Err(e) => tracing::debug!("{}: status poll failed: {}", self.instance(), e),
            }

            if deadline.expired() {
                break;
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }

        let message = last
            .map(|s| s.last_error(thread))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                format!(
                    "{} threads did not reach state {} within {:?}",
                    thread.map(|t| t.to_string()).unwrap_or_else(|| "IO and SQL".into()),
                    wanted,
                    self.options.timeout
                )
            });
        Err(Error::NotConverged(message))
    }

    /// `CHANGE MASTER TO` a new master at the given coordinates
    pub async fn setup(&self, change: &ChangeMaster) -> Result<()> {
        if self.slave_status().await?.is_some() {
            return Err(Error::Precondition(
                "Replica is setup, reset it before setting it up again.".into(),
            ));
        }

        let credentials = self.connector().replication_credentials()?;
        let sql = format!(
            "CHANGE MASTER TO MASTER_HOST={}, MASTER_PORT={}, MASTER_USER={}, MASTER_PASSWORD={}, \
             MASTER_LOG_FILE={}, MASTER_LOG_POS={}, MASTER_SSL={}",
            quote(&change.master.host),
            change.master.port,
            quote(&credentials.user),
            quote(&credentials.password),
            quote(&change.coordinates.file),
            change.coordinates.position,
            u8::from(change.ssl)
        );
        tracing::info!("{}: {}", self.instance(), redact(&sql));
        self.execute(&sql).await?;
        Ok(())
    }

    /// `RESET SLAVE ALL`; both threads must be stopped
    pub async fn reset_slave(&self) -> Result<()> {
        let status = self.require_slave_status().await?;
        if !status.both_stopped() {
            return Err(Error::Precondition(
                "Replica is running, stop slave before resetting it".into(),
            ));
        }

        tracing::info!("{}: RESET SLAVE ALL", self.instance());
        self.execute("RESET SLAVE ALL").await?;
        Ok(())
    }

    /// Switch GTID mode, restarting exactly the threads that were running
    pub async fn set_gtid_mode(&self, mode: GtidMode) -> Result<()> {
        let status = self.require_slave_status().await?;
        if status.using_gtid == Some(mode) {
            tracing::debug!("{}: already using gtid mode {}", self.instance(), mode);
            return Ok(());
        }

        let io = !status.io_running.is_stopped();
        let sql = !status.sql_running.is_stopped();
        if io || sql {
            self.stop_slave(None).await?;
        }

        let statement = format!("CHANGE MASTER TO MASTER_USE_GTID={}", mode.as_sql());
        tracing::info!("{}: {}", self.instance(), statement);
        let changed = self.execute(&statement).await;
        let restored = self.restore_threads(io, sql).await;

        changed?;
        restored
    }

    /// Restart the given threads; already running ones are left alone
    pub(crate) async fn restore_threads(&self, io: bool, sql: bool) -> Result<()> {
        let thread = match (io, sql) {
            (true, true) => None,
            (true, false) => Some(ReplicationThread::Io),
            (false, true) => Some(ReplicationThread::Sql),
            (false, false) => return Ok(()),
        };
        match self.start_slave(thread, None).await {
            Ok(_) => Ok(()),
            Err(Error::Precondition(message)) => {
                if self.threads_running(thread).await {
                    Ok(())
                } else {
                    Err(Error::Precondition(message))
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn threads_running(&self, thread: Option<ReplicationThread>) -> bool {
        match self.slave_status().await {
            Ok(Some(status)) => targets(thread).iter().all(|t| !status.thread_state(*t).is_stopped()),
            _ => false,
        }
    }

    /// Stop both threads unless both are already stopped
    pub(crate) async fn stop_if_running(&self) -> Result<()> {
        let status = self.require_slave_status().await?;
        if !status.both_stopped() {
            self.stop_slave(None).await?;
        }
        Ok(())
    }

    /// Start both threads unless both are already running; primaries are left alone
    pub(crate) async fn start_if_stopped(&self) -> Result<()> {
        match self.slave_status().await? {
            Some(status) if !status.both_running() => {
                self.start_slave(None, None).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
