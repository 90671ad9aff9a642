//! Stop-in-sync
//!
//! Halts two siblings at the same executed coordinate of their shared master
//! without skipping or replaying anything: stop ourselves first, let the
//! sibling run ahead, stop it, then replay up to exactly where it stopped.

use super::{Deadline, Replication};
use crate::error::{Error, Result};
use crate::status::{BinlogCoordinates, ReplicationThread, SlaveStatus};

impl Replication {
    /// Stop this replica and `sibling` at an identical executed coordinate
    pub async fn stop_in_sync_with_sibling(&self, sibling: &Replication) -> Result<BinlogCoordinates> {
        let timeout = self.options.timeout;
        let mine = self.slave_status().await?;
        let theirs = sibling.slave_status().await?;
        let ready = match (&mine, &theirs) {
            (Some(a), Some(b)) => a.lag_within(timeout) && b.lag_within(timeout),
            _ => false,
        };
        if !ready || !self.is_sibling_of(sibling).await {
            return Err(Error::Precondition(format!(
                "{} and {} must be lag-free siblings to stop them in sync",
                self.instance(),
                sibling.instance()
            )));
        }

        self.stop_slave(Some(ReplicationThread::Sql)).await?;
        tokio::time::sleep(self.options.sync_grace).await;
        sibling.stop_slave(Some(ReplicationThread::Sql)).await?;

        let (_, ahead) = self
            .poll_pair(sibling, |mine, theirs| {
                mine.sql_running.is_stopped()
                    && theirs.sql_running.is_stopped()
                    && theirs.executed >= mine.executed
            })
            .await
            .ok_or_else(|| {
                Error::NotConverged(
                    "We expected the sibling replication to be stopped and ahead of the current host, \
                     but it was behind or other error happened"
                        .into(),
                )
            })?;
        let target = ahead.executed;

        tracing::info!("{}: replaying up to {} to match {}", self.instance(), target, sibling.instance());
        match self.start_slave(Some(ReplicationThread::Sql), Some(&target)).await {
            Ok(_) => {}
            // Convergence is checked below
            Err(Error::NotConverged(message)) => {
                tracing::debug!("{}: SQL thread start not confirmed: {}", self.instance(), message)
            }
            Err(e) => return Err(e),
        }

        let (synced, _) = self
            .poll_pair(sibling, |mine, theirs| {
                mine.sql_running.is_stopped()
                    && theirs.sql_running.is_stopped()
                    && mine.executed == theirs.executed
            })
            .await
            .ok_or_else(|| {
                Error::NotConverged(format!(
                    "We expected both hosts stopped and in sync at {}, but they were not",
                    target
                ))
            })?;

        Ok(synced.executed)
    }

    /// Poll both statuses until `done` holds or the timeout passes
    async fn poll_pair<F>(&self, other: &Replication, done: F) -> Option<(SlaveStatus, SlaveStatus)>
    where
        F: Fn(&SlaveStatus, &SlaveStatus) -> bool,
    {
        let deadline = Deadline::after(self.options.timeout);
        loop {
            tokio::time::sleep(self.options.sync_poll_interval).await;

            let pair = match (self.slave_status().await, other.slave_status().await) {
                (Ok(Some(mine)), Ok(Some(theirs))) => Some((mine, theirs)),
                _ => None,
            };
            if let Some((mine, theirs)) = pair {
                if done(&mine, &theirs) {
                    return Some((mine, theirs));
                }
                tracing::debug!(
                    "{} at {}, {} at {}",
                    self.instance(),
                    mine.executed,
                    other.instance(),
                    theirs.executed
                );
            }

            if deadline.expired() {
                return None;
            }
        }
    }
}
