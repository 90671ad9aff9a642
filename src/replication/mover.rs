//! Topology Mover
//!
//! Repoints a replica at a new master without skipping or replaying any
//! transaction it already applied. Four strategies are tried in order and
//! the first whose conditions hold is run:
//!
//! 1. siblings, both stopped at identical coordinates
//! 2. the current master replicates from the new master, is stopped, and we
//!    are caught up to it
//! 3. sibling to child, via stop-in-sync
//! 4. grandchild to sibling of its current master
//!
//! Anything else is reported as [`Error::UnsupportedTopology`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::classify::are_siblings;
use super::threads::ChangeMaster;
use super::{Deadline, Replication};
use crate::error::{Error, Result};
use crate::status::SlaveStatus;

/// Strategy a move was carried out with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoveStrategy {
    StoppedSiblings,
    StoppedIntermediateMaster,
    SiblingToChild,
    ChildToSibling,
}

impl fmt::Display for MoveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MoveStrategy::StoppedSiblings => "stopped-siblings",
            MoveStrategy::StoppedIntermediateMaster => "stopped-intermediate-master",
            MoveStrategy::SiblingToChild => "sibling-to-child",
            MoveStrategy::ChildToSibling => "child-to-sibling",
        };
        f.write_str(s)
    }
}

/// Outcome of a successful move
#[derive(Debug, Clone, Serialize)]
pub struct MoveReport {
    pub strategy: MoveStrategy,
    /// Slave status of the moved instance once the move finished
    pub status: SlaveStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Replication {
    /// Make this instance replicate from `new_master`
    ///
    /// Thread state is restored to what it was before the move, or both
    /// threads are started when `start_if_stopped` is set.
    pub async fn move_to(&self, new_master: &Replication, start_if_stopped: bool) -> Result<MoveReport> {
        let started_at = Utc::now();

        if self.instance().same_endpoint(new_master.instance()) {
            return Err(Error::Precondition("The host is trying to connect to itself".into()));
        }
        let status = self.require_slave_status().await?;
        if status.master.same_endpoint(new_master.instance()) {
            return Err(Error::Precondition(format!(
                "The host is already configured as a replica of {}",
                new_master.instance()
            )));
        }

        tracing::info!(
            "Moving {} from {} to {}",
            self.instance(),
            status.master,
            new_master.instance()
        );

        let report = |strategy: MoveStrategy, final_status: SlaveStatus| {
            tracing::info!("{} moved under {} ({})", self.instance(), new_master.instance(), strategy);
            MoveReport {
                strategy,
                status: final_status,
                started_at,
                finished_at: Utc::now(),
            }
        };

        let new_master_binlog = new_master.master_status().await?;
        let new_master_status = new_master.slave_status().await?;

        // 1. Siblings stopped at the same place
        if let (Some(binlog), Some(theirs)) = (&new_master_binlog, &new_master_status) {
            if are_siblings(self.instance(), Some(&status.master), new_master.instance(), Some(&theirs.master))
                && status.sql_running.is_stopped()
                && theirs.sql_running.is_stopped()
                && status.executed == theirs.executed
            {
                self.stop_if_running().await?;
                self.reset_slave().await?;
                self.setup(&ChangeMaster {
                    master: new_master.instance().clone(),
                    coordinates: binlog.coordinates.clone(),
                    ssl: self.options.master_ssl,
                })
                .await?;
                let final_status = self.restore_replication(&status, new_master, start_if_stopped).await?;
                return Ok(report(MoveStrategy::StoppedSiblings, final_status));
            }
        }

        let current_master = match self.open(&status.master).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("Could not connect to current master {}: {}", status.master, e);
                None
            }
        };

        // 2. Current master stopped under the new master, and we caught up to it
        if let Some(current) = &current_master {
            let intermediate = match current.slave_status().await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("Could not read slave status of {}: {}", current.instance(), e);
                    None
                }
            };
            if let Some(intermediate) = intermediate {
                if intermediate.master.is_same_instance_as(new_master.instance())
                    && intermediate.sql_running.is_stopped()
                    && self.caught_up_to_master(Some(current)).await
                {
                    self.stop_if_running().await?;
                    self.reset_slave().await?;
                    self.setup(&ChangeMaster {
                        master: new_master.instance().clone(),
                        coordinates: intermediate.executed.clone(),
                        ssl: self.options.master_ssl,
                    })
                    .await?;
                    let final_status = self.restore_replication(&status, new_master, start_if_stopped).await?;
                    return Ok(report(MoveStrategy::StoppedIntermediateMaster, final_status));
                }
            }
        }

        // 3. Sibling becomes our master
        if let Some(final_status) = self.move_sibling_to_child(new_master).await? {
            return Ok(report(MoveStrategy::SiblingToChild, final_status));
        }

        // 4. Grandchild becomes a sibling of its master
        if let Some(current) = &current_master {
            if let Some(final_status) = self.move_child_to_sibling(current, new_master).await? {
                return Ok(report(MoveStrategy::ChildToSibling, final_status));
            }
        }

        Err(Error::UnsupportedTopology)
    }

    /// Replicate from `sibling` instead of the master we share
    ///
    /// Returns `Ok(None)` when the two are not running, lag-free siblings.
    pub async fn move_sibling_to_child(&self, sibling: &Replication) -> Result<Option<SlaveStatus>> {
        let timeout = self.options.timeout;
        let (mine, theirs) = match (self.slave_status().await?, sibling.slave_status().await?) {
            (Some(mine), Some(theirs)) => (mine, theirs),
            _ => return Ok(None),
        };
        if !(self.is_sibling_of(sibling).await
            && mine.sql_running.is_running()
            && mine.lag_within(timeout)
            && theirs.sql_running.is_running()
            && theirs.lag_within(timeout))
        {
            return Ok(None);
        }
        if sibling.master_status().await?.is_none() {
            return Err(Error::Precondition(format!(
                "{} does not have binary logging enabled",
                sibling.instance()
            )));
        }

        let synced = self.stop_in_sync_with_sibling(sibling).await?;
        tracing::info!("{} and {} stopped in sync at {}", self.instance(), sibling.instance(), synced);

        let binlog = sibling.master_status().await?.ok_or_else(|| {
            Error::Internal(format!("{} stopped writing a binary log mid-move", sibling.instance()))
        })?;
        self.stop_if_running().await?;
        self.reset_slave().await?;
        self.setup(&ChangeMaster {
            master: sibling.instance().clone(),
            coordinates: binlog.coordinates,
            ssl: self.options.master_ssl,
        })
        .await?;

        self.start_slave(None, None).await?;
        sibling.start_if_stopped().await?;
        self.wait_until_replicating(sibling).await.map(Some)
    }

    /// Replicate from our master's master, next to our current master
    ///
    /// Returns `Ok(None)` when `current_master` does not replicate from
    /// `new_master`.
    pub async fn move_child_to_sibling(
        &self,
        current_master: &Replication,
        new_master: &Replication,
    ) -> Result<Option<SlaveStatus>> {
        if !current_master.is_direct_replica_of(new_master.instance()).await {
            return Ok(None);
        }

        let timeout = self.options.timeout;
        let healthy = |s: &Option<SlaveStatus>| {
            matches!(s, Some(s) if s.sql_running.is_running() && s.lag_within(timeout))
        };
        if !(healthy(&self.slave_status().await?) && healthy(&current_master.slave_status().await?)) {
            return Err(Error::Precondition(
                "There is lag on some of the hosts, or replication is otherwise problematic".into(),
            ));
        }

        current_master.stop_slave(None).await?;

        let deadline = Deadline::after(timeout);
        let mut caught_up = self.caught_up_to_master(Some(current_master)).await;
        while !caught_up && !deadline.expired() {
            tokio::time::sleep(self.options.poll_interval).await;
            caught_up = self.caught_up_to_master(Some(current_master)).await;
        }
        if !caught_up {
            tracing::warn!(
                "{} did not catch up to {}, restarting replication there",
                self.instance(),
                current_master.instance()
            );
            if let Err(e) = current_master.start_slave(None, None).await {
                tracing::error!("Could not restart replication on {}: {}", current_master.instance(), e);
            }
            return Err(Error::NotConverged(
                "We were unable to sync the replica by stopping it, tried restarting replication on master"
                    .into(),
            ));
        }

        self.stop_slave(None).await?;
        let intermediate = current_master.require_slave_status().await?;
        self.reset_slave().await?;
        self.setup(&ChangeMaster {
            master: intermediate.master.clone(),
            coordinates: intermediate.executed.clone(),
            ssl: self.options.master_ssl,
        })
        .await?;

        self.start_slave(None, None).await?;
        current_master.start_slave(None, None).await?;
        self.wait_until_replicating(current_master).await.map(Some)
    }

    /// Wait until both instances run both threads with acceptable lag
    async fn wait_until_replicating(&self, other: &Replication) -> Result<SlaveStatus> {
        let timeout = self.options.timeout;
        let deadline = Deadline::after(timeout);
        loop {
            tokio::time::sleep(self.options.sync_poll_interval).await;

            if let (Ok(Some(mine)), Ok(Some(theirs))) = (self.slave_status().await, other.slave_status().await) {
                if mine.both_running()
                    && theirs.both_running()
                    && mine.lag_within(timeout)
                    && theirs.lag_within(timeout)
                {
                    return Ok(mine);
                }
            }

            if deadline.expired() {
                return Err(Error::NotConverged(format!(
                    "Host replication did not catch up after {:?}",
                    timeout
                )));
            }
        }
    }

    /// Put threads back the way they were before the move
    async fn restore_replication(
        &self,
        before: &SlaveStatus,
        new_master: &Replication,
        start_if_stopped: bool,
    ) -> Result<SlaveStatus> {
        if start_if_stopped {
            self.start_if_stopped().await?;
            new_master.start_if_stopped().await?;
        } else {
            self.restore_threads(before.io_running.is_running(), before.sql_running.is_running())
                .await?;
        }

        self.slave_status().await?.ok_or_else(|| {
            tracing::error!("{} has no replication configured right after being set up", self.instance());
            Error::Internal(format!("{} lost its replication configuration", self.instance()))
        })
    }
}
