//! Relationship Classifier
//!
//! Pure predicates over status snapshots, plus the live checks on
//! [`Replication`] that fetch those snapshots first.

use std::fmt;

use serde::Serialize;

use super::Replication;
use crate::instance::Instance;
use crate::status::{MasterStatus, SlaveStatus};

/// Whether `status` reports `master` as its current master
pub fn is_direct_replica_of(status: Option<&SlaveStatus>, master: &Instance) -> bool {
    matches!(status, Some(s) if s.master.is_same_instance_as(master))
}

/// Whether two distinct instances follow the same master
pub fn are_siblings(
    a: &Instance,
    a_master: Option<&Instance>,
    b: &Instance,
    b_master: Option<&Instance>,
) -> bool {
    match (a_master, b_master) {
        (Some(x), Some(y)) => !a.is_same_instance_as(b) && x.is_same_instance_as(y),
        _ => false,
    }
}

/// Whether the replica has executed everything its master has written
pub fn caught_up(slave: &SlaveStatus, master: &MasterStatus) -> bool {
    slave.executed == master.coordinates
}

/// An instance with its master and its master's master
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub instance: Instance,
    pub master: Option<Instance>,
    pub grandmaster: Option<Instance>,
}

/// How one instance relates to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Relationship {
    #[serde(rename = "self")]
    SelfRef,
    /// Each replicates from the other
    Circular,
    DirectReplicaOf,
    SiblingOf,
    GrandchildOf,
    Unrelated,
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Relationship::SelfRef => "self",
            Relationship::Circular => "circular",
            Relationship::DirectReplicaOf => "direct-replica-of",
            Relationship::SiblingOf => "sibling-of",
            Relationship::GrandchildOf => "grandchild-of",
            Relationship::Unrelated => "unrelated",
        };
        f.write_str(s)
    }
}

/// Relationship of `a` to `b`
pub fn classify(a: &Lineage, b: &Lineage) -> Relationship {
    let is = |x: Option<&Instance>, y: &Instance| matches!(x, Some(x) if x.is_same_instance_as(y));

    if a.instance.is_same_instance_as(&b.instance) {
        Relationship::SelfRef
    } else if is(a.master.as_ref(), &b.instance) && is(b.master.as_ref(), &a.instance) {
        Relationship::Circular
    } else if is(a.master.as_ref(), &b.instance) {
        Relationship::DirectReplicaOf
    } else if are_siblings(&a.instance, a.master.as_ref(), &b.instance, b.master.as_ref()) {
        Relationship::SiblingOf
    } else if is(a.grandmaster.as_ref(), &b.instance) {
        Relationship::GrandchildOf
    } else {
        Relationship::Unrelated
    }
}

impl Replication {
    /// Whether this instance currently replicates from `master`
    pub async fn is_direct_replica_of(&self, master: &Instance) -> bool {
        match self.slave_status().await {
            Ok(status) => is_direct_replica_of(status.as_ref(), master),
            Err(e) => {
                tracing::debug!("Could not read slave status of {}: {}", self.instance(), e);
                false
            }
        }
    }

    /// Whether this instance and `other` share a current master
    pub async fn is_sibling_of(&self, other: &Replication) -> bool {
        if self.instance().is_same_instance_as(other.instance()) {
            return false;
        }
        let mine = self.master().await;
        let theirs = other.master().await;
        are_siblings(self.instance(), mine.as_ref(), other.instance(), theirs.as_ref())
    }

    /// Whether this replica has executed everything its master has written
    ///
    /// Connects to the current master when `master` is not given. A snapshot
    /// comparison; callers poll it while the master takes writes.
    pub async fn caught_up_to_master(&self, master: Option<&Replication>) -> bool {
        let status = match self.slave_status().await {
            Ok(Some(status)) => status,
            _ => return false,
        };

        let opened;
        let master = match master {
            Some(master) => master,
            None => match self.open(&status.master).await {
                Ok(handle) => {
                    opened = handle;
                    &opened
                }
                Err(e) => {
                    tracing::debug!("Could not connect to master of {}: {}", self.instance(), e);
                    return false;
                }
            },
        };

        match master.master_status().await {
            Ok(Some(master_status)) => caught_up(&status, &master_status),
            _ => false,
        }
    }

    /// This instance, its master and its master's master
    pub async fn lineage(&self) -> Lineage {
        let master = self.master().await;
        let grandmaster = match &master {
            Some(m) => match self.open(m).await {
                Ok(handle) => handle.master().await,
                Err(e) => {
                    tracing::debug!("Could not connect to {}: {}", m, e);
                    None
                }
            },
            None => None,
        };

        Lineage {
            instance: self.instance().clone(),
            master,
            grandmaster,
        }
    }

    /// How this instance relates to `other`
    pub async fn relationship_to(&self, other: &Replication) -> Relationship {
        let mine = self.lineage().await;
        let theirs = other.lineage().await;
        classify(&mine, &theirs)
    }
}
