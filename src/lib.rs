//! WolfTopo - MariaDB Replication Topology Manager
//!
//! Inspects and safely rearranges MariaDB primary/replica trees: reads
//! replication status, classifies how two instances relate, starts and stops
//! replication threads, and repoints a replica at a new master without losing
//! or duplicating transactions.
//!
//! # Architecture
//!
//! The engine only talks to databases through the [`executor::QueryExecutor`]
//! and [`executor::Connector`] traits. A [`replication::Replication`] handle
//! wraps one connection and carries every operation for that instance.
//!
//! # Features
//!
//! - Typed `SHOW SLAVE STATUS` / `SHOW MASTER STATUS` snapshots
//! - Sibling, direct replica, grandchild and circular relationship checks
//! - IO/SQL thread control with bounded confirmation polling
//! - GTID mode switching that restores the previous thread state
//! - Four-strategy topology moves, including stop-in-sync of siblings
//! - Concurrent replica discovery and replication tree rendering

pub mod config;
pub mod error;
pub mod instance;
pub mod status;
pub mod executor;
pub mod replication;
pub mod discovery;

pub use config::WolfTopoConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfTopoConfig;
    pub use crate::error::{Error, Result};
    pub use crate::instance::Instance;
    pub use crate::status::{BinlogCoordinates, GtidMode, MasterStatus, ReplicationThread, SlaveStatus, ThreadState};
    pub use crate::executor::{Connector, MariaDbConnector, QueryExecutor};
    pub use crate::replication::{MoveReport, Relationship, Replication, ReplicationOptions};
    pub use crate::discovery::{replication_tree, TreeNode};
}
