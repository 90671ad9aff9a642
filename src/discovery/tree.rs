//! Replication tree
//!
//! Recursive walk over replica discovery. Every visited instance goes into a
//! set owned by the caller; an instance met a second time is reported as
//! circular and its replicas are not expanded again.

use std::collections::HashSet;
use std::fmt;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;

use crate::instance::Instance;
use crate::replication::Replication;
use crate::status::ThreadState;

/// One instance in a replication tree
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub instance: Instance,
    pub name: String,
    /// Seconds behind master, `None` for the root or when unknown
    pub lag: Option<u64>,
    pub io_running: Option<ThreadState>,
    pub sql_running: Option<ThreadState>,
    /// Already seen higher up in the walk
    pub circular: bool,
    pub replicas: Vec<TreeNode>,
}

impl TreeNode {
    /// Number of nodes in this subtree
    pub fn count(&self) -> usize {
        1 + self.replicas.iter().map(TreeNode::count).sum::<usize>()
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let marker = match (depth, self.circular) {
            (_, true) => "∞ ",
            (0, false) => "",
            _ => "+ ",
        };
        write!(f, "{}{}{}", "  ".repeat(depth), marker, self.name)?;
        if let (Some(io), Some(sql)) = (self.io_running, self.sql_running) {
            write!(f, ", io: {}, sql: {}", io, sql)?;
            if let Some(lag) = self.lag {
                write!(f, ", lag: {}", lag)?;
            }
        }
        writeln!(f)?;
        for replica in &self.replicas {
            replica.render(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

/// Walk the replicas of `root` down to `max_depth` levels
pub async fn replication_tree(root: &Replication, max_depth: usize) -> TreeNode {
    let mut visited = HashSet::new();
    walk(root.clone(), 0, max_depth, &mut visited).await
}

fn walk<'a>(
    node: Replication,
    depth: usize,
    max_depth: usize,
    visited: &'a mut HashSet<Instance>,
) -> BoxFuture<'a, TreeNode> {
    async move {
        let status = match node.slave_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::debug!("Could not read slave status of {}: {}", node.instance(), e);
                None
            }
        };
        let mut tree = TreeNode {
            instance: node.instance().clone(),
            name: node.instance().name(),
            lag: status.as_ref().and_then(|s| s.lag()),
            io_running: status.as_ref().map(|s| s.io_running),
            sql_running: status.as_ref().map(|s| s.sql_running),
            circular: false,
            replicas: Vec::new(),
        };

        if !visited.insert(node.instance().clone()) {
            tree.circular = true;
            return tree;
        }
        if depth >= max_depth {
            tracing::warn!("Replication tree deeper than {} levels, not expanding {}", max_depth, tree.name);
            return tree;
        }

        for replica in node.replicas().await {
            let child = walk(replica, depth + 1, max_depth, visited).await;
            tree.replicas.push(child);
        }
        tree
    }
    .boxed()
}
