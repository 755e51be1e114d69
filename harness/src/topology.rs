use crate::error::{self, Result};
use snafu::ensure;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

pub const DEFAULT_MASTER_NODE_NAME: &str = "k3s-node-0";
pub const DEFAULT_WORKER_NODE_NAMES: &[&str] = &["k3s-node-1"];
pub const DEFAULT_REGISTRY_NODE_NAME: &str = "k3s-registry";
pub const DEFAULT_NODE_PREFIX: &str = "k3s-";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NodeRole {
    Master,
    Worker,
    Registry,
}

impl Display for NodeRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Worker => write!(f, "worker"),
            NodeRole::Registry => write!(f, "registry"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Node {
    pub name: String,
    pub role: NodeRole,
}

/// The fixed shape of a disposable cluster: one master, an ordered list of workers and one
/// registry. Names are the keys used with the virtualization tool and are unique.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Topology {
    master: String,
    workers: Vec<String>,
    registry: String,
    /// Every node name starts with this; the virtualization status query is matched against it.
    prefix: String,
}

impl Topology {
    pub fn new<S>(master: S, workers: Vec<String>, registry: S, prefix: S) -> Result<Self>
    where
        S: Into<String>,
    {
        let topology = Self {
            master: master.into(),
            workers,
            registry: registry.into(),
            prefix: prefix.into(),
        };
        let mut seen = HashSet::new();
        for node in topology.nodes() {
            ensure!(
                seen.insert(node.name.clone()),
                error::DuplicateNodeSnafu { name: node.name }
            );
        }
        Ok(topology)
    }

    pub fn master(&self) -> &str {
        &self.master
    }

    pub fn workers(&self) -> &[String] {
        &self.workers
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// All nodes: master first, then workers in configured order, then the registry.
    pub fn nodes(&self) -> Vec<Node> {
        std::iter::once(Node {
            name: self.master.clone(),
            role: NodeRole::Master,
        })
        .chain(self.workers.iter().map(|name| Node {
            name: name.clone(),
            role: NodeRole::Worker,
        }))
        .chain(std::iter::once(Node {
            name: self.registry.clone(),
            role: NodeRole::Registry,
        }))
        .collect()
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes().into_iter().map(|node| node.name).collect()
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            master: DEFAULT_MASTER_NODE_NAME.to_string(),
            workers: DEFAULT_WORKER_NODE_NAMES
                .iter()
                .map(ToString::to_string)
                .collect(),
            registry: DEFAULT_REGISTRY_NODE_NAME.to_string(),
            prefix: DEFAULT_NODE_PREFIX.to_string(),
        }
    }
}
