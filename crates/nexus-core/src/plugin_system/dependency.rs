use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use thiserror::Error;

use crate::plugin_system::descriptor::PluginDescriptor;

/// Index of a node inside a [`DependencyGraph`]
pub type NodeId = usize;

/// Error that can occur when resolving dependencies
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// A dependency is not part of the descriptor set
    #[error("Plugin '{plugin}' depends on '{dependency}', which is not configured")]
    MissingPlugin { plugin: String, dependency: String },

    /// Dependency cycle detected; holds every node that could not be ordered
    #[error("Circular dependency detected among: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    /// Two descriptors share an id
    #[error("Duplicate plugin id: {0}")]
    DuplicatePlugin(String),

    /// Version string is not valid semver
    #[error("Plugin '{plugin_id}' has invalid version '{version}': {reason}")]
    InvalidVersion { plugin_id: String, version: String, reason: String },
}

#[derive(Debug, Clone)]
struct Node {
    id: String,
    priority: i32,
    /// Nodes this node depends on (must load first)
    dependencies: Vec<NodeId>,
    /// Nodes depending on this node
    dependents: Vec<NodeId>,
}

/// Arena-backed directed graph; edge A -> B means "A depends on B"
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: HashMap<String, NodeId>,
}

impl DependencyGraph {
    /// Build the graph, rejecting duplicate ids, invalid versions and missing dependencies
    pub fn build(descriptors: &[PluginDescriptor]) -> Result<Self, DependencyError> {
        let mut graph = DependencyGraph::default();

        for descriptor in descriptors {
            if graph.index.contains_key(&descriptor.id) {
                return Err(DependencyError::DuplicatePlugin(descriptor.id.clone()));
            }
            if let Err(e) = semver::Version::parse(&descriptor.version) {
                return Err(DependencyError::InvalidVersion {
                    plugin_id: descriptor.id.clone(),
                    version: descriptor.version.clone(),
                    reason: e.to_string(),
                });
            }
            graph.index.insert(descriptor.id.clone(), graph.nodes.len());
            graph.nodes.push(Node {
                id: descriptor.id.clone(),
                priority: descriptor.priority,
                dependencies: Vec::new(),
                dependents: Vec::new(),
            });
        }

        for descriptor in descriptors {
            let from = graph.index[&descriptor.id];
            for dep in &descriptor.dependencies {
                let Some(&to) = graph.index.get(dep) else {
                    return Err(DependencyError::MissingPlugin {
                        plugin: descriptor.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                graph.nodes[from].dependencies.push(to);
                graph.nodes[to].dependents.push(from);
            }
        }
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_id(&self, id: &str) -> Option<NodeId> {
        self.index.get(id).copied()
    }

    /// Topological sort (Kahn's algorithm).
    ///
    /// Among ready nodes the lowest priority value goes first, then the lowest
    /// id. Nodes left over when no progress is possible are reported as a cycle.
    pub fn resolve(&self) -> Result<Vec<String>, DependencyError> {
        let mut remaining: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut ready: BinaryHeap<Reverse<(i32, &str, NodeId)>> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(n, _)| remaining[*n] == 0)
            .map(|(n, node)| Reverse((node.priority, node.id.as_str(), n)))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, id, n))) = ready.pop() {
            order.push(id.to_string());
            for &dependent in &self.nodes[n].dependents {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    let node = &self.nodes[dependent];
                    ready.push(Reverse((node.priority, node.id.as_str(), dependent)));
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            let mut cycle: Vec<String> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(n, _)| remaining[*n] > 0)
                .map(|(_, node)| node.id.clone())
                .collect();
            cycle.sort();
            Err(DependencyError::CyclicDependency(cycle))
        }
    }
}

/// Build the graph for `descriptors` and resolve its load order
pub fn resolve_load_order(descriptors: &[PluginDescriptor]) -> Result<Vec<String>, DependencyError> {
    DependencyGraph::build(descriptors)?.resolve()
}
