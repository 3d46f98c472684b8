use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use super::structs::Service;
use super::Result;

/// The inter-dependency DAG of a service catalogue.
///
/// Edges point from a dependency to its dependent, so a topological order of
/// the graph is a valid activation order and its reverse a valid
/// deactivation order.
pub struct ServiceGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl ServiceGraph {
    /// Build the graph, failing on dangling inter-dependency references.
    pub fn build(services: &[Service]) -> Result<ServiceGraph> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for svc in services {
            let node = graph.add_node(svc.key.clone());
            if index.insert(svc.key.clone(), node).is_some() {
                bail!("service {} is defined more than once", svc.key);
            }
        }
        for svc in services {
            let dependent = index[&svc.key];
            for dep in svc.dependencies() {
                let dependency = match index.get(dep) {
                    Some(n) => *n,
                    None => bail!("service {} inter-depends on unknown service {}", svc.key, dep),
                };
                graph.add_edge(dependency, dependent, ());
            }
        }

        Ok(ServiceGraph { graph, index })
    }

    /// Reject cyclic inter-dependencies.
    pub fn check_acyclic(&self) -> Result<()> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => {
                let key = &self.graph[cycle.node_id()];
                bail!("the inter-dependency graph has a cycle through service {}", key)
            }
        }
    }

    /// Topological waves over a subset of the catalogue.
    ///
    /// Ordering constraints flow through every service in `keys`, so callers
    /// include the unchanged services of an upgrade even when nothing will be
    /// executed for them. Services within one wave have no ordering
    /// constraint between them. Waves are sorted internally to keep runs
    /// deterministic.
    pub fn waves(&self, keys: &HashSet<String>) -> Vec<Vec<String>> {
        let mut indegree: HashMap<NodeIndex, usize> = HashMap::new();
        for key in keys {
            if let Some(&node) = self.index.get(key) {
                let d = self
                    .graph
                    .neighbors_directed(node, Direction::Incoming)
                    .filter(|n| keys.contains(&self.graph[*n]))
                    .count();
                indegree.insert(node, d);
            }
        }

        let mut waves = Vec::new();
        let mut ready: Vec<NodeIndex> = indegree
            .iter()
            .filter(|&(_, d)| *d == 0)
            .map(|(n, _)| *n)
            .collect();

        while !ready.is_empty() {
            let mut wave: Vec<String> = ready.iter().map(|n| self.graph[*n].clone()).collect();
            wave.sort();

            let mut next = Vec::new();
            for node in ready {
                for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    if let Some(d) = indegree.get_mut(&succ) {
                        *d -= 1;
                        if *d == 0 {
                            next.push(succ);
                        }
                    }
                }
                indegree.remove(&node);
            }
            waves.push(wave);
            ready = next;
        }

        waves
    }
}
