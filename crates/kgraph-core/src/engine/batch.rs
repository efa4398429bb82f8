//! Batch staging for the write path
//!
//! Staging turns upstream inputs into the entities that will be persisted.
//! Items that resolve to an entity already seen (in the mirror, the store or
//! earlier in the same batch) reinforce it; repeated items compose in input
//! order. Nothing here touches shared state, so a failed persist leaves the
//! mirror untouched.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::domain::graph::{Edge, EdgeInput, Node, NodeInput};

/// Result of staging a batch
#[derive(Debug, Clone, Default)]
pub struct Staged<T> {
    /// Resulting entity per accepted input, in input order
    pub results: Vec<T>,
    /// Final state of each distinct entity, in first-seen order
    pub to_persist: Vec<T>,
    /// Inputs dropped by validation
    pub rejected: usize,
}

/// Stage node inputs against the nodes that already exist
pub fn stage_nodes(inputs: Vec<NodeInput>, existing: &HashMap<String, Node>) -> Staged<Node> {
    let mut staged: HashMap<String, Node> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut results = Vec::with_capacity(inputs.len());
    let mut rejected = 0;

    for input in inputs {
        if let Err(err) = input.validate() {
            warn!(error = %err, name = %input.name, "Dropping node from batch");
            rejected += 1;
            continue;
        }

        let id = input.id();
        let incoming = input.into_node();
        let node = match staged.get_mut(&id) {
            Some(node) => {
                node.reinforce(&incoming);
                node.clone()
            }
            None => {
                let node = match existing.get(&id) {
                    Some(current) => {
                        let mut node = current.clone();
                        node.reinforce(&incoming);
                        node
                    }
                    None => incoming,
                };
                order.push(id.clone());
                staged.insert(id, node.clone());
                node
            }
        };
        results.push(node);
    }

    Staged {
        results,
        to_persist: order.into_iter().filter_map(|id| staged.remove(&id)).collect(),
        rejected,
    }
}

/// Stage edge inputs; edges whose endpoints are not in `known_nodes` are dropped
pub fn stage_edges(
    inputs: Vec<EdgeInput>,
    existing: &HashMap<String, Edge>,
    known_nodes: &HashSet<String>,
) -> Staged<Edge> {
    let mut staged: HashMap<String, Edge> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut results = Vec::with_capacity(inputs.len());
    let mut rejected = 0;

    for input in inputs {
        if let Err(err) = input.validate() {
            warn!(error = %err, "Dropping edge from batch");
            rejected += 1;
            continue;
        }
        if !known_nodes.contains(&input.source_id) || !known_nodes.contains(&input.target_id) {
            warn!(
                source = %input.source_id,
                target = %input.target_id,
                edge_type = %input.edge_type,
                "Dropping edge with missing endpoint"
            );
            rejected += 1;
            continue;
        }

        let id = input.id();
        let incoming = input.into_edge();
        let edge = match staged.get_mut(&id) {
            Some(edge) => {
                edge.reinforce(&incoming);
                edge.clone()
            }
            None => {
                let edge = match existing.get(&id) {
                    Some(current) => {
                        let mut edge = current.clone();
                        edge.reinforce(&incoming);
                        edge
                    }
                    None => incoming,
                };
                order.push(id.clone());
                staged.insert(id, edge.clone());
                edge
            }
        };
        results.push(edge);
    }

    Staged {
        results,
        to_persist: order.into_iter().filter_map(|id| staged.remove(&id)).collect(),
        rejected,
    }
}
