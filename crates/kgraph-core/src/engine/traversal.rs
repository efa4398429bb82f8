//! Multi-hop traversal
//!
//! Two strategies share one result shape: a breadth-first search over the
//! mirror, and a recursive query against the store whose rows are hydrated
//! back into nodes here.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::domain::graph::{Edge, EdgeType, Node, TraversalRow};

use super::mirror::Mirror;

/// Where a traversal runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalStrategy {
    /// Pick per call from depth and mirror size
    #[default]
    Auto,
    /// Breadth-first search over the mirror
    InMemory,
    /// Recursive query against the durable store
    Store,
}

impl TraversalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::InMemory => "in_memory",
            Self::Store => "store",
        }
    }
}

/// A node reached by a traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedNode {
    pub node: Node,
    /// Minimum hop count from the start node
    pub depth: u32,
    /// Node ids from the start node to this node, inclusive
    pub path: Vec<String>,
}

/// Result of `find_related`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedGraph {
    /// Reachable nodes ordered by depth, then id; the start node is excluded
    pub nodes: Vec<RelatedNode>,
    /// Filter-passing edges among the start node and `nodes`
    pub edges: Vec<Edge>,
}

impl RelatedGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.node.id.as_str()).collect()
    }
}

/// Parameters of a traversal
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalParams<'a> {
    pub start_id: &'a str,
    pub max_depth: u32,
    pub edge_types: Option<&'a [EdgeType]>,
    pub min_weight: f64,
}

/// Choose a strategy for `Auto`
pub fn choose_strategy(max_depth: u32, mirror_nodes: usize, memory_threshold: usize) -> TraversalStrategy {
    if max_depth <= 2 && mirror_nodes < memory_threshold {
        TraversalStrategy::InMemory
    } else {
        TraversalStrategy::Store
    }
}

/// Breadth-first search over the mirror
pub fn bfs(mirror: &Mirror, params: &TraversalParams<'_>) -> RelatedGraph {
    if !mirror.contains_node(params.start_id) {
        return RelatedGraph::default();
    }

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(params.start_id.to_string());

    let mut reached: Vec<(String, u32, Vec<String>)> = Vec::new();
    let mut queue: VecDeque<(String, u32, Vec<String>)> = VecDeque::new();
    queue.push_back((params.start_id.to_string(), 0, vec![params.start_id.to_string()]));

    while let Some((current, depth, path)) = queue.pop_front() {
        if depth >= params.max_depth {
            continue;
        }

        let mut next: Vec<&Edge> = mirror
            .outgoing(&current)
            .filter(|e| e.passes(params.edge_types, params.min_weight))
            .collect();
        next.sort_by(|a, b| a.target_id.cmp(&b.target_id));

        for edge in next {
            if !visited.insert(edge.target_id.clone()) {
                continue;
            }
            let mut next_path = path.clone();
            next_path.push(edge.target_id.clone());
            reached.push((edge.target_id.clone(), depth + 1, next_path.clone()));
            queue.push_back((edge.target_id.clone(), depth + 1, next_path));
        }
    }

    // nothing reached means no edges either, self-loops included
    if reached.is_empty() {
        return RelatedGraph::default();
    }

    let mut members: HashSet<&str> = reached.iter().map(|(id, _, _)| id.as_str()).collect();
    members.insert(params.start_id);

    let mut edges: Vec<Edge> = members
        .iter()
        .flat_map(|id| mirror.outgoing(id))
        .filter(|e| members.contains(e.target_id.as_str()))
        .filter(|e| e.passes(params.edge_types, params.min_weight))
        .cloned()
        .collect();
    edges.sort_by(|a, b| a.id.cmp(&b.id));

    let mut nodes: Vec<RelatedNode> = reached
        .into_iter()
        .filter_map(|(id, depth, path)| {
            mirror.get_node(&id).map(|node| RelatedNode {
                node: node.clone(),
                depth,
                path,
            })
        })
        .collect();
    sort_related(&mut nodes);

    RelatedGraph { nodes, edges }
}

/// Assemble a store traversal result
///
/// `known` holds every node the caller could resolve from the mirror or
/// the store; anything else becomes a stand-in so the row is not lost.
pub fn from_store_rows(
    rows: Vec<TraversalRow>,
    mut known: HashMap<String, Node>,
    mut edges: Vec<Edge>,
) -> RelatedGraph {
    let mut nodes: Vec<RelatedNode> = rows
        .into_iter()
        .map(|row| {
            let node = known
                .remove(&row.node_id)
                .unwrap_or_else(|| Node::stand_in(row.node_id.clone()));
            RelatedNode {
                node,
                depth: row.depth,
                path: row.path,
            }
        })
        .collect();
    sort_related(&mut nodes);
    edges.sort_by(|a, b| a.id.cmp(&b.id));
    edges.dedup_by(|a, b| a.id == b.id);

    RelatedGraph { nodes, edges }
}

fn sort_related(nodes: &mut [RelatedNode]) {
    nodes.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.node.id.cmp(&b.node.id)));
}
