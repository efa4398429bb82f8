//! Filtered subgraph extraction

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::graph::{Edge, EdgeType, Node, NodeQuery, NodeType};

use super::cache::CacheKey;
use super::mirror::Mirror;

/// Filter for `get_subgraph`; empty type lists mean "all types"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphQuery {
    pub node_types: Vec<NodeType>,
    pub edge_types: Vec<EdgeType>,
    pub min_importance: f64,
    pub max_nodes: usize,
}

impl Default for SubgraphQuery {
    fn default() -> Self {
        Self {
            node_types: Vec::new(),
            edge_types: Vec::new(),
            min_importance: 0.0,
            max_nodes: 1_000,
        }
    }
}

impl SubgraphQuery {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new("get_subgraph")
            .with_list("node_types", &self.node_types)
            .with_list("edge_types", &self.edge_types)
            .with_f64("min_importance", self.min_importance)
            .with("max_nodes", self.max_nodes)
    }

    /// Equivalent store range query
    pub fn node_query(&self) -> NodeQuery {
        NodeQuery::new()
            .with_types(self.node_types.clone())
            .with_min_importance(self.min_importance)
            .with_limit(self.max_nodes)
    }

    fn accepts_node(&self, node: &Node) -> bool {
        node.importance >= self.min_importance
            && (self.node_types.is_empty() || self.node_types.contains(&node.node_type))
    }

    fn accepts_edge(&self, edge: &Edge) -> bool {
        self.edge_types.is_empty() || self.edge_types.contains(&edge.edge_type)
    }
}

/// Nodes and the edges among them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Filter the mirror
pub fn from_mirror(mirror: &Mirror, query: &SubgraphQuery) -> Subgraph {
    let mut nodes: Vec<Node> = mirror
        .nodes()
        .filter(|n| query.accepts_node(n))
        .cloned()
        .collect();
    sort_by_importance(&mut nodes);
    nodes.truncate(query.max_nodes);

    let edges = mirror.edges().cloned().collect();
    assemble(nodes, edges, query)
}

/// Keep the edges of an allowed type whose endpoints both survived
pub fn assemble(mut nodes: Vec<Node>, edges: Vec<Edge>, query: &SubgraphQuery) -> Subgraph {
    sort_by_importance(&mut nodes);
    let kept: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    let mut edges: Vec<Edge> = edges
        .into_iter()
        .filter(|e| query.accepts_edge(e))
        .filter(|e| kept.contains(e.source_id.as_str()) && kept.contains(e.target_id.as_str()))
        .collect();
    edges.sort_by(|a, b| a.id.cmp(&b.id));
    edges.dedup_by(|a, b| a.id == b.id);

    Subgraph { nodes, edges }
}

fn sort_by_importance(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then(b.access_count.cmp(&a.access_count))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror() -> (Mirror, Vec<Node>) {
        let nodes = vec![
            Node::new("svc", NodeType::Project).with_importance(0.9),
            Node::new("postgres", NodeType::Technology).with_importance(0.7),
            Node::new("redis", NodeType::Technology).with_importance(0.3),
            Node::new("use-cache", NodeType::Decision).with_importance(0.6),
        ];
        let mut mirror = Mirror::new(100);
        for n in &nodes {
            mirror.insert_node(n.clone());
        }
        mirror.insert_edge(Edge::new(&nodes[0].id, &nodes[1].id, EdgeType::Uses));
        mirror.insert_edge(Edge::new(&nodes[0].id, &nodes[2].id, EdgeType::Uses));
        mirror.insert_edge(Edge::new(&nodes[3].id, &nodes[2].id, EdgeType::Influences));
        (mirror, nodes)
    }

    #[test]
    fn test_filters_by_type_and_importance() {
        let (mirror, nodes) = mirror();
        let query = SubgraphQuery {
            node_types: vec![NodeType::Project, NodeType::Technology],
            min_importance: 0.5,
            ..SubgraphQuery::default()
        };

        let sub = from_mirror(&mirror, &query);
        assert_eq!(
            sub.nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>(),
            vec![nodes[0].id.clone(), nodes[1].id.clone()]
        );
        assert_eq!(sub.edges.len(), 1);
    }

    #[test]
    fn test_cap_applies_in_importance_order() {
        let (mirror, nodes) = mirror();
        let query = SubgraphQuery {
            max_nodes: 2,
            ..SubgraphQuery::default()
        };

        let sub = from_mirror(&mirror, &query);
        assert_eq!(sub.nodes.len(), 2);
        assert_eq!(sub.nodes[0].id, nodes[0].id);
        assert_eq!(sub.nodes[1].id, nodes[1].id);
    }

    #[test]
    fn test_edge_type_filter() {
        let (mirror, _) = mirror();
        let query = SubgraphQuery {
            edge_types: vec![EdgeType::Influences],
            ..SubgraphQuery::default()
        };

        let sub = from_mirror(&mirror, &query);
        assert_eq!(sub.nodes.len(), 4);
        assert_eq!(sub.edges.len(), 1);
        assert_eq!(sub.edges[0].edge_type, EdgeType::Influences);
    }

    #[test]
    fn test_cache_key_ignores_list_order() {
        let a = SubgraphQuery {
            node_types: vec![NodeType::Tool, NodeType::Skill],
            ..SubgraphQuery::default()
        };
        let b = SubgraphQuery {
            node_types: vec![NodeType::Skill, NodeType::Tool],
            ..SubgraphQuery::default()
        };
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
