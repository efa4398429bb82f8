//! In-memory mirror of the most important part of the graph
//!
//! The mirror holds up to `max_nodes` nodes (ranked by importance, then
//! access count on load) and every edge whose endpoints are both present.
//! Once full, new nodes stay in the store only. It is a derived cache of the
//! durable store and can always be rebuilt from it.

use std::collections::{BTreeMap, HashMap};

use crate::domain::graph::{Edge, EdgeType, Node, NodeType};

/// In-memory graph keyed by node and edge id
#[derive(Debug, Default)]
pub struct Mirror {
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
    /// Outgoing adjacency: node id -> [(neighbor id, edge id)]
    adjacency: HashMap<String, Vec<(String, String)>>,
    max_nodes: usize,
    /// Set once a node was turned away by the cap
    partial: bool,
}

impl Mirror {
    /// Create an empty mirror that holds at most `max_nodes` nodes
    pub fn new(max_nodes: usize) -> Self {
        Self {
            max_nodes,
            ..Default::default()
        }
    }

    /// Replace the contents with a fresh load from the store
    ///
    /// Nodes beyond the cap are skipped in importance order; edges are kept
    /// only when both endpoints made it in.
    pub fn load(&mut self, mut nodes: Vec<Node>, edges: Vec<Edge>) {
        self.clear();

        nodes.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then(b.access_count.cmp(&a.access_count))
                .then(a.id.cmp(&b.id))
        });
        self.partial = nodes.len() > self.max_nodes;
        nodes.truncate(self.max_nodes);

        for node in nodes {
            self.nodes.insert(node.id.clone(), node);
        }
        for edge in edges {
            self.insert_edge(edge);
        }
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.adjacency.clear();
        self.partial = false;
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// Whether every node the store knows about may be mirrored
    pub fn is_complete(&self) -> bool {
        !self.partial
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Outgoing `(neighbor id, edge id)` pairs
    pub fn adjacency(&self, id: &str) -> &[(String, String)] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Outgoing edges of a node
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.adjacency(id)
            .iter()
            .filter_map(|(_, edge_id)| self.edges.get(edge_id))
    }

    /// Insert or replace a node; returns false when the cap turns it away
    pub fn insert_node(&mut self, node: Node) -> bool {
        if !self.nodes.contains_key(&node.id) && self.nodes.len() >= self.max_nodes {
            self.partial = true;
            return false;
        }
        self.nodes.insert(node.id.clone(), node);
        true
    }

    /// Insert or replace an edge; returns false when an endpoint is missing
    pub fn insert_edge(&mut self, edge: Edge) -> bool {
        if !self.nodes.contains_key(&edge.source_id) || !self.nodes.contains_key(&edge.target_id) {
            return false;
        }
        if !self.edges.contains_key(&edge.id) {
            self.adjacency
                .entry(edge.source_id.clone())
                .or_default()
                .push((edge.target_id.clone(), edge.id.clone()));
        }
        self.edges.insert(edge.id.clone(), edge);
        true
    }

    /// Record the outcome of a spreading activation pass
    pub fn set_activations(&mut self, activations: &HashMap<String, f64>) {
        for node in self.nodes.values_mut() {
            node.activation = activations.get(&node.id).copied().unwrap_or(0.0);
        }
    }

    /// Apply importance updates to mirrored nodes
    pub fn set_importance(&mut self, updates: &[(String, f64)]) {
        for (id, importance) in updates {
            if let Some(node) = self.nodes.get_mut(id) {
                node.importance = *importance;
            }
        }
    }

    pub fn node_type_histogram(&self) -> BTreeMap<NodeType, usize> {
        let mut histogram = BTreeMap::new();
        for node in self.nodes.values() {
            *histogram.entry(node.node_type).or_insert(0) += 1;
        }
        histogram
    }

    pub fn edge_type_histogram(&self) -> BTreeMap<EdgeType, usize> {
        let mut histogram = BTreeMap::new();
        for edge in self.edges.values() {
            *histogram.entry(edge.edge_type).or_insert(0) += 1;
        }
        histogram
    }

    /// Owned, index-based copy of the topology for analytics
    pub fn snapshot(&self) -> GraphView {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort();
        let node_index: HashMap<String, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut adjacency = vec![Vec::new(); ids.len()];
        for edge in self.edges.values() {
            if let (Some(&src), Some(&tgt)) =
                (node_index.get(&edge.source_id), node_index.get(&edge.target_id))
            {
                adjacency[src].push(ViewEdge {
                    target_index: tgt,
                    weight: edge.weight,
                    edge_type: edge.edge_type,
                });
            }
        }
        for edges in &mut adjacency {
            edges.sort_by_key(|e| e.target_index);
        }

        GraphView {
            ids,
            node_index,
            adjacency,
        }
    }
}

/// Compact edge in a [`GraphView`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewEdge {
    pub target_index: usize,
    pub weight: f64,
    pub edge_type: EdgeType,
}

/// Dense-index snapshot of the mirror topology
///
/// Analytics run on this owned copy off the async runtime, so they never
/// hold the mirror lock.
#[derive(Debug, Clone, Default)]
pub struct GraphView {
    /// Node ids by dense index
    pub ids: Vec<String>,
    /// Map from node id to dense index
    pub node_index: HashMap<String, usize>,
    /// `adjacency[i]` = outgoing edges from node `i`
    pub adjacency: Vec<Vec<ViewEdge>>,
}

impl GraphView {
    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.node_index.get(id).copied()
    }

    /// Incoming adjacency, built on demand
    pub fn reverse_adjacency(&self) -> Vec<Vec<ViewEdge>> {
        let mut reverse = vec![Vec::new(); self.ids.len()];
        for (source, edges) in self.adjacency.iter().enumerate() {
            for edge in edges {
                reverse[edge.target_index].push(ViewEdge {
                    target_index: source,
                    weight: edge.weight,
                    edge_type: edge.edge_type,
                });
            }
        }
        reverse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, importance: f64) -> Node {
        Node::new(name, NodeType::Concept).with_importance(importance)
    }

    #[test]
    fn test_load_respects_cap_and_drops_orphan_edges() {
        let a = node("a", 0.9);
        let b = node("b", 0.8);
        let c = node("c", 0.1);
        let ab = Edge::new(&a.id, &b.id, EdgeType::Uses);
        let bc = Edge::new(&b.id, &c.id, EdgeType::Uses);

        let mut mirror = Mirror::new(2);
        mirror.load(vec![c.clone(), a.clone(), b.clone()], vec![ab.clone(), bc]);

        assert_eq!(mirror.node_count(), 2);
        assert!(!mirror.is_complete());
        assert!(!mirror.contains_node(&c.id));
        assert_eq!(mirror.edge_count(), 1);
        assert!(mirror.get_edge(&ab.id).is_some());
    }

    #[test]
    fn test_insert_respects_cap() {
        let a = node("a", 0.5);
        let b = node("b", 0.5);
        let mut mirror = Mirror::new(1);

        assert!(mirror.insert_node(a.clone()));
        assert!(mirror.is_complete());
        assert!(!mirror.insert_node(b.clone()));
        assert!(!mirror.is_complete());
        assert_eq!(mirror.node_count(), 1);

        // replacing a resident node is always allowed
        assert!(mirror.insert_node(a.with_importance(0.9)));
        assert_eq!(mirror.get_node(&node("a", 0.0).id).unwrap().importance, 0.9);

        mirror.clear();
        assert!(mirror.is_complete());
    }

    #[test]
    fn test_insert_edge_requires_endpoints() {
        let a = node("a", 0.5);
        let b = node("b", 0.5);
        let mut mirror = Mirror::new(10);
        mirror.insert_node(a.clone());

        assert!(!mirror.insert_edge(Edge::new(&a.id, &b.id, EdgeType::Uses)));
        mirror.insert_node(b.clone());
        assert!(mirror.insert_edge(Edge::new(&a.id, &b.id, EdgeType::Uses)));
    }

    #[test]
    fn test_replacing_edge_keeps_single_adjacency_entry() {
        let a = node("a", 0.5);
        let b = node("b", 0.5);
        let mut mirror = Mirror::new(10);
        mirror.insert_node(a.clone());
        mirror.insert_node(b.clone());

        let edge = Edge::new(&a.id, &b.id, EdgeType::Uses).with_weight(0.2);
        mirror.insert_edge(edge.clone());
        mirror.insert_edge(edge.with_weight(0.9));

        assert_eq!(mirror.adjacency(&a.id).len(), 1);
        let out: Vec<&Edge> = mirror.outgoing(&a.id).collect();
        assert_eq!(out[0].weight, 0.9);
        assert!(mirror.adjacency(&b.id).is_empty());
    }

    #[test]
    fn test_snapshot_is_dense() {
        let a = node("a", 0.5);
        let b = node("b", 0.5);
        let mut mirror = Mirror::new(10);
        mirror.insert_node(a.clone());
        mirror.insert_node(b.clone());
        mirror.insert_edge(Edge::new(&a.id, &b.id, EdgeType::Uses).with_weight(0.4));

        let view = mirror.snapshot();
        assert_eq!(view.node_count(), 2);
        assert_eq!(view.edge_count(), 1);

        let ai = view.index_of(&a.id).unwrap();
        let bi = view.index_of(&b.id).unwrap();
        assert_eq!(view.adjacency[ai][0].target_index, bi);
        assert_eq!(view.reverse_adjacency()[bi][0].target_index, ai);
    }

    #[test]
    fn test_activation_and_importance_updates() {
        let a = node("a", 0.5);
        let b = node("b", 0.5);
        let mut mirror = Mirror::new(10);
        mirror.insert_node(a.clone());
        mirror.insert_node(b.clone());

        let mut activations = HashMap::new();
        activations.insert(a.id.clone(), 0.7);
        mirror.set_activations(&activations);
        mirror.set_importance(&[(b.id.clone(), 0.9)]);

        assert_eq!(mirror.get_node(&a.id).unwrap().activation, 0.7);
        assert_eq!(mirror.get_node(&b.id).unwrap().activation, 0.0);
        assert_eq!(mirror.get_node(&b.id).unwrap().importance, 0.9);
    }

    #[test]
    fn test_histograms() {
        let mut mirror = Mirror::new(10);
        let a = Node::new("a", NodeType::Tool);
        let b = Node::new("b", NodeType::Tool);
        let c = Node::new("c", NodeType::Person);
        for n in [&a, &b, &c] {
            mirror.insert_node(n.clone());
        }
        mirror.insert_edge(Edge::new(&c.id, &a.id, EdgeType::Uses));

        let nodes = mirror.node_type_histogram();
        assert_eq!(nodes[&NodeType::Tool], 2);
        assert_eq!(nodes[&NodeType::Person], 1);
        assert_eq!(mirror.edge_type_histogram()[&EdgeType::Uses], 1);
    }
}
