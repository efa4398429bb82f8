//! Repository trait for graph persistence
//!
//! The durable store is the source of truth for the graph. The engine only
//! talks to it through this trait so alternative backends can be plugged in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::edge::{Edge, EdgeType};
use super::node::{Node, NodeType};

/// Repository trait for graph persistence
#[async_trait]
pub trait GraphRepository: Send + Sync {
    // ========== Schema ==========

    /// Create or upgrade the schema; safe to call repeatedly
    async fn ensure_schema(&self) -> Result<()>;

    // ========== Writes ==========

    /// Insert or update a batch of nodes in one transaction
    async fn upsert_nodes(&self, nodes: &[Node]) -> Result<()>;

    /// Insert or update a batch of edges in one transaction
    async fn upsert_edges(&self, edges: &[Edge]) -> Result<()>;

    /// Write back importance scores
    async fn update_importance(&self, updates: &[(String, f64)]) -> Result<()>;

    // ========== Point queries ==========

    async fn get_node(&self, id: &str) -> Result<Option<Node>>;

    async fn get_nodes(&self, ids: &[String]) -> Result<Vec<Node>>;

    async fn get_edge(&self, id: &str) -> Result<Option<Edge>>;

    async fn get_edges(&self, ids: &[String]) -> Result<Vec<Edge>>;

    /// Subset of `ids` that exist as nodes
    async fn existing_node_ids(&self, ids: &[String]) -> Result<Vec<String>>;

    // ========== Range queries ==========

    /// Nodes matching a filter, ordered by importance then access count
    async fn query_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>>;

    /// The `limit` most important nodes
    async fn load_top_nodes(&self, limit: usize) -> Result<Vec<Node>>;

    /// Edges whose endpoints are both among the `limit` most important nodes
    async fn load_edges_among_top(&self, limit: usize) -> Result<Vec<Edge>>;

    /// Edges with both endpoints in `ids` passing the type/weight filter
    async fn edges_among(
        &self,
        ids: &[String],
        edge_types: Option<&[EdgeType]>,
        min_weight: f64,
    ) -> Result<Vec<Edge>>;

    // ========== Traversal ==========

    /// Every node reachable from `start_id` within `max_depth` outgoing hops
    ///
    /// One row per reachable node with its minimum depth and a shortest
    /// path. The start node itself is not returned.
    async fn traverse(
        &self,
        start_id: &str,
        max_depth: u32,
        edge_types: Option<&[EdgeType]>,
        min_weight: f64,
    ) -> Result<Vec<TraversalRow>>;

    // ========== Connectivity & stats ==========

    async fn connectivity(&self, id: &str) -> Result<Option<Connectivity>>;

    async fn connectivity_all(&self) -> Result<Vec<Connectivity>>;

    async fn counts(&self) -> Result<StoreCounts>;

    /// Cheap round trip to verify the store is reachable
    async fn health_check(&self) -> Result<()>;

    /// Release store resources
    async fn close(&self);
}

/// Filter for node range queries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeQuery {
    /// Restrict to these node types (empty = all)
    pub node_types: Vec<NodeType>,
    /// Minimum importance (inclusive)
    pub min_importance: f64,
    /// Prefix of the lowercased name
    pub name_prefix: Option<String>,
    /// Maximum number of rows
    pub limit: Option<usize>,
}

impl NodeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, node_types: Vec<NodeType>) -> Self {
        self.node_types = node_types;
        self
    }

    pub fn with_min_importance(mut self, min_importance: f64) -> Self {
        self.min_importance = min_importance;
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A node reached by a store traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalRow {
    pub node_id: String,
    /// Minimum number of hops from the start node
    pub depth: u32,
    /// Node ids from the start node to this node, inclusive
    pub path: Vec<String>,
}

/// Degree summary from the connectivity view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connectivity {
    pub node_id: String,
    pub in_degree: u64,
    pub out_degree: u64,
    /// Mean weight of incident edges, 0 for isolated nodes
    pub avg_weight: f64,
}

impl Connectivity {
    pub fn degree(&self) -> u64 {
        self.in_degree + self.out_degree
    }
}

/// Row totals held by the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub nodes: u64,
    pub edges: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_query_builder() {
        let query = NodeQuery::new()
            .with_types(vec![NodeType::Decision])
            .with_min_importance(0.4)
            .with_name_prefix("auth")
            .with_limit(10);

        assert_eq!(query.node_types, vec![NodeType::Decision]);
        assert_eq!(query.min_importance, 0.4);
        assert_eq!(query.name_prefix.as_deref(), Some("auth"));
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn test_connectivity_degree() {
        let c = Connectivity {
            node_id: "a".into(),
            in_degree: 2,
            out_degree: 3,
            avg_weight: 0.5,
        };
        assert_eq!(c.degree(), 5);
    }
}
