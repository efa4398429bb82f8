//! Graph statistics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::graph::{EdgeType, NodeType, StoreCounts};

use super::cache::CacheStats;
use super::mirror::Mirror;

/// Snapshot of graph size, shape and cache behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    /// Nodes in the mirror
    pub node_count: usize,
    /// Edges in the mirror
    pub edge_count: usize,
    /// `2m / n`
    pub avg_degree: f64,
    /// `m / (n (n - 1))` for a directed graph
    pub density: f64,
    pub node_type_histogram: BTreeMap<NodeType, usize>,
    pub edge_type_histogram: BTreeMap<EdgeType, usize>,
    pub cache: CacheStats,
    /// `None` when the store could not be reached
    pub store_node_count: Option<u64>,
    pub store_edge_count: Option<u64>,
    /// Store round trips issued by engine operations
    pub store_queries: u64,
}

impl GraphStatistics {
    pub fn collect(
        mirror: &Mirror,
        cache: CacheStats,
        store: Option<StoreCounts>,
        store_queries: u64,
    ) -> Self {
        let n = mirror.node_count();
        let m = mirror.edge_count();
        Self {
            node_count: n,
            edge_count: m,
            avg_degree: avg_degree(n, m),
            density: density(n, m),
            node_type_histogram: mirror.node_type_histogram(),
            edge_type_histogram: mirror.edge_type_histogram(),
            cache,
            store_node_count: store.map(|c| c.nodes),
            store_edge_count: store.map(|c| c.edges),
            store_queries,
        }
    }
}

pub fn avg_degree(nodes: usize, edges: usize) -> f64 {
    if nodes == 0 {
        0.0
    } else {
        2.0 * edges as f64 / nodes as f64
    }
}

pub fn density(nodes: usize, edges: usize) -> f64 {
    if nodes < 2 {
        0.0
    } else {
        edges as f64 / (nodes as f64 * (nodes as f64 - 1.0))
    }
}
