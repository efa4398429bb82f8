//! kgraph Core Library
//!
//! This crate provides the core functionality for kgraph, including:
//! - Graph domain model (nodes, edges, deterministic ids, reinforcement)
//! - Storage (SQLite with versioned migrations)
//! - In-memory mirror with adaptive traversal
//! - TTL + LRU result caching
//! - Analytics (spreading activation, centrality, subgraphs, statistics)

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod infrastructure;
pub mod storage;

pub use engine::GraphEngine;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::graph::{Edge, EdgeInput, EdgeType, Node, NodeInput, NodeType};
    pub use crate::engine::{
        ActivatedNode, ActivationParams, GraphEngine, GraphStatistics, RelatedGraph, Subgraph,
        SubgraphQuery, TraversalStrategy,
    };
    pub use crate::error::{Error, Result};
}
