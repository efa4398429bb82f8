//! Graph domain model
//!
//! Typed nodes and weighted directed edges with deterministic identity,
//! plus the repository boundary to the durable store.

pub mod edge;
pub mod ids;
pub mod node;
pub mod repository;
pub mod value;

pub use edge::{Edge, EdgeInput, EdgeType};
pub use node::{Node, NodeInput, NodeType, clamp_unit};
pub use repository::{Connectivity, GraphRepository, NodeQuery, StoreCounts, TraversalRow};
pub use value::{AttributeValue, Attributes};
