//! Domain layer
//!
//! Contains the graph model and the repository contract.

pub mod graph;
