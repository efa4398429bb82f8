//! Deterministic identifiers
//!
//! Node and edge ids are pure functions of their identifying fields, so
//! re-submitting the same observation always lands on the same row.

use sha2::{Digest, Sha256};

use super::edge::EdgeType;
use super::node::NodeType;

/// Number of hex characters kept from the digest
const ID_LEN: usize = 32;

/// Normalize a name for identity and prefix search
///
/// Lowercases and collapses whitespace; punctuation is kept so that
/// "c++" and "c" stay distinct.
pub fn canonical_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Id of the node identified by `(name, node_type)`
pub fn node_id(name: &str, node_type: NodeType) -> String {
    digest(&[&canonical_name(name), node_type.as_str()])
}

/// Id of the edge identified by `(source_id, target_id, edge_type)`
pub fn edge_id(source_id: &str, target_id: &str, edge_type: EdgeType) -> String {
    digest(&[source_id, target_id, edge_type.as_str()])
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            // unit separator cannot appear in canonical names
            hasher.update([0x1f]);
        }
        hasher.update(part.as_bytes());
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_is_stable() {
        let a = node_id("Tokio", NodeType::Technology);
        let b = node_id("  tokio ", NodeType::Technology);
        assert_eq!(a, b);
        assert_eq!(a.len(), ID_LEN);
    }

    #[test]
    fn test_node_id_depends_on_type() {
        assert_ne!(
            node_id("rust", NodeType::Technology),
            node_id("rust", NodeType::Skill)
        );
    }

    #[test]
    fn test_edge_id_is_directional() {
        let forward = edge_id("a", "b", EdgeType::Uses);
        let backward = edge_id("b", "a", EdgeType::Uses);
        assert_ne!(forward, backward);
        assert_eq!(forward, edge_id("a", "b", EdgeType::Uses));
    }

    #[test]
    fn test_separator_prevents_collisions() {
        assert_ne!(
            edge_id("ab", "c", EdgeType::Uses),
            edge_id("a", "bc", EdgeType::Uses)
        );
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("  Multiple   Spaces "), "multiple spaces");
        assert_eq!(canonical_name("C++"), "c++");
    }
}
