//! Graph edges
//!
//! Edges are directed, typed and weighted. They are identified by
//! `(source_id, target_id, edge_type)`, so a relationship observed again is
//! reinforced rather than duplicated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::ids;
use super::node::clamp_unit;
use super::value::{AttributeValue, Attributes, merge_attributes};

/// Default per-day decay rate recorded on new edges
pub const DEFAULT_DECAY_RATE: f64 = 0.01;

/// A directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Deterministic id derived from `(source_id, target_id, edge_type)`
    pub id: String,
    /// ID of the source node
    pub source_id: String,
    /// ID of the target node
    pub target_id: String,
    /// Type of relationship
    pub edge_type: EdgeType,
    /// Strength of the relationship (0.0 to 1.0)
    pub weight: f64,
    /// Confidence in the relationship (0.0 to 1.0)
    pub confidence: f64,
    /// Free-form typed attributes
    pub attributes: Attributes,
    /// Number of times this edge was observed
    pub reinforcement_count: u64,
    /// When the edge was last observed
    pub last_reinforced: DateTime<Utc>,
    /// Decay rate applied by consumers that age relationships
    pub decay_rate: f64,
    /// When the edge was created
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// Create a new edge between two node ids
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        edge_type: EdgeType,
    ) -> Self {
        let source_id = source_id.into();
        let target_id = target_id.into();
        let now = Utc::now();

        Self {
            id: ids::edge_id(&source_id, &target_id, edge_type),
            source_id,
            target_id,
            edge_type,
            weight: 0.5,
            confidence: 0.5,
            attributes: Attributes::new(),
            reinforcement_count: 1,
            last_reinforced: now,
            decay_rate: DEFAULT_DECAY_RATE,
            created_at: now,
        }
    }

    /// Set the weight (clamped to 0.0-1.0)
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = clamp_unit(weight);
        self
    }

    /// Set the confidence (clamped to 0.0-1.0)
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    /// Set attributes
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Merge a duplicate observation into this edge
    ///
    /// Weight is averaged so a single strong observation cannot saturate an
    /// edge; confidence only ever grows.
    pub fn reinforce(&mut self, incoming: &Edge) {
        self.weight = clamp_unit((self.weight + clamp_unit(incoming.weight)) / 2.0);
        self.confidence = self.confidence.max(clamp_unit(incoming.confidence));
        merge_attributes(&mut self.attributes, &incoming.attributes);
        self.reinforcement_count += 1;
        self.last_reinforced = Utc::now();
    }

    /// Whether this edge passes a traversal filter
    pub fn passes(&self, edge_types: Option<&[EdgeType]>, min_weight: f64) -> bool {
        self.weight >= min_weight
            && edge_types.is_none_or(|types| types.is_empty() || types.contains(&self.edge_type))
    }
}

/// An upstream observation of an edge, as handed to `add_edge_batch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeInput {
    #[serde(alias = "source")]
    pub source_id: String,
    #[serde(alias = "target")]
    pub target_id: String,
    pub edge_type: EdgeType,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_weight")]
    pub confidence: f64,
    #[serde(default)]
    pub attributes: Attributes,
}

fn default_weight() -> f64 {
    0.5
}

impl EdgeInput {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        edge_type: EdgeType,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type,
            weight: default_weight(),
            confidence: default_weight(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Id this input resolves to
    pub fn id(&self) -> String {
        ids::edge_id(&self.source_id, &self.target_id, self.edge_type)
    }

    /// Reject inputs that cannot become an edge regardless of graph contents
    pub fn validate(&self) -> Result<()> {
        if self.source_id.is_empty() || self.target_id.is_empty() {
            return Err(Error::Validation("edge endpoints must not be empty".to_string()));
        }
        Ok(())
    }

    /// Build a fresh edge from this input
    pub fn into_edge(self) -> Edge {
        Edge::new(self.source_id, self.target_id, self.edge_type)
            .with_weight(self.weight)
            .with_confidence(self.confidence)
            .with_attributes(self.attributes)
    }
}

/// Types of relationships between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Source uses target
    Uses,
    /// Source depends on target (stronger than Uses)
    DependsOn,
    /// Source influences target
    Influences,
    /// Generic association
    RelatesTo,
    /// Source problem is solved by target
    SolvedBy,
    /// Source is part of target
    PartOf,
    /// Source implements target
    Implements,
    /// Source conflicts with target
    ConflictsWith,
    /// Source was derived from target
    DerivedFrom,
    /// Source is similar to target
    SimilarTo,
    /// Source happens before target
    Precedes,
    /// Source was created by target
    CreatedBy,
}

impl EdgeType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uses => "uses",
            Self::DependsOn => "depends_on",
            Self::Influences => "influences",
            Self::RelatesTo => "relates_to",
            Self::SolvedBy => "solved_by",
            Self::PartOf => "part_of",
            Self::Implements => "implements",
            Self::ConflictsWith => "conflicts_with",
            Self::DerivedFrom => "derived_from",
            Self::SimilarTo => "similar_to",
            Self::Precedes => "precedes",
            Self::CreatedBy => "created_by",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "uses" => Some(Self::Uses),
            "depends_on" | "dependson" => Some(Self::DependsOn),
            "influences" => Some(Self::Influences),
            "relates_to" | "relatesto" | "related_to" => Some(Self::RelatesTo),
            "solved_by" | "solvedby" => Some(Self::SolvedBy),
            "part_of" | "partof" => Some(Self::PartOf),
            "implements" => Some(Self::Implements),
            "conflicts_with" | "conflictswith" => Some(Self::ConflictsWith),
            "derived_from" | "derivedfrom" => Some(Self::DerivedFrom),
            "similar_to" | "similarto" => Some(Self::SimilarTo),
            "precedes" => Some(Self::Precedes),
            "created_by" | "createdby" => Some(Self::CreatedBy),
            _ => None,
        }
    }

    /// Get all edge types
    pub fn all() -> &'static [EdgeType] {
        &[
            Self::Uses,
            Self::DependsOn,
            Self::Influences,
            Self::RelatesTo,
            Self::SolvedBy,
            Self::PartOf,
            Self::Implements,
            Self::ConflictsWith,
            Self::DerivedFrom,
            Self::SimilarTo,
            Self::Precedes,
            Self::CreatedBy,
        ]
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
