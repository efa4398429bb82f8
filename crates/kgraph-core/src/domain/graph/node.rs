//! Graph nodes
//!
//! A node is a typed entity in the knowledge graph: a project, a technology,
//! a decision, a persona and so on. Nodes are identified by a hash of their
//! canonical name and type, so the same observation submitted twice is
//! reinforced instead of duplicated.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::ids;
use super::value::{AttributeValue, Attributes, merge_attributes};

/// A node in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Deterministic id derived from `(name, node_type)`
    pub id: String,
    /// Human-readable name as first submitted
    pub name: String,
    /// Type of entity
    pub node_type: NodeType,
    /// Free-form typed attributes
    pub attributes: Attributes,
    /// Importance score (0.0 to 1.0)
    pub importance: f64,
    /// Activation level from the last spreading activation pass
    pub activation: f64,
    /// Relevance per named context (0.0 to 1.0)
    pub context_relevance: BTreeMap<String, f64>,
    /// Number of times this node was observed or reinforced
    pub access_count: u64,
    /// When the node was last observed
    pub last_accessed: DateTime<Utc>,
    /// Incremented on every reinforcement
    pub version: u64,
    /// Optional embedding vector
    pub embedding: Option<Vec<f32>>,
    /// Lowercased name for prefix search
    pub name_lower: String,
    /// Space-separated search terms derived from name and attributes
    pub search_terms: String,
    /// When the node was created
    pub created_at: DateTime<Utc>,
}

impl Node {
    /// Create a new node from an observation
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        let name = name.into();
        let now = Utc::now();
        let mut node = Self {
            id: ids::node_id(&name, node_type),
            name_lower: ids::canonical_name(&name),
            name,
            node_type,
            attributes: Attributes::new(),
            importance: 0.5,
            activation: 0.0,
            context_relevance: BTreeMap::new(),
            access_count: 1,
            last_accessed: now,
            version: 1,
            embedding: None,
            search_terms: String::new(),
            created_at: now,
        };
        node.refresh_search_terms();
        node
    }

    /// Placeholder for an id known to the store traversal but absent from
    /// both the mirror and the node table
    pub fn stand_in(id: impl Into<String>) -> Self {
        let id = id.into();
        let mut node = Self::new(id.clone(), NodeType::Other);
        node.id = id;
        node.importance = 0.0;
        node.access_count = 0;
        node
    }

    /// Set importance (clamped to 0.0-1.0)
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = clamp_unit(importance);
        self
    }

    /// Set attributes
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self.refresh_search_terms();
        self
    }

    /// Set embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Merge a duplicate observation into this node
    ///
    /// Importance keeps the maximum, attributes are merged with the
    /// incoming keys winning, and access bookkeeping advances.
    pub fn reinforce(&mut self, incoming: &Node) {
        self.importance = self.importance.max(clamp_unit(incoming.importance));
        merge_attributes(&mut self.attributes, &incoming.attributes);
        for (context, relevance) in &incoming.context_relevance {
            let entry = self.context_relevance.entry(context.clone()).or_insert(0.0);
            *entry = entry.max(clamp_unit(*relevance));
        }
        if incoming.embedding.is_some() {
            self.embedding = incoming.embedding.clone();
        }
        self.access_count += 1;
        self.last_accessed = Utc::now();
        self.version += 1;
        self.refresh_search_terms();
    }

    /// Blend a centrality score into importance
    pub fn blend_importance(&mut self, score: f64) {
        self.importance = self.blended_importance(score);
    }

    /// Importance after blending in `score`, without applying it
    pub fn blended_importance(&self, score: f64) -> f64 {
        let score = if score.is_finite() { score } else { 0.0 };
        clamp_unit(self.importance * 0.7 + score * 0.3)
    }

    /// Rebuild `search_terms` from the name and string attributes
    fn refresh_search_terms(&mut self) {
        let mut strings = Vec::new();
        for value in self.attributes.values() {
            value.collect_strings(&mut strings);
        }
        let mut terms: Vec<String> = self
            .name_lower
            .split_whitespace()
            .map(str::to_string)
            .chain(strings.iter().flat_map(|s| {
                s.split_whitespace()
                    .map(|w| w.to_lowercase())
                    .collect::<Vec<_>>()
            }))
            .collect();
        terms.sort();
        terms.dedup();
        self.search_terms = terms.join(" ");
    }
}

/// An upstream observation of a node, as handed to `add_node_batch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInput {
    pub name: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default = "default_importance")]
    pub importance: f64,
    #[serde(default)]
    pub context_relevance: BTreeMap<String, f64>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

fn default_importance() -> f64 {
    0.5
}

impl NodeInput {
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            name: name.into(),
            node_type,
            attributes: Attributes::new(),
            importance: default_importance(),
            context_relevance: BTreeMap::new(),
            embedding: None,
        }
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>, relevance: f64) -> Self {
        self.context_relevance.insert(context.into(), relevance);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Id this input resolves to
    pub fn id(&self) -> String {
        ids::node_id(&self.name, self.node_type)
    }

    /// Reject inputs that cannot become a node
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("node name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Build a fresh node from this input
    pub fn into_node(self) -> Node {
        let mut node = Node::new(self.name, self.node_type)
            .with_importance(self.importance)
            .with_attributes(self.attributes);
        node.context_relevance = self
            .context_relevance
            .into_iter()
            .map(|(context, relevance)| (context, clamp_unit(relevance)))
            .collect();
        node.embedding = self.embedding;
        node
    }
}

/// Clamp to [0, 1]; non-finite values become 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Types of graph nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// A project or product
    Project,
    /// A technology, library or framework
    Technology,
    /// An architectural or product decision
    Decision,
    /// A persona taking part in deliberation
    Persona,
    /// An abstract concept
    Concept,
    /// A skill or capability
    Skill,
    /// A problem to be solved
    Problem,
    /// A solution to a problem
    Solution,
    /// A reusable pattern
    Pattern,
    /// A development tool
    Tool,
    /// A person
    Person,
    /// A document or artifact
    Document,
    /// Something that happened
    Event,
    /// Anything else
    Other,
}

impl NodeType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Technology => "technology",
            Self::Decision => "decision",
            Self::Persona => "persona",
            Self::Concept => "concept",
            Self::Skill => "skill",
            Self::Problem => "problem",
            Self::Solution => "solution",
            Self::Pattern => "pattern",
            Self::Tool => "tool",
            Self::Person => "person",
            Self::Document => "document",
            Self::Event => "event",
            Self::Other => "other",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "project" => Some(Self::Project),
            "technology" | "tech" => Some(Self::Technology),
            "decision" => Some(Self::Decision),
            "persona" => Some(Self::Persona),
            "concept" => Some(Self::Concept),
            "skill" => Some(Self::Skill),
            "problem" => Some(Self::Problem),
            "solution" => Some(Self::Solution),
            "pattern" => Some(Self::Pattern),
            "tool" => Some(Self::Tool),
            "person" => Some(Self::Person),
            "document" | "doc" => Some(Self::Document),
            "event" => Some(Self::Event),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Get all node types
    pub fn all() -> &'static [NodeType] {
        &[
            Self::Project,
            Self::Technology,
            Self::Decision,
            Self::Persona,
            Self::Concept,
            Self::Skill,
            Self::Problem,
            Self::Solution,
            Self::Pattern,
            Self::Tool,
            Self::Person,
            Self::Document,
            Self::Event,
            Self::Other,
        ]
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
