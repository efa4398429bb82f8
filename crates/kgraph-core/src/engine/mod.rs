//! Graph engine
//!
//! [`GraphEngine`] owns the durable store, the in-memory [`Mirror`] and the
//! result caches. Writes go to the store first and are committed to the
//! mirror only once the store accepted them; reads are served from the
//! mirror when that is cheaper, from the store otherwise, and always pass
//! through a TTL cache and a per-operation deadline.
//!
//! # Example
//!
//! ```no_run
//! use kgraph_core::config::Config;
//! use kgraph_core::domain::graph::{EdgeInput, EdgeType, NodeInput, NodeType};
//! use kgraph_core::engine::GraphEngine;
//!
//! # async fn example() -> kgraph_core::Result<()> {
//! let engine = GraphEngine::open(Config::in_memory()).await?;
//! let nodes = engine
//!     .add_node_batch(vec![
//!         NodeInput::new("tokio", NodeType::Technology),
//!         NodeInput::new("async runtime", NodeType::Concept),
//!     ])
//!     .await?;
//! engine
//!     .add_edge_batch(vec![EdgeInput::new(&nodes[0].id, &nodes[1].id, EdgeType::Implements)])
//!     .await?;
//!
//! let related = engine.find_related(&nodes[0].id, 2, &[], 0.0).await?;
//! assert_eq!(related.nodes.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod batch;
pub mod cache;
pub mod centrality;
pub mod mirror;
pub mod stats;
pub mod subgraph;
pub mod traversal;

pub use activation::{ActivatedNode, ActivationParams};
pub use cache::{CacheKey, CacheStats, Lookup, ResultCache};
pub use centrality::{AlgorithmError, CentralityMetric};
pub use mirror::{GraphView, Mirror};
pub use stats::GraphStatistics;
pub use subgraph::{Subgraph, SubgraphQuery};
pub use traversal::{RelatedGraph, RelatedNode, TraversalStrategy};

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::graph::{
    Connectivity, Edge, EdgeInput, EdgeType, GraphRepository, Node, NodeInput, NodeQuery,
};
use crate::error::{Error, Result};
use crate::infrastructure::graph::SqliteGraphRepository;
use crate::storage::{Database, DatabaseConfig};

use centrality::CentralityOptions;
use traversal::TraversalParams;

/// Knowledge graph engine
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct GraphEngine {
    repository: Arc<dyn GraphRepository>,
    config: Config,
    mirror: RwLock<Mirror>,
    /// Serializes batch writes and analytics write-back
    write_gate: Mutex<()>,
    related_cache: ResultCache<RelatedGraph>,
    activation_cache: ResultCache<Vec<ActivatedNode>>,
    centrality_cache: ResultCache<HashMap<String, f64>>,
    subgraph_cache: ResultCache<Subgraph>,
    analytics: Semaphore,
    store_queries: AtomicU64,
}

impl GraphEngine {
    /// Connect to the configured SQLite store, ensure the schema and load the mirror
    pub async fn open(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(format!("{:#}", e)))?;

        let db = Database::new(DatabaseConfig::from(&config.storage))
            .await
            .map_err(|e| Error::StoreUnavailable(format!("{:#}", e)))?;
        info!(path = %db.path().display(), "Opened graph store");

        let repository = Arc::new(SqliteGraphRepository::new(db.pool().clone()));
        Self::new(repository, config).await
    }

    /// Build an engine over an existing repository
    pub async fn new(repository: Arc<dyn GraphRepository>, config: Config) -> Result<Self> {
        let capacity = config.cache.max_entries;
        let ttl = config.cache_ttl();
        let engine = Self {
            mirror: RwLock::new(Mirror::new(config.mirror.max_nodes)),
            write_gate: Mutex::new(()),
            related_cache: ResultCache::new(capacity, ttl),
            activation_cache: ResultCache::new(capacity, ttl),
            centrality_cache: ResultCache::new(capacity, config.centrality_ttl()),
            subgraph_cache: ResultCache::new(capacity, ttl),
            analytics: Semaphore::new(config.analytics.workers.max(1)),
            store_queries: AtomicU64::new(0),
            repository,
            config,
        };

        engine.store().ensure_schema().await?;
        engine.reload_mirror().await?;
        Ok(engine)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Store round trips issued so far
    pub fn store_queries(&self) -> u64 {
        self.store_queries.load(Ordering::Relaxed)
    }

    /// Rebuild the mirror from the store, re-applying the node cap
    pub async fn reload_mirror(&self) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let limit = self.config.mirror.max_nodes;

        // one past the cap tells the mirror whether it holds everything
        let nodes = self.store().load_top_nodes(limit.saturating_add(1)).await?;
        let edges = self.store().load_edges_among_top(limit).await?;

        let (node_count, edge_count) = self.update_mirror(|mirror| {
            mirror.load(nodes, edges);
            (mirror.node_count(), mirror.edge_count())
        });
        self.invalidate_caches();

        info!(nodes = node_count, edges = edge_count, limit, "Mirror loaded");
        Ok(())
    }

    // ========== Writes ==========

    /// Insert or reinforce a batch of nodes
    ///
    /// Returns the resulting node for every accepted input, in input order.
    /// Invalid inputs are logged and skipped. If the store rejects the batch
    /// nothing is applied and the error is returned.
    pub async fn add_node_batch(&self, inputs: Vec<NodeInput>) -> Result<Vec<Node>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let _gate = self.write_gate.lock().await;

        let (mut existing, missing) = self.mirrored_nodes(inputs.iter().map(NodeInput::id));
        if !missing.is_empty() {
            for node in self.store().get_nodes(&missing).await? {
                existing.insert(node.id.clone(), node);
            }
        }

        let staged = batch::stage_nodes(inputs, &existing);
        if staged.to_persist.is_empty() {
            return Ok(staged.results);
        }

        self.store().upsert_nodes(&staged.to_persist).await?;
        let store_only = self.update_mirror(|mirror| {
            staged
                .to_persist
                .iter()
                .filter(|node| !mirror.insert_node((*node).clone()))
                .count()
        });
        self.invalidate_caches();

        if store_only > 0 {
            warn!(store_only, max_nodes = self.config.mirror.max_nodes, "Mirror full, new nodes kept in the store only");
        }
        info!(
            accepted = staged.results.len(),
            rejected = staged.rejected,
            persisted = staged.to_persist.len(),
            store_only,
            "Node batch committed"
        );
        Ok(staged.results)
    }

    /// Insert or reinforce a batch of edges
    ///
    /// Edges whose endpoints exist in neither the mirror nor the store are
    /// logged and skipped. Edges whose endpoints are not both mirrored are
    /// persisted but stay out of the mirror until the next reload.
    pub async fn add_edge_batch(&self, inputs: Vec<EdgeInput>) -> Result<Vec<Edge>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let _gate = self.write_gate.lock().await;

        let endpoints: HashSet<String> = inputs
            .iter()
            .flat_map(|e| [e.source_id.clone(), e.target_id.clone()])
            .collect();
        let edge_ids: HashSet<String> = inputs.iter().map(EdgeInput::id).collect();

        let (mut existing, missing_edges, mut known, unknown_endpoints) = self.read_mirror(|mirror| {
            let mut existing = HashMap::new();
            let mut missing_edges = Vec::new();
            for id in edge_ids {
                match mirror.get_edge(&id) {
                    Some(edge) => {
                        existing.insert(id, edge.clone());
                    }
                    None => missing_edges.push(id),
                }
            }
            let (known, unknown): (HashSet<String>, Vec<String>) = (
                endpoints.iter().filter(|id| mirror.contains_node(id)).cloned().collect(),
                endpoints.iter().filter(|id| !mirror.contains_node(id)).cloned().collect(),
            );
            (existing, missing_edges, known, unknown)
        });

        if !unknown_endpoints.is_empty() {
            known.extend(self.store().existing_node_ids(&unknown_endpoints).await?);
        }
        if !missing_edges.is_empty() {
            for edge in self.store().get_edges(&missing_edges).await? {
                existing.insert(edge.id.clone(), edge);
            }
        }

        let staged = batch::stage_edges(inputs, &existing, &known);
        if staged.to_persist.is_empty() {
            return Ok(staged.results);
        }

        self.store().upsert_edges(&staged.to_persist).await?;
        let store_only = self.update_mirror(|mirror| {
            staged
                .to_persist
                .iter()
                .filter(|edge| !mirror.insert_edge((*edge).clone()))
                .count()
        });
        self.invalidate_caches();

        info!(
            accepted = staged.results.len(),
            rejected = staged.rejected,
            persisted = staged.to_persist.len(),
            store_only,
            "Edge batch committed"
        );
        Ok(staged.results)
    }

    // ========== Traversal ==========

    /// Nodes reachable from `node_id` within `max_depth` outgoing hops
    ///
    /// An empty `edge_types` slice accepts every type.
    pub async fn find_related(
        &self,
        node_id: &str,
        max_depth: u32,
        edge_types: &[EdgeType],
        min_weight: f64,
    ) -> Result<RelatedGraph> {
        self.find_related_with_strategy(node_id, max_depth, edge_types, min_weight, TraversalStrategy::Auto)
            .await
    }

    /// [`find_related`](Self::find_related) with an explicit strategy
    pub async fn find_related_with_strategy(
        &self,
        node_id: &str,
        max_depth: u32,
        edge_types: &[EdgeType],
        min_weight: f64,
        strategy: TraversalStrategy,
    ) -> Result<RelatedGraph> {
        let key = CacheKey::new("find_related")
            .with("node", node_id)
            .with("depth", max_depth)
            .with_list("edge_types", edge_types)
            .with_f64("min_weight", min_weight)
            .with("strategy", strategy.as_str());

        let params = TraversalParams {
            start_id: node_id,
            max_depth,
            edge_types: (!edge_types.is_empty()).then_some(edge_types),
            min_weight,
        };

        cached_with_deadline(
            "find_related",
            &self.related_cache,
            key,
            self.config.cache_ttl(),
            self.config.operation_timeout(),
            self.traverse(&params, strategy),
        )
        .await
    }

    async fn traverse(&self, params: &TraversalParams<'_>, strategy: TraversalStrategy) -> Result<RelatedGraph> {
        let resolved = match strategy {
            TraversalStrategy::Auto => {
                let (complete, mirrored) = self.read_mirror(|m| (m.is_complete(), m.node_count()));
                if complete {
                    traversal::choose_strategy(params.max_depth, mirrored, self.config.traversal.memory_threshold)
                } else {
                    TraversalStrategy::Store
                }
            }
            explicit => explicit,
        };
        debug!(start = params.start_id, depth = params.max_depth, strategy = resolved.as_str(), "Traversing");

        if resolved == TraversalStrategy::InMemory {
            return Ok(self.read_mirror(|mirror| traversal::bfs(mirror, params)));
        }

        match self.traverse_store(params).await {
            Ok(result) => Ok(result),
            Err(err) if err.is_store_unavailable() => {
                warn!(error = %err, start = params.start_id, "Store unavailable, traversing the mirror instead");
                Ok(self.read_mirror(|mirror| traversal::bfs(mirror, params)))
            }
            Err(err) => Err(err),
        }
    }

    async fn traverse_store(&self, params: &TraversalParams<'_>) -> Result<RelatedGraph> {
        let rows = self
            .store()
            .traverse(params.start_id, params.max_depth, params.edge_types, params.min_weight)
            .await?;
        if rows.is_empty() {
            return Ok(RelatedGraph::default());
        }

        let (mut known, missing) = self.mirrored_nodes(rows.iter().map(|r| r.node_id.clone()));
        if !missing.is_empty() {
            for node in self.store().get_nodes(&missing).await? {
                known.insert(node.id.clone(), node);
            }
        }

        let mut members: Vec<String> = rows.iter().map(|r| r.node_id.clone()).collect();
        members.push(params.start_id.to_string());
        let edges = self
            .store()
            .edges_among(&members, params.edge_types, params.min_weight)
            .await?;

        Ok(traversal::from_store_rows(rows, known, edges))
    }

    // ========== Analytics ==========

    /// Spread activation from `seeds` and record the result on mirrored nodes
    pub async fn spreading_activation(
        &self,
        seeds: &[String],
        params: ActivationParams,
    ) -> Result<Vec<ActivatedNode>> {
        let key = CacheKey::new("spreading_activation")
            .with_list("seeds", seeds)
            .with("iterations", params.iterations)
            .with_f64("decay", params.decay)
            .with_f64("min_activation", params.min_activation);

        cached_with_deadline(
            "spreading_activation",
            &self.activation_cache,
            key,
            self.config.cache_ttl(),
            self.config.operation_timeout(),
            self.activate(seeds.to_vec(), params),
        )
        .await
    }

    async fn activate(&self, seeds: Vec<String>, params: ActivationParams) -> Result<Vec<ActivatedNode>> {
        let view = self.read_mirror(Mirror::snapshot);
        let levels: Vec<(String, f64)> = self
            .run_analytics(move || {
                activation::spread(&view, &seeds, &params)
                    .into_iter()
                    .map(|(index, level)| (view.ids[index].clone(), level))
                    .collect::<Vec<_>>()
            })
            .await?;

        let by_id: HashMap<String, f64> = levels.iter().cloned().collect();
        let _gate = self.write_gate.lock().await;
        let activated = self.update_mirror(|mirror| {
            mirror.set_activations(&by_id);
            levels
                .into_iter()
                .map(|(node_id, activation)| ActivatedNode {
                    name: mirror.get_node(&node_id).map(|n| n.name.clone()).unwrap_or_default(),
                    node_id,
                    activation,
                })
                .collect::<Vec<_>>()
        });

        debug!(activated = activated.len(), "Spreading activation finished");
        Ok(activated)
    }

    /// Score every mirrored node by `metric` and blend the score into importance
    ///
    /// An unknown metric or a failing algorithm falls back to degree
    /// centrality with a warning; it is never an error.
    pub async fn calculate_centrality(&self, metric: &str) -> Result<HashMap<String, f64>> {
        let requested = metric.trim().to_ascii_lowercase();
        let (nodes, edges) = self.read_mirror(|m| (m.node_count(), m.edge_count()));
        let key = CacheKey::new("calculate_centrality")
            .with("metric", &requested)
            .with("nodes", nodes)
            .with("edges", edges);

        let computed = AtomicBool::new(false);
        let scores = cached_with_deadline(
            "calculate_centrality",
            &self.centrality_cache,
            key,
            self.config.centrality_ttl(),
            self.config.operation_timeout(),
            async {
                let scores = self.centrality(requested).await?;
                computed.store(true, Ordering::Relaxed);
                Ok::<_, Error>(scores)
            },
        )
        .await?;

        // blended once per fresh computation, outside the deadline so the
        // store and mirror updates are never split by a timeout
        if computed.load(Ordering::Relaxed) {
            self.blend_importance(&scores).await?;
        }
        Ok(scores)
    }

    async fn centrality(&self, requested: String) -> Result<HashMap<String, f64>> {
        let view = self.read_mirror(Mirror::snapshot);
        let options = CentralityOptions {
            exact_threshold: self.config.analytics.betweenness_exact_threshold,
            samples: self.config.analytics.betweenness_samples,
        };

        let metric = requested.clone();
        let (ids, outcome) = self
            .run_analytics(move || {
                let mut rng = rand::thread_rng();
                let outcome = centrality::compute_with_fallback(&view, &metric, &options, &mut rng);
                (view.ids, outcome)
            })
            .await?;

        if let Some(reason) = &outcome.degraded {
            warn!(requested = %requested, fallback = %outcome.metric, error = %reason, "Centrality degraded");
        }
        Ok(ids.into_iter().zip(outcome.scores).collect())
    }

    async fn blend_importance(&self, scores: &HashMap<String, f64>) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let updates: Vec<(String, f64)> = self.read_mirror(|mirror| {
            scores
                .iter()
                .filter_map(|(id, score)| {
                    mirror
                        .get_node(id)
                        .map(|node| (id.clone(), node.blended_importance(*score)))
                })
                .collect()
        });

        match self.store().update_importance(&updates).await {
            Ok(()) => {
                self.update_mirror(|mirror| mirror.set_importance(&updates));
                self.subgraph_cache.invalidate_all();
                info!(nodes = updates.len(), "Importance blended");
                Ok(())
            }
            Err(err) if err.is_store_unavailable() => {
                warn!(error = %err, "Store unavailable, importance left unchanged");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Nodes and edges matching `query`
    pub async fn get_subgraph(&self, query: SubgraphQuery) -> Result<Subgraph> {
        let key = query.cache_key();
        cached_with_deadline(
            "get_subgraph",
            &self.subgraph_cache,
            key,
            self.config.cache_ttl(),
            self.config.operation_timeout(),
            self.extract_subgraph(&query),
        )
        .await
    }

    async fn extract_subgraph(&self, query: &SubgraphQuery) -> Result<Subgraph> {
        let pushdown = self.read_mirror(|mirror| {
            !mirror.is_complete() || mirror.node_count() >= self.config.traversal.memory_threshold
        });
        if !pushdown {
            return Ok(self.read_mirror(|mirror| subgraph::from_mirror(mirror, query)));
        }

        match self.subgraph_from_store(query).await {
            Ok(subgraph) => Ok(subgraph),
            Err(err) if err.is_store_unavailable() => {
                warn!(error = %err, "Store unavailable, extracting subgraph from the mirror");
                Ok(self.read_mirror(|mirror| subgraph::from_mirror(mirror, query)))
            }
            Err(err) => Err(err),
        }
    }

    async fn subgraph_from_store(&self, query: &SubgraphQuery) -> Result<Subgraph> {
        let nodes = self.store().query_nodes(&query.node_query()).await?;
        let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        let edge_types = (!query.edge_types.is_empty()).then_some(query.edge_types.as_slice());
        let edges = self.store().edges_among(&ids, edge_types, 0.0).await?;
        Ok(subgraph::assemble(nodes, edges, query))
    }

    /// Size, shape and cache counters
    ///
    /// Store counts are `None` when the store cannot be reached in time.
    pub async fn get_statistics(&self) -> GraphStatistics {
        let store = match tokio::time::timeout(self.config.operation_timeout(), self.store().counts()).await {
            Ok(Ok(counts)) => Some(counts),
            Ok(Err(err)) => {
                warn!(error = %err, "Could not read store counts");
                None
            }
            Err(_) => {
                warn!("Timed out reading store counts");
                None
            }
        };

        let cache = self
            .related_cache
            .stats()
            .merged(self.activation_cache.stats())
            .merged(self.centrality_cache.stats())
            .merged(self.subgraph_cache.stats());
        let store_queries = self.store_queries();

        self.read_mirror(|mirror| GraphStatistics::collect(mirror, cache, store, store_queries))
    }

    // ========== Lookups ==========

    /// Node by id, from the mirror or else the store
    pub async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        if let Some(node) = self.read_mirror(|m| m.get_node(id).cloned()) {
            return Ok(Some(node));
        }
        self.store().get_node(id).await
    }

    /// Edge by id, from the mirror or else the store
    pub async fn get_edge(&self, id: &str) -> Result<Option<Edge>> {
        if let Some(edge) = self.read_mirror(|m| m.get_edge(id).cloned()) {
            return Ok(Some(edge));
        }
        self.store().get_edge(id).await
    }

    /// Outgoing edges of `id` paired with their target nodes
    pub async fn neighbors(&self, id: &str) -> Result<Vec<(Node, Edge)>> {
        let mirrored = self.read_mirror(|mirror| {
            mirror.contains_node(id).then(|| {
                mirror
                    .outgoing(id)
                    .filter_map(|edge| mirror.get_node(&edge.target_id).map(|n| (n.clone(), edge.clone())))
                    .collect::<Vec<_>>()
            })
        });
        if let Some(mut pairs) = mirrored {
            pairs.sort_by(|a, b| a.1.id.cmp(&b.1.id));
            return Ok(pairs);
        }

        let related = self
            .traverse_store(&TraversalParams {
                start_id: id,
                max_depth: 1,
                edge_types: None,
                min_weight: 0.0,
            })
            .await?;
        let nodes: HashMap<&str, &Node> = related.nodes.iter().map(|r| (r.node.id.as_str(), &r.node)).collect();
        Ok(related
            .edges
            .iter()
            .filter(|edge| edge.source_id == id)
            .filter_map(|edge| nodes.get(edge.target_id.as_str()).map(|n| ((*n).clone(), edge.clone())))
            .collect())
    }

    /// Nodes whose lowercased name starts with `prefix`, most important first
    pub async fn search_nodes(&self, prefix: &str, limit: usize) -> Result<Vec<Node>> {
        let query = NodeQuery::new().with_name_prefix(prefix).with_limit(limit);
        match self.store().query_nodes(&query).await {
            Ok(nodes) => Ok(nodes),
            Err(err) if err.is_store_unavailable() => {
                warn!(error = %err, "Store unavailable, searching the mirror");
                let prefix = crate::domain::graph::ids::canonical_name(prefix);
                let mut nodes: Vec<Node> = self.read_mirror(|mirror| {
                    mirror
                        .nodes()
                        .filter(|n| n.name_lower.starts_with(&prefix))
                        .cloned()
                        .collect()
                });
                nodes.sort_by(|a, b| {
                    b.importance
                        .total_cmp(&a.importance)
                        .then(b.access_count.cmp(&a.access_count))
                });
                nodes.truncate(limit);
                Ok(nodes)
            }
            Err(err) => Err(err),
        }
    }

    /// Degree summary from the store
    pub async fn connectivity(&self, id: &str) -> Result<Option<Connectivity>> {
        self.store().connectivity(id).await
    }

    /// Cheap store round trip
    pub async fn health_check(&self) -> Result<()> {
        self.store().health_check().await
    }

    /// Close the store; the mirror stays readable
    pub async fn close(&self) {
        self.repository.close().await;
        info!("Graph store closed");
    }

    // ========== Internals ==========

    fn store(&self) -> &dyn GraphRepository {
        self.store_queries.fetch_add(1, Ordering::Relaxed);
        self.repository.as_ref()
    }

    fn read_mirror<T>(&self, f: impl FnOnce(&Mirror) -> T) -> T {
        let mirror = self.mirror.read().unwrap_or_else(PoisonError::into_inner);
        f(&mirror)
    }

    fn update_mirror<T>(&self, f: impl FnOnce(&mut Mirror) -> T) -> T {
        let mut mirror = self.mirror.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut mirror)
    }

    /// Split `ids` into nodes held by the mirror and ids it lacks
    fn mirrored_nodes(&self, ids: impl Iterator<Item = String>) -> (HashMap<String, Node>, Vec<String>) {
        self.read_mirror(|mirror| {
            let mut found = HashMap::new();
            let mut missing = Vec::new();
            for id in ids {
                if found.contains_key(&id) || missing.contains(&id) {
                    continue;
                }
                match mirror.get_node(&id) {
                    Some(node) => {
                        found.insert(id, node.clone());
                    }
                    None => missing.push(id),
                }
            }
            (found, missing)
        })
    }

    fn invalidate_caches(&self) {
        self.related_cache.invalidate_all();
        self.activation_cache.invalidate_all();
        self.centrality_cache.invalidate_all();
        self.subgraph_cache.invalidate_all();
    }

    /// Run CPU-bound work on the blocking pool, bounded by the worker count
    async fn run_analytics<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .analytics
            .acquire()
            .await
            .map_err(|e| Error::Other(format!("Analytics pool closed: {}", e)))?;
        tokio::task::spawn_blocking(job)
            .await
            .map_err(|e| Error::Other(format!("Analytics task failed: {}", e)))
    }
}

/// Serve `key` from `cache`, or compute it within `deadline`
///
/// When the deadline passes, a resident value is returned even if it has
/// expired; without one the call fails with [`Error::Timeout`].
async fn cached_with_deadline<V, F>(
    operation: &'static str,
    cache: &ResultCache<V>,
    key: CacheKey,
    ttl: Duration,
    deadline: Duration,
    compute: F,
) -> Result<V>
where
    V: Clone,
    F: Future<Output = Result<V>>,
{
    let stale = match cache.lookup(&key) {
        Lookup::Fresh(value) => {
            debug!(operation, key = %key, "Cache hit");
            return Ok(value);
        }
        other => other.into_stale(),
    };

    match tokio::time::timeout(deadline, compute).await {
        Ok(result) => {
            let value = result?;
            cache.put_with_ttl(key, value.clone(), ttl);
            Ok(value)
        }
        Err(_) => match stale.or_else(|| cache.peek_stale(&key)) {
            Some(value) => {
                warn!(operation, key = %key, "Deadline exceeded, serving stale result");
                Ok(value)
            }
            None => Err(Error::Timeout(operation.to_string())),
        },
    }
}
