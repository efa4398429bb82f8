//! Centrality metrics over a mirror snapshot
//!
//! All metrics treat the graph as directed. Betweenness switches from the
//! exact Brandes algorithm to a pivot-sampled estimate above a size
//! threshold. Any metric that cannot produce a result degrades to degree
//! centrality instead of failing the call.

use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::mirror::GraphView;

const DAMPING: f64 = 0.85;
const MAX_ITERATIONS: usize = 100;
const TOLERANCE: f64 = 1e-6;

/// Supported centrality metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralityMetric {
    Betweenness,
    Closeness,
    Degree,
    Eigenvector,
    PageRank,
}

impl CentralityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Betweenness => "betweenness",
            Self::Closeness => "closeness",
            Self::Degree => "degree",
            Self::Eigenvector => "eigenvector",
            Self::PageRank => "pagerank",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "betweenness" => Some(Self::Betweenness),
            "closeness" => Some(Self::Closeness),
            "degree" => Some(Self::Degree),
            "eigenvector" => Some(Self::Eigenvector),
            "pagerank" | "page_rank" => Some(Self::PageRank),
            _ => None,
        }
    }

    pub fn all() -> &'static [CentralityMetric] {
        &[
            Self::Betweenness,
            Self::Closeness,
            Self::Degree,
            Self::Eigenvector,
            Self::PageRank,
        ]
    }
}

impl std::fmt::Display for CentralityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a metric could not be computed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AlgorithmError {
    #[error("unknown centrality metric '{0}'")]
    UnknownMetric(String),
    #[error("{metric} did not converge within {iterations} iterations")]
    NotConverged {
        metric: CentralityMetric,
        iterations: usize,
    },
}

/// Tuning knobs for the centrality pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentralityOptions {
    /// Node count above which betweenness is sampled
    pub exact_threshold: usize,
    /// Pivots used when sampling
    pub samples: usize,
}

/// Scores plus how they were obtained
#[derive(Debug, Clone, PartialEq)]
pub struct CentralityOutcome {
    /// Metric that actually produced `scores`
    pub metric: CentralityMetric,
    /// Scores by dense index
    pub scores: Vec<f64>,
    /// Set when the requested metric failed and degree was used instead
    pub degraded: Option<AlgorithmError>,
}

/// Compute `requested`, falling back to degree centrality on any failure
pub fn compute_with_fallback<R: Rng + ?Sized>(
    view: &GraphView,
    requested: &str,
    options: &CentralityOptions,
    rng: &mut R,
) -> CentralityOutcome {
    let attempt = CentralityMetric::parse(requested)
        .ok_or_else(|| AlgorithmError::UnknownMetric(requested.to_string()))
        .and_then(|metric| compute(view, metric, options, rng).map(|scores| (metric, scores)));

    match attempt {
        Ok((metric, scores)) => CentralityOutcome {
            metric,
            scores,
            degraded: None,
        },
        Err(err) => CentralityOutcome {
            metric: CentralityMetric::Degree,
            scores: degree(view),
            degraded: Some(err),
        },
    }
}

/// Compute one metric
pub fn compute<R: Rng + ?Sized>(
    view: &GraphView,
    metric: CentralityMetric,
    options: &CentralityOptions,
    rng: &mut R,
) -> Result<Vec<f64>, AlgorithmError> {
    match metric {
        CentralityMetric::Degree => Ok(degree(view)),
        CentralityMetric::Closeness => Ok(closeness(view)),
        CentralityMetric::Betweenness => {
            let n = view.node_count();
            if n > options.exact_threshold && options.samples < n {
                Ok(betweenness_sampled(view, options.samples, rng))
            } else {
                Ok(betweenness(view))
            }
        }
        CentralityMetric::Eigenvector => eigenvector(view),
        CentralityMetric::PageRank => pagerank(view),
    }
}

/// In + out degree normalized by `n - 1`
pub fn degree(view: &GraphView) -> Vec<f64> {
    let n = view.node_count();
    let mut counts = vec![0.0_f64; n];
    for (source, edges) in view.adjacency.iter().enumerate() {
        counts[source] += edges.len() as f64;
        for edge in edges {
            counts[edge.target_index] += 1.0;
        }
    }
    if n <= 1 {
        return vec![0.0; n];
    }
    let scale = (n - 1) as f64;
    counts.into_iter().map(|c| c / scale).collect()
}

/// Wasserman-Faust closeness over outgoing hop distances
///
/// Scaled by the fraction of the graph a node can reach, so nodes in small
/// components do not look artificially central.
pub fn closeness(view: &GraphView) -> Vec<f64> {
    let n = view.node_count();
    if n <= 1 {
        return vec![0.0; n];
    }

    (0..n)
        .map(|source| {
            let distances = hop_distances(view, source);
            let (reached, total) = distances
                .iter()
                .enumerate()
                .filter(|(i, d)| *i != source && **d > 0)
                .fold((0usize, 0usize), |(r, t), (_, d)| (r + 1, t + *d as usize));
            if reached == 0 || total == 0 {
                0.0
            } else {
                let reach = reached as f64;
                (reach / (n - 1) as f64) * (reach / total as f64)
            }
        })
        .collect()
}

fn hop_distances(view: &GraphView, source: usize) -> Vec<i64> {
    let mut dist = vec![-1_i64; view.node_count()];
    dist[source] = 0;
    let mut queue = VecDeque::from([source]);
    while let Some(v) = queue.pop_front() {
        for edge in &view.adjacency[v] {
            if dist[edge.target_index] < 0 {
                dist[edge.target_index] = dist[v] + 1;
                queue.push_back(edge.target_index);
            }
        }
    }
    dist
}

/// Exact Brandes betweenness, normalized for directed graphs
pub fn betweenness(view: &GraphView) -> Vec<f64> {
    let n = view.node_count();
    let raw = brandes(view, 0..n);
    normalize_betweenness(raw, n, 1.0)
}

/// Brandes from `samples` random pivots, extrapolated by `n / samples`
pub fn betweenness_sampled<R: Rng + ?Sized>(view: &GraphView, samples: usize, rng: &mut R) -> Vec<f64> {
    let n = view.node_count();
    let k = samples.clamp(1, n.max(1));
    if n == 0 {
        return Vec::new();
    }
    let pivots = rand::seq::index::sample(rng, n, k);
    let raw = brandes(view, pivots.into_iter());
    normalize_betweenness(raw, n, n as f64 / k as f64)
}

fn normalize_betweenness(raw: Vec<f64>, n: usize, scale: f64) -> Vec<f64> {
    if n <= 2 {
        return vec![0.0; n];
    }
    let pairs = ((n - 1) * (n - 2)) as f64;
    raw.into_iter().map(|b| b * scale / pairs).collect()
}

fn brandes(view: &GraphView, sources: impl Iterator<Item = usize>) -> Vec<f64> {
    let n = view.node_count();
    let mut centrality = vec![0.0_f64; n];

    for s in sources {
        let mut stack = Vec::with_capacity(n);
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0_f64; n];
        let mut dist = vec![-1_i64; n];
        sigma[s] = 1.0;
        dist[s] = 0;

        let mut queue = VecDeque::from([s]);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for edge in &view.adjacency[v] {
                let w = edge.target_index;
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0_f64; n];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                centrality[w] += delta[w];
            }
        }
    }

    centrality
}

/// Power iteration on `A + I` over weighted incoming edges
///
/// The identity shift keeps the iteration from oscillating on bipartite
/// structure; graphs without a dominant eigenvector still fail to converge.
pub fn eigenvector(view: &GraphView) -> Result<Vec<f64>, AlgorithmError> {
    let n = view.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut x = vec![1.0 / (n as f64).sqrt(); n];
    for _ in 0..MAX_ITERATIONS {
        let mut next = x.clone();
        for (source, edges) in view.adjacency.iter().enumerate() {
            for edge in edges {
                next[edge.target_index] += edge.weight * x[source];
            }
        }

        let norm = next.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            break;
        }
        next.iter_mut().for_each(|v| *v /= norm);

        let change: f64 = next.iter().zip(&x).map(|(a, b)| (a - b).abs()).sum();
        x = next;
        if change < TOLERANCE * n as f64 {
            return Ok(x);
        }
    }

    Err(AlgorithmError::NotConverged {
        metric: CentralityMetric::Eigenvector,
        iterations: MAX_ITERATIONS,
    })
}

/// Weighted PageRank with uniform teleport; dangling mass is spread evenly
pub fn pagerank(view: &GraphView) -> Result<Vec<f64>, AlgorithmError> {
    let n = view.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }

    let uniform = 1.0 / n as f64;
    let out_weight: Vec<f64> = view
        .adjacency
        .iter()
        .map(|edges| edges.iter().map(|e| e.weight).sum())
        .collect();

    let mut rank = vec![uniform; n];
    for _ in 0..MAX_ITERATIONS {
        let dangling: f64 = rank
            .iter()
            .zip(&out_weight)
            .filter(|(_, w)| **w <= 0.0)
            .map(|(r, _)| r)
            .sum();
        let base = (1.0 - DAMPING) * uniform + DAMPING * dangling * uniform;
        let mut next = vec![base; n];

        for (source, edges) in view.adjacency.iter().enumerate() {
            if out_weight[source] <= 0.0 {
                continue;
            }
            for edge in edges {
                next[edge.target_index] += DAMPING * rank[source] * edge.weight / out_weight[source];
            }
        }

        let change: f64 = next.iter().zip(&rank).map(|(a, b)| (a - b).abs()).sum();
        rank = next;
        if change < TOLERANCE {
            return Ok(rank);
        }
    }

    Err(AlgorithmError::NotConverged {
        metric: CentralityMetric::PageRank,
        iterations: MAX_ITERATIONS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{Edge, EdgeType, Node, NodeType};
    use crate::engine::mirror::Mirror;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const OPTIONS: CentralityOptions = CentralityOptions {
        exact_threshold: 1_000,
        samples: 10,
    };

    /// Builds a view from named edges; returns the view and name -> index
    fn graph(names: &[&str], links: &[(&str, &str)]) -> (GraphView, Vec<usize>) {
        let mut mirror = Mirror::new(100);
        let nodes: Vec<Node> = names
            .iter()
            .map(|n| Node::new(*n, NodeType::Concept))
            .collect();
        for n in &nodes {
            mirror.insert_node(n.clone());
        }
        let id = |name: &str| nodes[names.iter().position(|n| *n == name).unwrap()].id.clone();
        for (from, to) in links {
            mirror.insert_edge(Edge::new(id(from), id(to), EdgeType::RelatesTo).with_weight(1.0));
        }
        let view = mirror.snapshot();
        let indices = nodes.iter().map(|n| view.index_of(&n.id).unwrap()).collect();
        (view, indices)
    }

    #[test]
    fn test_metric_parse() {
        for m in CentralityMetric::all() {
            assert_eq!(CentralityMetric::parse(m.as_str()), Some(*m));
        }
        assert_eq!(CentralityMetric::parse("PageRank"), Some(CentralityMetric::PageRank));
        assert_eq!(CentralityMetric::parse("harmonic"), None);
    }

    #[test]
    fn test_degree() {
        let (view, idx) = graph(&["hub", "x", "y"], &[("hub", "x"), ("hub", "y")]);
        let scores = degree(&view);
        assert!((scores[idx[0]] - 1.0).abs() < 1e-9);
        assert!((scores[idx[1]] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_betweenness_on_path() {
        let (view, idx) = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let scores = betweenness(&view);
        assert!((scores[idx[1]] - 0.5).abs() < 1e-9);
        assert_eq!(scores[idx[0]], 0.0);
        assert_eq!(scores[idx[2]], 0.0);
    }

    #[test]
    fn test_sampled_betweenness_with_all_pivots_matches_exact() {
        let (view, _) = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "c"), ("c", "d"), ("a", "c")],
        );
        let mut rng = StdRng::seed_from_u64(7);
        let exact = betweenness(&view);
        let sampled = betweenness_sampled(&view, 4, &mut rng);
        for (e, s) in exact.iter().zip(&sampled) {
            assert!((e - s).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sampling_kicks_in_above_threshold() {
        let names: Vec<String> = (0..20).map(|i| format!("n{}", i)).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let links: Vec<(&str, &str)> = name_refs.windows(2).map(|w| (w[0], w[1])).collect();
        let (view, _) = graph(&name_refs, &links);

        let options = CentralityOptions {
            exact_threshold: 5,
            samples: 5,
        };
        let mut rng = StdRng::seed_from_u64(42);
        let scores = compute(&view, CentralityMetric::Betweenness, &options, &mut rng).unwrap();
        assert_eq!(scores.len(), 20);
        assert!(scores.iter().all(|s| s.is_finite() && *s >= 0.0));
    }

    #[test]
    fn test_closeness() {
        let (view, idx) = graph(&["a", "b", "c", "lonely"], &[("a", "b"), ("b", "c")]);
        let scores = closeness(&view);
        // a reaches 2 of 3 others at total distance 3
        assert!((scores[idx[0]] - (2.0 / 3.0) * (2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(scores[idx[2]], 0.0);
        assert_eq!(scores[idx[3]], 0.0);
    }

    #[test]
    fn test_pagerank_sums_to_one() {
        let (view, idx) = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a"), ("a", "c")]);
        let scores = pagerank(&view).unwrap();
        let total: f64 = scores.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(scores[idx[2]] > scores[idx[1]]);
    }

    #[test]
    fn test_eigenvector_converges_on_cycle() {
        let (view, _) = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        let scores = eigenvector(&view).unwrap();
        let first = scores[0];
        assert!(scores.iter().all(|s| (s - first).abs() < 1e-6));
    }

    #[test]
    fn test_eigenvector_failure_falls_back_to_degree() {
        // a DAG chain has no dominant eigenvector under A + I
        let (view, _) = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = compute_with_fallback(&view, "eigenvector", &OPTIONS, &mut rng);

        assert_eq!(outcome.metric, CentralityMetric::Degree);
        assert!(matches!(outcome.degraded, Some(AlgorithmError::NotConverged { .. })));
        assert_eq!(outcome.scores, degree(&view));
    }

    #[test]
    fn test_unknown_metric_falls_back_to_degree() {
        let (view, _) = graph(&["a", "b"], &[("a", "b")]);
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = compute_with_fallback(&view, "harmonic", &OPTIONS, &mut rng);

        assert_eq!(outcome.metric, CentralityMetric::Degree);
        assert_eq!(
            outcome.degraded,
            Some(AlgorithmError::UnknownMetric("harmonic".to_string()))
        );
        assert_eq!(outcome.scores.len(), 2);

        let kept = outcome.clone();
        assert_eq!(kept.degraded, outcome.degraded);
    }

    #[test]
    fn test_every_metric_handles_empty_graph() {
        let view = GraphView::default();
        let mut rng = StdRng::seed_from_u64(1);
        for metric in CentralityMetric::all() {
            let outcome = compute_with_fallback(&view, metric.as_str(), &OPTIONS, &mut rng);
            assert!(outcome.scores.is_empty());
        }
    }
}
