//! Spreading activation
//!
//! Seeds start at 1.0 and push `activation * weight * decay` along their
//! outgoing edges each round. Contributions accumulate in a separate buffer
//! and are applied together, so the order in which nodes are visited never
//! affects the outcome.

use serde::{Deserialize, Serialize};

use super::mirror::GraphView;

/// Smallest change that counts as movement
const MATERIAL_CHANGE: f64 = 0.001;

/// Fewer moving nodes than this ends the pass early
const MIN_CHANGED_NODES: usize = 5;

/// Parameters of a spreading activation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationParams {
    pub iterations: u32,
    pub decay: f64,
    pub min_activation: f64,
}

impl Default for ActivationParams {
    fn default() -> Self {
        Self {
            iterations: 3,
            decay: 0.5,
            min_activation: 0.05,
        }
    }
}

/// A node and its final activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivatedNode {
    pub node_id: String,
    pub name: String,
    pub activation: f64,
}

/// Run a pass over `view`; returns `(index, activation)` for every node at
/// or above `min_activation`, highest first
pub fn spread(view: &GraphView, seeds: &[String], params: &ActivationParams) -> Vec<(usize, f64)> {
    let n = view.node_count();
    let decay = if params.decay.is_finite() { params.decay.max(0.0) } else { 0.0 };
    let mut activation = vec![0.0_f64; n];

    for seed in seeds {
        if let Some(index) = view.index_of(seed) {
            activation[index] = 1.0;
        }
    }

    for round in 0..params.iterations {
        let mut buffer = vec![0.0_f64; n];
        for (source, level) in activation.iter().enumerate() {
            if *level <= 0.0 || *level < params.min_activation {
                continue;
            }
            for edge in &view.adjacency[source] {
                buffer[edge.target_index] += level * edge.weight * decay;
            }
        }

        let mut changed = 0;
        for (current, incoming) in activation.iter_mut().zip(buffer) {
            if incoming <= 0.0 {
                continue;
            }
            let next = current.max(incoming.min(1.0));
            if (next - *current).abs() > MATERIAL_CHANGE {
                changed += 1;
            }
            *current = next;
        }

        tracing::trace!(round, changed, "Activation round");
        if round >= 1 && changed < MIN_CHANGED_NODES {
            break;
        }
    }

    let mut result: Vec<(usize, f64)> = activation
        .into_iter()
        .enumerate()
        .filter(|(_, level)| *level > 0.0 && *level >= params.min_activation)
        .map(|(index, level)| (index, level.min(1.0)))
        .collect();
    result.sort_by(|a, b| b.1.total_cmp(&a.1).then(view.ids[a.0].cmp(&view.ids[b.0])));
    result
}
