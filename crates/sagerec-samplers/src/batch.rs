//! Training-pair batching and catalog chunking.
//!
//! [`CooccurrenceBatcher`] turns the training split into (query, positive,
//! negatives) triples: the positive is a training interaction, the query is
//! another item from the same user's history, and the pair weight is the
//! number of users the two items share. Negatives are drawn uniformly from
//! the frequency-admitted catalog. Each batch carries prebuilt neighborhood
//! flows for all three item sets.
//!
//! [`NodeFlowBatcher`] walks the whole catalog in fixed-size chunks for
//! embedding precompute.

use std::sync::Arc;

use anyhow::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use sagerec_core::BipartiteGraph;

use crate::flow::{NodeFlow, RandomWalkSampler};
use crate::frequency::ItemFrequency;
use crate::rng::RngKey;

/// One training batch: parallel item id lists, their flows, and per-pair
/// co-occurrence weights. `negatives` is flattened [batch * n_negatives].
#[derive(Clone, Debug)]
pub struct PairBatch {
    pub queries: Vec<usize>,
    pub positives: Vec<usize>,
    pub negatives: Vec<usize>,
    pub query_flow: NodeFlow,
    pub positive_flow: NodeFlow,
    pub negative_flow: NodeFlow,
    /// Raw common-user counts; clamping happens at loss time.
    pub weights: Vec<f32>,
    pub n_negatives: usize,
}

impl PairBatch {
    pub fn len(&self) -> usize {
        self.positives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positives.is_empty()
    }
}

/// A finite pass over some batch stream, restartable for the next pass.
///
/// Implementors must yield at least one batch per pass.
pub trait BatchSource: Send {
    type Batch: Send + 'static;

    /// Next batch of the current pass; `None` once the pass is exhausted.
    fn next_batch(&mut self) -> Option<Self::Batch>;

    /// Start a fresh pass (reshuffle order, advance derived RNG keys).
    fn begin_pass(&mut self);
}

/// Shuffled-pass batcher over user co-occurrence pairs.
pub struct CooccurrenceBatcher {
    graph: Arc<BipartiteGraph>,
    sampler: RandomWalkSampler,
    eligible: Vec<usize>,
    /// (user, positive item) pairs from users with at least two training
    /// items, so a distinct query item always exists.
    pairs: Vec<(usize, usize)>,
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
    n_negatives: usize,
    key: RngKey,
    draws: u64,
}

impl CooccurrenceBatcher {
    pub fn new(
        graph: Arc<BipartiteGraph>,
        sampler: RandomWalkSampler,
        frequency: &ItemFrequency,
        batch_size: usize,
        n_negatives: usize,
        key: RngKey,
    ) -> Result<Self> {
        let eligible = frequency.admitted();
        anyhow::ensure!(
            eligible.len() >= 2,
            "negative sampling needs at least two admitted items, got {}",
            eligible.len()
        );

        let mut pairs = Vec::new();
        for user in 0..graph.n_users {
            let items = graph.items_of(user);
            // rows are sorted, so a repeat-only history has first == last;
            // such users leave no distinct query to draw
            if items.len() < 2 || items.first() == items.last() {
                continue;
            }
            for &item in items {
                pairs.push((user, item));
            }
        }
        anyhow::ensure!(
            !pairs.is_empty(),
            "no user has two or more training items; cannot form query/positive pairs"
        );

        let order = (0..pairs.len()).collect();
        let mut batcher = Self {
            graph,
            sampler,
            eligible,
            pairs,
            order,
            cursor: 0,
            batch_size,
            n_negatives,
            key,
            draws: 0,
        };
        batcher.begin_pass();
        Ok(batcher)
    }

    /// Number of (user, positive) pairs in one pass.
    pub fn pass_len(&self) -> usize {
        self.pairs.len()
    }

    fn next_draw_key(&mut self) -> RngKey {
        self.draws += 1;
        self.key.fold(self.draws)
    }
}

impl BatchSource for CooccurrenceBatcher {
    type Batch = PairBatch;

    fn next_batch(&mut self) -> Option<PairBatch> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = self.cursor.saturating_add(self.batch_size).min(self.order.len());
        let picks: Vec<usize> = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        let draw_key = self.next_draw_key();
        let mut rng = draw_key.to_rng();
        let mut queries = Vec::with_capacity(picks.len());
        let mut positives = Vec::with_capacity(picks.len());
        let mut negatives = Vec::with_capacity(picks.len() * self.n_negatives);
        let mut weights = Vec::with_capacity(picks.len());

        for &p in &picks {
            let (user, positive) = self.pairs[p];
            let items = self.graph.items_of(user);
            // uniform over the user's other training items; duplicates of the
            // positive id are fine as long as one distinct item exists
            let query = loop {
                let candidate = items[rng.gen_range(0..items.len())];
                if candidate != positive {
                    break candidate;
                }
            };
            for _ in 0..self.n_negatives {
                let negative = loop {
                    let candidate = self.eligible[rng.gen_range(0..self.eligible.len())];
                    if candidate != positive {
                        break candidate;
                    }
                };
                negatives.push(negative);
            }
            weights.push(self.graph.common_user_count(query, positive) as f32);
            queries.push(query);
            positives.push(positive);
        }

        let flow_keys = draw_key.split(4);
        let query_flow = self.sampler.flow_for(&queries, flow_keys[1]);
        let positive_flow = self.sampler.flow_for(&positives, flow_keys[2]);
        let negative_flow = self.sampler.flow_for(&negatives, flow_keys[3]);

        Some(PairBatch {
            queries,
            positives,
            negatives,
            query_flow,
            positive_flow,
            negative_flow,
            weights,
            n_negatives: self.n_negatives,
        })
    }

    fn begin_pass(&mut self) {
        self.draws += 1;
        let mut rng = self.key.fold(self.draws).to_rng();
        self.order.shuffle(&mut rng);
        self.cursor = 0;
    }
}

/// Fixed-size catalog chunks with their flows, for embedding every item.
pub struct NodeFlowBatcher {
    sampler: RandomWalkSampler,
    n_items: usize,
    chunk_size: usize,
}

impl NodeFlowBatcher {
    pub fn new(sampler: RandomWalkSampler, n_items: usize, chunk_size: usize) -> Self {
        Self {
            sampler,
            n_items,
            chunk_size,
        }
    }

    /// Iterate (item id range, flow) over the catalog in id order.
    pub fn chunk_flows(
        &self,
        key: RngKey,
    ) -> impl Iterator<Item = (std::ops::Range<usize>, NodeFlow)> + '_ {
        let n_chunks = self.n_items.div_ceil(self.chunk_size);
        (0..n_chunks).map(move |chunk| {
            let start = chunk * self.chunk_size;
            let end = (start + self.chunk_size).min(self.n_items);
            let seeds: Vec<usize> = (start..end).collect();
            let flow = self.sampler.flow_for(&seeds, key.fold(chunk as u64));
            (start..end, flow)
        })
    }
}
