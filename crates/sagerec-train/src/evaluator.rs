//! Held-out evaluation protocol and model-free baselines.
//!
//! Per epoch the full item catalog is embedded once through each tower
//! (no gradient tracking), then every held-out (user, positive) pair is
//! scored against its candidate pool: the positive first, followed by the
//! user's negative pool. The query vector is the q-tower embedding of the
//! user's latest training item.
//!
//! Test pairs are scored twice, against the sampled pool and against the
//! complete catalog-wide pool. The popularity and item-kNN baselines run
//! the same protocol with model-free score functions and are computed once
//! per run.

use std::fmt;

use anyhow::Result;
use burn::tensor::Tensor;
use sagerec_core::backend::CpuBackend;
use sagerec_core::{cosine_similarity_matrix, InteractionStore, MetricAccumulator, SplitMetrics};
use sagerec_models::GraphEmbedder;
use sagerec_samplers::{NodeFlowBatcher, RngKey};

/// Metrics for one full evaluation pass.
#[derive(Clone, Debug, Default)]
pub struct EvalReport {
    pub valid: SplitMetrics,
    pub test_sampled: SplitMetrics,
    pub test_complete: SplitMetrics,
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "valid {} | test/sampled {} | test/complete {}",
            self.valid, self.test_sampled, self.test_complete
        )
    }
}

/// Dense per-item embeddings for both towers, row-major.
pub struct CatalogEmbeddings {
    p: Vec<f32>,
    q: Vec<f32>,
    dim: usize,
}

impl CatalogEmbeddings {
    pub fn p_row(&self, item: usize) -> &[f32] {
        &self.p[item * self.dim..(item + 1) * self.dim]
    }

    pub fn q_row(&self, item: usize) -> &[f32] {
        &self.q[item * self.dim..(item + 1) * self.dim]
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Embed every catalog item through both frozen towers, chunk by chunk.
pub fn precompute_catalog(
    p: &GraphEmbedder<CpuBackend>,
    q: &GraphEmbedder<CpuBackend>,
    batcher: &NodeFlowBatcher,
    device: &burn::backend::ndarray::NdArrayDevice,
    key: RngKey,
) -> CatalogEmbeddings {
    let dim = p.embed_dim();
    let n = p.n_items();
    let mut p_rows = vec![0.0f32; n * dim];
    let mut q_rows = vec![0.0f32; n * dim];

    for (range, flow) in batcher.chunk_flows(key) {
        let p_chunk: Vec<f32> = p
            .forward(&flow, device)
            .into_data()
            .to_vec()
            .expect("catalog embeddings to vec");
        let q_chunk: Vec<f32> = q
            .forward(&flow, device)
            .into_data()
            .to_vec()
            .expect("catalog embeddings to vec");
        let offset = range.start * dim;
        p_rows[offset..offset + p_chunk.len()].copy_from_slice(&p_chunk);
        q_rows[offset..offset + q_chunk.len()].copy_from_slice(&q_chunk);
    }

    CatalogEmbeddings {
        p: p_rows,
        q: q_rows,
        dim,
    }
}

/// Run the candidate-scoring protocol over every split with an arbitrary
/// score function of (user's latest training item, candidate item).
fn run_protocol<F>(store: &InteractionStore, k: usize, score: F) -> EvalReport
where
    F: Fn(usize, usize) -> f32,
{
    let eval_split = |pairs: &sagerec_core::Split, pools: &[Vec<usize>]| -> SplitMetrics {
        let mut acc = MetricAccumulator::new();
        for (user, positive) in pairs.pairs() {
            let Some(latest) = store.user_latest_item[user] else {
                continue;
            };
            let pool = &pools[user];
            if pool.is_empty() {
                continue;
            }
            let mut scores = Vec::with_capacity(pool.len() + 1);
            scores.push(score(latest, positive));
            scores.extend(pool.iter().map(|&candidate| score(latest, candidate)));
            acc.push_scores(&scores, k);
        }
        acc.finish()
    };

    EvalReport {
        valid: eval_split(&store.valid, &store.neg_valid),
        test_sampled: eval_split(&store.test, &store.neg_test),
        test_complete: eval_split(&store.test, &store.neg_test_complete),
    }
}

/// Learned-model metrics from precomputed catalog embeddings.
pub fn evaluate_model(store: &InteractionStore, catalog: &CatalogEmbeddings, k: usize) -> EvalReport {
    run_protocol(store, k, |latest, candidate| {
        dot(catalog.q_row(latest), catalog.p_row(candidate))
    })
}

/// Popularity baseline: candidates score their training interaction count.
pub fn popularity_baseline(store: &InteractionStore, k: usize) -> EvalReport {
    run_protocol(store, k, |_latest, candidate| store.item_counts[candidate])
}

/// Item-kNN baseline: cosine similarity between the user's latest item and
/// each candidate, over a dense train+valid interaction matrix.
pub fn knn_baseline(
    store: &InteractionStore,
    device: &burn::backend::ndarray::NdArrayDevice,
    k: usize,
) -> Result<EvalReport> {
    let n_users = store.n_users;
    let n_items = store.n_items;

    // item-major incidence over train and valid interactions
    let mut incidence = vec![0.0f32; n_items * n_users];
    for (user, item) in store.train.pairs().chain(store.valid.pairs()) {
        incidence[item * n_users + user] = 1.0;
    }
    let flat: Tensor<CpuBackend, 1> = Tensor::from_data(incidence.as_slice(), device);
    let item_matrix = flat.reshape([n_items as i32, n_users as i32]);

    let similarity: Vec<f32> = cosine_similarity_matrix(&item_matrix)
        .into_data()
        .to_vec()
        .expect("similarity to vec");

    Ok(run_protocol(store, k, move |latest, candidate| {
        similarity[latest * n_items + candidate]
    }))
}
