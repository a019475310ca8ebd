//! Importance-weighted margin ranking loss.
//!
//! Per (query, positive) pair with K negatives:
//!
//! ```text
//! hinge_jk = max(0, score_neg_jk - score_pos_j + margin)
//! loss     = sum_j c_j * mean_k(hinge_jk) / sum_j c_j
//! ```
//!
//! where `c_j` is the pair's co-occurrence weight, clamped to `max_weight`.
//! The weighted mean is invariant to scaling all `c_j` by a constant, so
//! only the relative weighting of pairs matters.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Scalar loss over one batch.
///
/// `query` and `positive` are [B, D]; `negative` is [B*K, D] grouped by
/// query; `weights` holds the raw per-pair counts.
pub fn weighted_hinge_loss<B: Backend>(
    query: Tensor<B, 2>,
    positive: Tensor<B, 2>,
    negative: Tensor<B, 2>,
    weights: &[f32],
    margin: f32,
    max_weight: f32,
    device: &B::Device,
) -> Tensor<B, 1> {
    let [b, d] = query.dims();
    let k = negative.dims()[0] / b;

    // [B, 1] positive scores
    let score_pos = (query.clone() * positive).sum_dim(1);

    // [B, K] negative scores against the same query embedding
    let score_neg = (query.reshape([b as i32, 1, d as i32])
        * negative.reshape([b as i32, k as i32, d as i32]))
    .sum_dim(2)
    .reshape([b as i32, k as i32]);

    // hinge per (pair, negative); score_pos broadcasts over K
    let hinge = (score_neg - score_pos + margin).clamp_min(0.0);
    let per_pair = hinge.mean_dim(1); // [B, 1]

    let clamped: Vec<f32> = weights.iter().map(|&w| w.min(max_weight)).collect();
    let total: f32 = clamped.iter().sum();
    let c: Tensor<B, 1> = Tensor::from_data(clamped.as_slice(), device);
    let c = c.reshape([b as i32, 1]);

    (per_pair * c).sum() / total
}
