//! Top-K ranking metrics for a single relevant item.
//!
//! Every evaluation in this workspace scores a candidate list in which the
//! relevant item sits at index 0 by construction, followed by the negative
//! pool. The metrics therefore reduce to the single-relevant-item forms:
//!
//! ```text
//! rank    = 1 + |{ j > 0 : scores[j] > scores[0] }|
//! HITS@K  = 1 if rank <= K else 0
//! NDCG@K  = 1 / log2(rank + 1) if rank <= K else 0
//! ```
//!
//! Ties count as "not greater", so an exact tie never pushes the relevant
//! item down a rank.

use std::fmt;

/// 1-indexed rank of the relevant item (index 0) under descending scores.
///
/// Only strictly greater scores outrank the relevant item. An empty list
/// has no competitors and ranks as 1.
pub fn rank_of_relevant(scores: &[f32]) -> usize {
    let Some(&target) = scores.first() else {
        return 1;
    };
    1 + scores[1..].iter().filter(|&&s| s > target).count()
}

/// (HITS@K, NDCG@K) for one query instance.
///
/// # Example
///
/// ```
/// use sagerec_core::metrics::evaluate_ranking;
///
/// // Relevant item scores highest: perfect rank.
/// let (hits, ndcg) = evaluate_ranking(&[3.0, 1.0, 2.0], 10);
/// assert_eq!(hits, 1.0);
/// assert_eq!(ndcg, 1.0);
///
/// // One candidate outranks it: rank 2, NDCG = 1/log2(3).
/// let (hits, ndcg) = evaluate_ranking(&[1.0, 2.0, 0.5], 10);
/// assert_eq!(hits, 1.0);
/// assert!((ndcg - 1.0 / 3.0f32.log2()).abs() < 1e-6);
/// ```
pub fn evaluate_ranking(scores: &[f32], k: usize) -> (f32, f32) {
    let rank = rank_of_relevant(scores);
    if rank <= k {
        (1.0, 1.0 / ((rank + 1) as f32).log2())
    } else {
        (0.0, 0.0)
    }
}

/// Mean HITS@K / NDCG@K over the queries of one split.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SplitMetrics {
    pub hits: f32,
    pub ndcg: f32,
    pub n_queries: usize,
}

impl fmt::Display for SplitMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HITS@K={:.4} NDCG@K={:.4} ({} queries)",
            self.hits, self.ndcg, self.n_queries
        )
    }
}

/// Running aggregator for per-instance metric values.
///
/// Sums in f64 so long splits do not lose precision.
#[derive(Debug, Default)]
pub struct MetricAccumulator {
    hits_sum: f64,
    ndcg_sum: f64,
    n: usize,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one candidate list (relevant item first) and fold it in.
    pub fn push_scores(&mut self, scores: &[f32], k: usize) {
        let (hits, ndcg) = evaluate_ranking(scores, k);
        self.push(hits, ndcg);
    }

    pub fn push(&mut self, hits: f32, ndcg: f32) {
        self.hits_sum += hits as f64;
        self.ndcg_sum += ndcg as f64;
        self.n += 1;
    }

    pub fn finish(&self) -> SplitMetrics {
        let n = self.n.max(1) as f64;
        SplitMetrics {
            hits: (self.hits_sum / n) as f32,
            ndcg: (self.ndcg_sum / n) as f32,
            n_queries: self.n,
        }
    }
}
