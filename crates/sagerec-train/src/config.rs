//! Training-run configuration.

use serde::{Deserialize, Serialize};

/// Every knob of a training run. Defaults mirror a full-scale run; tests
/// shrink them through the builder methods.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TrainConfig {
    pub n_epochs: usize,
    /// Iterations per epoch, independent of the sampler's pass length.
    pub iters_per_epoch: usize,
    pub batch_size: usize,
    pub embed_dim: usize,
    pub n_layers: usize,
    /// Random-walk shape: walks per node and item hops per walk.
    pub n_traces: usize,
    pub trace_len: usize,
    /// Neighbors kept per node per hop.
    pub n_neighbors: usize,
    /// Negative items per training pair.
    pub n_negatives: usize,
    pub lr: f32,
    pub weight_decay: f32,
    pub margin: f32,
    /// Upper clamp on importance weights before the weighted mean.
    pub max_weight: f32,
    /// Prefetch worker threads; 0 builds batches on the training thread.
    pub num_workers: usize,
    /// Bounded buffer size per prefetch worker.
    pub prefetch: usize,
    /// Restrict negatives to a training-popularity band.
    pub neg_by_freq: bool,
    pub neg_freq_min: u32,
    pub neg_freq_max: u32,
    /// Cutoff K for HITS/NDCG.
    pub eval_k: usize,
    /// Catalog chunk size for embedding precompute.
    pub eval_chunk: usize,
    /// Print running loss every this many iterations.
    pub log_every: usize,
    /// Accumulate per-parameter gradient norms for the console report.
    pub grad_diagnostics: bool,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            n_epochs: 200,
            iters_per_epoch: 20_000,
            batch_size: 32,
            embed_dim: 16,
            n_layers: 2,
            n_traces: 10,
            trace_len: 3,
            n_neighbors: 3,
            n_negatives: 4,
            lr: 3e-4,
            weight_decay: 1e-5,
            margin: 1.0,
            max_weight: f32::INFINITY,
            num_workers: 0,
            prefetch: 4,
            neg_by_freq: false,
            neg_freq_min: 0,
            neg_freq_max: u32::MAX,
            eval_k: 10,
            eval_chunk: 512,
            log_every: 100,
            grad_diagnostics: true,
            seed: 42,
        }
    }
}

impl TrainConfig {
    pub const fn with_epochs(mut self, n_epochs: usize, iters_per_epoch: usize) -> Self {
        self.n_epochs = n_epochs;
        self.iters_per_epoch = iters_per_epoch;
        self
    }

    pub const fn with_batch(mut self, batch_size: usize, n_negatives: usize) -> Self {
        self.batch_size = batch_size;
        self.n_negatives = n_negatives;
        self
    }

    pub const fn with_model(mut self, embed_dim: usize, n_layers: usize) -> Self {
        self.embed_dim = embed_dim;
        self.n_layers = n_layers;
        self
    }

    pub const fn with_walks(mut self, n_traces: usize, trace_len: usize, n_neighbors: usize) -> Self {
        self.n_traces = n_traces;
        self.trace_len = trace_len;
        self.n_neighbors = n_neighbors;
        self
    }

    pub const fn with_optimizer(mut self, lr: f32, weight_decay: f32) -> Self {
        self.lr = lr;
        self.weight_decay = weight_decay;
        self
    }

    pub const fn with_workers(mut self, num_workers: usize, prefetch: usize) -> Self {
        self.num_workers = num_workers;
        self.prefetch = prefetch;
        self
    }

    pub const fn with_frequency_band(mut self, min: u32, max: u32) -> Self {
        self.neg_by_freq = true;
        self.neg_freq_min = min;
        self.neg_freq_max = max;
        self
    }

    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_admit_all_negatives() {
        let config = TrainConfig::default();
        assert!(!config.neg_by_freq);
        assert_eq!(config.neg_freq_min, 0);
        assert_eq!(config.neg_freq_max, u32::MAX);
        assert!(config.max_weight.is_infinite());
    }

    #[test]
    fn test_builder_chain() {
        let config = TrainConfig::default()
            .with_epochs(2, 10)
            .with_model(8, 1)
            .with_frequency_band(1, 5);
        assert_eq!(config.n_epochs, 2);
        assert_eq!(config.embed_dim, 8);
        assert!(config.neg_by_freq);
        assert_eq!(config.neg_freq_max, 5);
    }
}
