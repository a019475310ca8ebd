//! Epoch/iteration training loop for the two-tower model.
//!
//! One Adam instance drives both towers; parameter names are prefixed with
//! the tower (`p.`/`q.`) so optimizer state never collides. Query
//! embeddings come from the q tower, positive and negative item embeddings
//! from the p tower. Every epoch ends with a full evaluation pass and an
//! unconditional checkpoint overwrite; there is no best-model selection.
//!
//! A non-finite value in any parameter gradient aborts the run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;
use sagerec_core::backend::{init_device, TrainBackend};
use sagerec_core::{BipartiteGraph, InteractionStore};
use sagerec_models::{
    save_checkpoint, Adam, AdamConfig, EmbedderConfig, GraphEmbedder,
};
use sagerec_samplers::{
    worker_keys, CooccurrenceBatcher, CyclicStream, ItemFrequency, NodeFlowBatcher, PairBatch,
    PrefetchStream, RandomWalkSampler, RngKey,
};

use crate::config::TrainConfig;
use crate::evaluator::{
    evaluate_model, knn_baseline, popularity_baseline, precompute_catalog, EvalReport,
};
use crate::loss::weighted_hinge_loss;
use crate::pretrain::PretrainStrategy;

type Gradients = <TrainBackend as AutodiffBackend>::Gradients;

/// What a finished run reports back.
#[derive(Clone, Debug)]
pub struct TrainOutcome {
    pub final_report: EvalReport,
    pub epochs_run: usize,
    pub last_epoch_loss: f32,
}

enum BatchStream {
    Sync(CyclicStream<CooccurrenceBatcher>),
    Prefetch(PrefetchStream<PairBatch>),
}

impl BatchStream {
    fn next(&mut self) -> PairBatch {
        match self {
            Self::Sync(stream) => stream.next(),
            Self::Prefetch(stream) => stream.next(),
        }
    }
}

pub struct Trainer {
    config: TrainConfig,
    device: burn::backend::ndarray::NdArrayDevice,
    store: Arc<InteractionStore>,
    graph: Arc<BipartiteGraph>,
    p: GraphEmbedder<TrainBackend>,
    q: GraphEmbedder<TrainBackend>,
    adam: Adam,
    checkpoint_path: PathBuf,
    stream_key: RngKey,
    eval_key: RngKey,
}

impl Trainer {
    pub fn new(
        config: TrainConfig,
        store: Arc<InteractionStore>,
        graph: Arc<BipartiteGraph>,
        checkpoint_path: PathBuf,
    ) -> Result<Self> {
        let device = init_device();
        let keys = RngKey::new(config.seed).split(4);

        let embedder_config = EmbedderConfig {
            n_items: store.n_items,
            embed_dim: config.embed_dim,
            n_layers: config.n_layers,
        };
        let p = GraphEmbedder::init(&embedder_config, &device, keys[0]);
        let q = GraphEmbedder::init(&embedder_config, &device, keys[1]);
        let adam = Adam::new(
            AdamConfig::default()
                .with_lr(config.lr)
                .with_weight_decay(config.weight_decay),
        );

        Ok(Self {
            config,
            device,
            store,
            graph,
            p,
            q,
            adam,
            checkpoint_path,
            stream_key: keys[2],
            eval_key: keys[3],
        })
    }

    /// Apply a warm-start strategy to both towers' base tables.
    pub fn warm_start(&mut self, strategy: &dyn PretrainStrategy) -> Result<()> {
        let Some(factors) = strategy.initial_embeddings(&self.store, &self.graph)? else {
            return Ok(());
        };
        log::info!(
            "warm start: seeding base tables with {}x{} row factors, {}x{} column factors",
            factors.p.len(),
            factors.p.first().map(|r| r.len()).unwrap_or(0),
            factors.q.len(),
            factors.q.first().map(|r| r.len()).unwrap_or(0),
        );
        self.p.warm_start_base(&factors.p, &self.device)?;
        self.q.warm_start_base(&factors.q, &self.device)?;
        Ok(())
    }

    fn build_stream(&self) -> Result<BatchStream> {
        let frequency = {
            let base = ItemFrequency::from_store(&self.store);
            if self.config.neg_by_freq {
                base.with_band(self.config.neg_freq_min, self.config.neg_freq_max)
            } else {
                base
            }
        };
        let sampler = RandomWalkSampler::new(
            self.graph.clone(),
            self.config.n_layers,
            self.config.n_neighbors,
            self.config.n_traces,
            self.config.trace_len,
        );

        if self.config.num_workers == 0 {
            let batcher = CooccurrenceBatcher::new(
                self.graph.clone(),
                sampler,
                &frequency,
                self.config.batch_size,
                self.config.n_negatives,
                self.stream_key,
            )?;
            return Ok(BatchStream::Sync(CyclicStream::new(batcher)));
        }

        let sources = worker_keys(self.stream_key, self.config.num_workers)
            .into_iter()
            .map(|key| {
                CooccurrenceBatcher::new(
                    self.graph.clone(),
                    sampler.clone(),
                    &frequency,
                    self.config.batch_size,
                    self.config.n_negatives,
                    key,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BatchStream::Prefetch(PrefetchStream::spawn(
            sources,
            self.config.prefetch,
        )))
    }

    /// One forward/backward/update step. Returns (loss, summed grad norms).
    fn step(&mut self, batch: &PairBatch) -> Result<(f32, f32)> {
        let query = self.q.forward(&batch.query_flow, &self.device);
        let positive = self.p.forward(&batch.positive_flow, &self.device);
        let negative = self.p.forward(&batch.negative_flow, &self.device);

        let loss = weighted_hinge_loss(
            query,
            positive,
            negative,
            &batch.weights,
            self.config.margin,
            self.config.max_weight,
            &self.device,
        );
        let loss_value = loss
            .clone()
            .into_data()
            .to_vec::<f32>()
            .expect("loss to scalar")[0];
        anyhow::ensure!(loss_value.is_finite(), "non-finite loss {loss_value}");

        let grads = loss.backward();
        self.adam.begin_step();
        let mut grad_norm = 0.0;
        grad_norm += update_tower(
            &mut self.adam,
            &mut self.p,
            "p",
            &grads,
            self.config.grad_diagnostics,
        )?;
        grad_norm += update_tower(
            &mut self.adam,
            &mut self.q,
            "q",
            &grads,
            self.config.grad_diagnostics,
        )?;
        Ok((loss_value, grad_norm))
    }

    pub fn run(&mut self) -> Result<TrainOutcome> {
        let k = self.config.eval_k;

        println!("=== Baselines (computed once) ===");
        println!("popularity: {}", popularity_baseline(&self.store, k));
        println!(
            "item-knn:   {}",
            knn_baseline(&self.store, &self.device, k)?
        );

        let mut stream = self.build_stream()?;
        let eval_sampler = RandomWalkSampler::new(
            self.graph.clone(),
            self.config.n_layers,
            self.config.n_neighbors,
            self.config.n_traces,
            self.config.trace_len,
        );
        let flow_batcher =
            NodeFlowBatcher::new(eval_sampler, self.store.n_items, self.config.eval_chunk);

        let mut last_report = EvalReport::default();
        let mut last_epoch_loss = 0.0;

        for epoch in 0..self.config.n_epochs {
            let mut loss_sum = 0.0f64;
            let mut norm_sum = 0.0f64;
            for iteration in 0..self.config.iters_per_epoch {
                let batch = stream.next();
                let (loss, grad_norm) = self
                    .step(&batch)
                    .with_context(|| format!("epoch {epoch} iteration {iteration}"))?;
                loss_sum += loss as f64;
                norm_sum += grad_norm as f64;
                if (iteration + 1) % self.config.log_every == 0 {
                    let n = (iteration + 1) as f64;
                    println!(
                        "epoch {epoch} iter {}/{}: loss {:.5} grad-norm {:.5}",
                        iteration + 1,
                        self.config.iters_per_epoch,
                        loss_sum / n,
                        norm_sum / n,
                    );
                }
            }
            last_epoch_loss = (loss_sum / self.config.iters_per_epoch.max(1) as f64) as f32;

            let catalog = precompute_catalog(
                &self.p.valid(),
                &self.q.valid(),
                &flow_batcher,
                &self.device,
                self.eval_key.fold(epoch as u64),
            );
            last_report = evaluate_model(&self.store, &catalog, k);
            println!("epoch {epoch}: {last_report}");

            save_checkpoint(&self.checkpoint_path, &self.p.valid(), &self.q.valid())
                .with_context(|| format!("saving checkpoint after epoch {epoch}"))?;
        }

        Ok(TrainOutcome {
            final_report: last_report,
            epochs_run: self.config.n_epochs,
            last_epoch_loss,
        })
    }
}

fn update_tower(
    adam: &mut Adam,
    model: &mut GraphEmbedder<TrainBackend>,
    prefix: &str,
    grads: &Gradients,
    diagnostics: bool,
) -> Result<f32> {
    let mut norm_sum = 0.0;
    for (name, param) in model.named_params_mut() {
        let Some(grad) = param.grad(grads) else {
            continue;
        };
        let values: Vec<f32> = grad
            .clone()
            .into_data()
            .to_vec()
            .expect("gradient to vec");
        anyhow::ensure!(
            values.iter().all(|v| v.is_finite()),
            "non-finite gradient in parameter {prefix}.{name}"
        );
        if diagnostics {
            norm_sum += values.iter().map(|v| v * v).sum::<f32>().sqrt();
        }
        let updated = adam.update(&format!("{prefix}.{name}"), param.clone().inner(), grad);
        *param = Tensor::from_inner(updated).require_grad();
    }
    Ok(norm_sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sagerec_core::Event;

    fn fixture() -> (Arc<InteractionStore>, Arc<BipartiteGraph>) {
        let mut events = Vec::new();
        for user in 0..6usize {
            for (t, item) in (0..8usize).filter(|&i| (i + user) % 7 != 0).enumerate() {
                events.push(Event {
                    user,
                    item,
                    timestamp: t as i64,
                });
            }
        }
        let store = Arc::new(InteractionStore::from_events(&events, 3, 21).unwrap());
        let graph = BipartiteGraph::from_store(&store, &init_device()).unwrap();
        (store, graph)
    }

    fn tiny_config() -> TrainConfig {
        TrainConfig::default()
            .with_epochs(2, 4)
            .with_batch(4, 2)
            .with_model(4, 2)
            .with_walks(4, 2, 2)
            .with_optimizer(1e-2, 1e-4)
            .with_seed(3)
    }

    #[test]
    fn test_training_smoke() {
        let (store, graph) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let mut trainer = Trainer::new(tiny_config(), store, graph, path.clone()).unwrap();
        let outcome = trainer.run().unwrap();

        assert_eq!(outcome.epochs_run, 2);
        assert!(outcome.last_epoch_loss.is_finite());
        assert!((0.0..=1.0).contains(&outcome.final_report.valid.hits));
        assert!((0.0..=1.0).contains(&outcome.final_report.test_complete.ndcg));
        assert!(path.exists(), "checkpoint written every epoch");
    }

    #[test]
    fn test_training_with_prefetch_workers() {
        let (store, graph) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let config = tiny_config().with_workers(2, 2);
        let mut trainer = Trainer::new(config, store, graph, path).unwrap();
        let outcome = trainer.run().unwrap();
        assert!(outcome.last_epoch_loss.is_finite());
    }

    #[test]
    fn test_warm_start_seeds_both_towers() {
        use crate::pretrain::{PretrainStrategy, WarmStartFactors};

        struct Fixed;
        impl PretrainStrategy for Fixed {
            fn initial_embeddings(
                &self,
                _store: &InteractionStore,
                _graph: &BipartiteGraph,
            ) -> anyhow::Result<Option<WarmStartFactors>> {
                Ok(Some(WarmStartFactors {
                    p: vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]],
                    q: vec![vec![-1.0, -2.0, -3.0, -4.0], vec![-5.0, -6.0, -7.0, -8.0]],
                }))
            }
        }

        let (store, graph) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let mut trainer = Trainer::new(tiny_config(), store, graph, path).unwrap();
        trainer.warm_start(&Fixed).unwrap();

        let p: Vec<f32> = trainer.p.base.clone().inner().into_data().to_vec().unwrap();
        let q: Vec<f32> = trainer.q.base.clone().inner().into_data().to_vec().unwrap();
        assert_eq!(&p[0..8], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(&q[0..8], &[-1.0, -2.0, -3.0, -4.0, -5.0, -6.0, -7.0, -8.0]);
    }

    #[test]
    fn test_non_finite_gradient_aborts_update() {
        // sqrt at zero has an infinite derivative: the loss itself is finite
        // but the base-table gradient is not, and the update must refuse it
        let (store, graph) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let mut trainer = Trainer::new(tiny_config(), store.clone(), graph, path).unwrap();
        let zeros = vec![vec![0.0f32; 4]; store.n_items];
        trainer.p.warm_start_base(&zeros, &trainer.device).unwrap();

        let loss = trainer.p.base.clone().sqrt().sum();
        let grads = loss.backward();
        trainer.adam.begin_step();
        let err =
            update_tower(&mut trainer.adam, &mut trainer.p, "p", &grads, true).unwrap_err();
        assert!(
            err.to_string().contains("non-finite gradient in parameter p.base"),
            "{err}"
        );
    }

    #[test]
    fn test_non_finite_loss_aborts_run() {
        let (store, graph) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let mut trainer = Trainer::new(tiny_config(), store, graph, path).unwrap();
        // an infinite margin drives every hinge term to infinity
        trainer.config.margin = f32::INFINITY;
        let err = trainer.run().unwrap_err();
        assert!(format!("{err:#}").contains("non-finite"), "{err:#}");
    }

    #[test]
    fn test_steps_change_parameters() {
        let (store, graph) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let config = tiny_config().with_epochs(1, 6);
        let mut trainer = Trainer::new(config, store, graph, path).unwrap();
        let before: Vec<f32> = trainer.p.base.clone().inner().into_data().to_vec().unwrap();
        trainer.run().unwrap();
        let after: Vec<f32> = trainer.p.base.clone().inner().into_data().to_vec().unwrap();
        assert_ne!(before, after, "training must move the p tower");
    }
}
