//! Two-tower SAGE-style graph embedder.
//!
//! Each tower owns a base embedding table over the item catalog plus a stack
//! of aggregation layers. A forward pass consumes a [`NodeFlow`]: gather the
//! deepest frontier from the base table, then per hop combine each node's
//! own vector with the weighted mean of its sampled neighbors through
//! learned projections and a ReLU.
//!
//! Training parameters live as plain tensors with `require_grad`; the
//! optimizer walks them by name through [`GraphEmbedder::named_params_mut`].

use anyhow::Result;
use burn::tensor::backend::Backend;
use burn::tensor::{activation, Int, Tensor};
use rand::Rng;
use sagerec_core::backend::{CpuBackend, TrainBackend};
use sagerec_samplers::{NodeFlow, RngKey};

/// Shape of one embedder tower.
#[derive(Clone, Copy, Debug)]
pub struct EmbedderConfig {
    pub n_items: usize,
    pub embed_dim: usize,
    pub n_layers: usize,
}

/// One aggregation layer: `relu(h_self W_self + h_neigh W_neigh + b)`.
#[derive(Clone, Debug)]
pub struct SageLayer<B: Backend> {
    pub w_self: Tensor<B, 2>,
    pub w_neigh: Tensor<B, 2>,
    /// Kept 2-D ([1, d]) so every parameter shares one tensor rank.
    pub bias: Tensor<B, 2>,
}

#[derive(Clone, Debug)]
pub struct GraphEmbedder<B: Backend> {
    pub base: Tensor<B, 2>,
    pub layers: Vec<SageLayer<B>>,
    embed_dim: usize,
}

impl<B: Backend> GraphEmbedder<B> {
    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    pub fn n_items(&self) -> usize {
        self.base.dims()[0]
    }

    /// Embed the seeds of `flow`, one row per seed.
    pub fn forward(&self, flow: &NodeFlow, device: &B::Device) -> Tensor<B, 2> {
        debug_assert_eq!(flow.hops.len(), self.layers.len());
        let d = self.embed_dim as i32;

        let inputs: Tensor<B, 1, Int> = Tensor::from_data(flow.inputs.as_slice(), device);
        let mut h = self.base.clone().select(0, inputs);

        for (hop, layer) in flow.hops.iter().zip(self.layers.iter()) {
            let n = hop.n_out as i32;
            let k = hop.n_neighbors as i32;

            let self_idx: Tensor<B, 1, Int> = Tensor::from_data(hop.self_index.as_slice(), device);
            let nb_idx: Tensor<B, 1, Int> =
                Tensor::from_data(hop.neighbor_index.as_slice(), device);
            let weights: Tensor<B, 1> = Tensor::from_data(hop.neighbor_weight.as_slice(), device);

            let h_self = h.clone().select(0, self_idx);
            // [n*k, d] -> [n, k, d], weighted by [n, k, 1], summed over k
            let h_neigh = h
                .select(0, nb_idx)
                .reshape([n, k, d])
                .mul(weights.reshape([n, k, 1]))
                .sum_dim(1)
                .reshape([n, d]);

            h = activation::relu(
                h_self.matmul(layer.w_self.clone())
                    + h_neigh.matmul(layer.w_neigh.clone())
                    + layer.bias.clone(),
            );
        }
        h
    }

    /// All learnable tensors with their stable names.
    pub fn named_params(&self) -> Vec<(String, Tensor<B, 2>)> {
        let mut params = vec![("base".to_string(), self.base.clone())];
        for (i, layer) in self.layers.iter().enumerate() {
            params.push((format!("layers.{i}.w_self"), layer.w_self.clone()));
            params.push((format!("layers.{i}.w_neigh"), layer.w_neigh.clone()));
            params.push((format!("layers.{i}.bias"), layer.bias.clone()));
        }
        params
    }

    /// Mutable view used by the optimizer to write updated tensors back.
    pub fn named_params_mut(&mut self) -> Vec<(String, &mut Tensor<B, 2>)> {
        let mut params = vec![("base".to_string(), &mut self.base)];
        for (i, layer) in self.layers.iter_mut().enumerate() {
            params.push((format!("layers.{i}.w_self"), &mut layer.w_self));
            params.push((format!("layers.{i}.w_neigh"), &mut layer.w_neigh));
            params.push((format!("layers.{i}.bias"), &mut layer.bias));
        }
        params
    }
}

impl GraphEmbedder<TrainBackend> {
    /// Fresh tower with uniform `[-1/sqrt(d), 1/sqrt(d)]` initialization,
    /// deterministic in `key`. All tensors are tracked for autodiff.
    pub fn init(config: &EmbedderConfig, device: &<TrainBackend as Backend>::Device, key: RngKey) -> Self {
        let d = config.embed_dim;
        let scale = 1.0 / (d as f32).sqrt();
        let mut rng = key.to_rng();
        let mut uniform = |rows: usize, cols: usize| -> Tensor<TrainBackend, 2> {
            let data: Vec<f32> = (0..rows * cols)
                .map(|_| rng.gen_range(-scale..scale))
                .collect();
            let flat: Tensor<TrainBackend, 1> = Tensor::from_data(data.as_slice(), device);
            flat.reshape([rows as i32, cols as i32]).require_grad()
        };

        let base = uniform(config.n_items, d);
        let layers = (0..config.n_layers)
            .map(|_| SageLayer {
                w_self: uniform(d, d),
                w_neigh: uniform(d, d),
                bias: uniform(1, d),
            })
            .collect();

        Self {
            base,
            layers,
            embed_dim: d,
        }
    }

    /// Inference copy on the inner (non-autodiff) backend.
    pub fn valid(&self) -> GraphEmbedder<CpuBackend> {
        GraphEmbedder {
            base: self.base.clone().inner(),
            layers: self
                .layers
                .iter()
                .map(|layer| SageLayer {
                    w_self: layer.w_self.clone().inner(),
                    w_neigh: layer.w_neigh.clone().inner(),
                    bias: layer.bias.clone().inner(),
                })
                .collect(),
            embed_dim: self.embed_dim,
        }
    }

    /// Overwrite the first `rows.len()` base rows with external factors.
    ///
    /// Rows beyond the provided block keep their random initialization, so a
    /// factorization over a subset of the catalog still warm-starts cleanly.
    pub fn warm_start_base(
        &mut self,
        rows: &[Vec<f32>],
        device: &<TrainBackend as Backend>::Device,
    ) -> Result<()> {
        let [n, d] = self.base.dims();
        anyhow::ensure!(
            rows.len() <= n,
            "warm start provides {} rows for a {}-item table",
            rows.len(),
            n
        );
        let mut data: Vec<f32> = self
            .base
            .clone()
            .inner()
            .into_data()
            .to_vec()
            .expect("base to vec");
        for (i, row) in rows.iter().enumerate() {
            anyhow::ensure!(
                row.len() == d,
                "warm start row {} has dim {}, expected {}",
                i,
                row.len(),
                d
            );
            data[i * d..(i + 1) * d].copy_from_slice(row);
        }
        let flat: Tensor<TrainBackend, 1> = Tensor::from_data(data.as_slice(), device);
        self.base = flat.reshape([n as i32, d as i32]).require_grad();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sagerec_core::{init_device, BipartiteGraph, Event, InteractionStore};
    use sagerec_samplers::RandomWalkSampler;
    use std::sync::Arc;

    fn graph() -> Arc<BipartiteGraph> {
        let mut events = Vec::new();
        for user in 0..3usize {
            for (t, item) in (0..5usize).filter(|&i| i != user).enumerate() {
                events.push(Event {
                    user,
                    item,
                    timestamp: t as i64,
                });
            }
        }
        let store = InteractionStore::from_events(&events, 2, 0).unwrap();
        BipartiteGraph::from_store(&store, &init_device()).unwrap()
    }

    fn config() -> EmbedderConfig {
        EmbedderConfig {
            n_items: 5,
            embed_dim: 4,
            n_layers: 2,
        }
    }

    #[test]
    fn test_forward_shape_matches_seeds() {
        let device = init_device();
        let model = GraphEmbedder::init(&config(), &device, RngKey::new(1));
        let sampler = RandomWalkSampler::new(graph(), 2, 3, 5, 2);
        let flow = sampler.flow_for(&[0, 2, 4], RngKey::new(2));
        let out = model.forward(&flow, &device);
        assert_eq!(out.dims(), [3, 4]);
        let values: Vec<f32> = out.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
        assert!(values.iter().all(|&v| v >= 0.0), "relu output");
    }

    #[test]
    fn test_init_deterministic_in_key() {
        let device = init_device();
        let a = GraphEmbedder::init(&config(), &device, RngKey::new(5));
        let b = GraphEmbedder::init(&config(), &device, RngKey::new(5));
        let av: Vec<f32> = a.base.inner().into_data().to_vec().unwrap();
        let bv: Vec<f32> = b.base.inner().into_data().to_vec().unwrap();
        assert_eq!(av, bv);
        let c = GraphEmbedder::init(&config(), &device, RngKey::new(6));
        let cv: Vec<f32> = c.base.inner().into_data().to_vec().unwrap();
        assert_ne!(av, cv);
    }

    #[test]
    fn test_init_scale() {
        let device = init_device();
        let model = GraphEmbedder::init(&config(), &device, RngKey::new(7));
        let scale = 1.0 / (4.0f32).sqrt();
        let values: Vec<f32> = model.base.inner().into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| v.abs() <= scale));
    }

    #[test]
    fn test_valid_copy_matches_train_params() {
        let device = init_device();
        let model = GraphEmbedder::init(&config(), &device, RngKey::new(8));
        let frozen = model.valid();
        let a: Vec<f32> = model.base.inner().into_data().to_vec().unwrap();
        let b: Vec<f32> = frozen.base.into_data().to_vec().unwrap();
        assert_eq!(a, b);
        assert_eq!(frozen.layers.len(), 2);
    }

    #[test]
    fn test_warm_start_overwrites_leading_rows_only() {
        let device = init_device();
        let mut model = GraphEmbedder::init(&config(), &device, RngKey::new(9));
        let before: Vec<f32> = model.base.clone().inner().into_data().to_vec().unwrap();
        let rows = vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]];
        model.warm_start_base(&rows, &device).unwrap();
        let after: Vec<f32> = model.base.clone().inner().into_data().to_vec().unwrap();
        assert_eq!(&after[0..4], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(&after[4..8], &[5.0, 6.0, 7.0, 8.0]);
        assert_eq!(&after[8..], &before[8..], "remaining rows untouched");
    }

    #[test]
    fn test_warm_start_rejects_bad_shapes() {
        let device = init_device();
        let mut model = GraphEmbedder::init(&config(), &device, RngKey::new(10));
        assert!(model.warm_start_base(&[vec![1.0; 3]], &device).is_err());
        let too_many = vec![vec![0.0; 4]; 6];
        assert!(model.warm_start_base(&too_many, &device).is_err());
    }

    #[test]
    fn test_named_params_cover_every_tensor() {
        let device = init_device();
        let model = GraphEmbedder::init(&config(), &device, RngKey::new(11));
        let names: Vec<String> = model.named_params().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names.len(), 1 + 2 * 3);
        assert!(names.contains(&"base".to_string()));
        assert!(names.contains(&"layers.1.w_neigh".to_string()));
    }
}
