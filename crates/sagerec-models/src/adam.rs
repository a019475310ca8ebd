//! Adam with L2-coupled weight decay.
//!
//! Moment tensors live on the non-autodiff backend and are keyed by
//! parameter name, so one optimizer instance can drive both towers. The
//! decay term is folded into the gradient before the moment updates
//! (classic L2 regularization, not decoupled decay).

use std::collections::HashMap;

use burn::tensor::Tensor;
use sagerec_core::backend::CpuBackend;

#[derive(Clone, Copy, Debug)]
pub struct AdamConfig {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    pub weight_decay: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            lr: 3e-4,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }
}

impl AdamConfig {
    pub const fn with_lr(mut self, lr: f32) -> Self {
        self.lr = lr;
        self
    }

    pub const fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }
}

pub struct Adam {
    config: AdamConfig,
    /// First/second moment per parameter name.
    moments: HashMap<String, (Tensor<CpuBackend, 2>, Tensor<CpuBackend, 2>)>,
    /// Global step, shared by every parameter; bumped once per batch.
    t: i32,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            moments: HashMap::new(),
            t: 0,
        }
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    /// Advance the shared step counter. Call once per batch, before the
    /// per-parameter updates.
    pub fn begin_step(&mut self) {
        self.t += 1;
    }

    /// Updated value for one parameter given its gradient.
    pub fn update(
        &mut self,
        name: &str,
        param: Tensor<CpuBackend, 2>,
        grad: Tensor<CpuBackend, 2>,
    ) -> Tensor<CpuBackend, 2> {
        let c = self.config;
        let grad = if c.weight_decay > 0.0 {
            grad + param.clone() * c.weight_decay
        } else {
            grad
        };

        let (m, v) = match self.moments.remove(name) {
            Some((m, v)) => (
                m * c.beta1 + grad.clone() * (1.0 - c.beta1),
                v * c.beta2 + grad.clone().powf_scalar(2.0) * (1.0 - c.beta2),
            ),
            None => (
                grad.clone() * (1.0 - c.beta1),
                grad.clone().powf_scalar(2.0) * (1.0 - c.beta2),
            ),
        };

        let m_hat = m.clone() / (1.0 - c.beta1.powi(self.t));
        let v_hat = v.clone() / (1.0 - c.beta2.powi(self.t));
        self.moments.insert(name.to_string(), (m, v));

        param - m_hat * c.lr / (v_hat.sqrt() + c.eps)
    }
}
