use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};

/// CPU tensor backend used for inference-only work (catalog embedding
/// precompute, baselines).
pub type CpuBackend = NdArray<f32>;

/// Autodiff wrapper over the CPU backend, used for training.
pub type TrainBackend = Autodiff<CpuBackend>;

/// Device handle threaded explicitly through every component constructor.
pub fn init_device() -> NdArrayDevice {
    NdArrayDevice::default()
}
