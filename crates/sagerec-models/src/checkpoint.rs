//! SafeTensors checkpoints for the two-tower model.
//!
//! Both towers are written into one file, parameter names prefixed with
//! `p.` and `q.`. Tensors are stored as F32 in row-major order.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use burn::tensor::Tensor;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use sagerec_core::backend::CpuBackend;

use crate::embedder::GraphEmbedder;

/// Write both towers to `path`, overwriting any existing file.
pub fn save_checkpoint(
    path: &Path,
    p: &GraphEmbedder<CpuBackend>,
    q: &GraphEmbedder<CpuBackend>,
) -> Result<()> {
    let mut buffers: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();
    for (prefix, tower) in [("p", p), ("q", q)] {
        for (name, tensor) in tower.named_params() {
            let shape = tensor.dims().to_vec();
            let values: Vec<f32> = tensor.into_data().to_vec().expect("param to vec");
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            buffers.push((format!("{prefix}.{name}"), shape, bytes));
        }
    }

    let views: Vec<(&str, TensorView)> = buffers
        .iter()
        .map(|(name, shape, bytes)| {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
                .context("building tensor view")?;
            Ok((name.as_str(), view))
        })
        .collect::<Result<_>>()?;

    let blob = safetensors::serialize(views, &None).context("serializing checkpoint")?;
    std::fs::write(path, blob)
        .with_context(|| format!("failed to write checkpoint {}", path.display()))?;
    Ok(())
}

/// Read every tensor of a checkpoint into named CPU tensors.
pub fn load_checkpoint(
    path: &Path,
    device: &burn::backend::ndarray::NdArrayDevice,
) -> Result<HashMap<String, Tensor<CpuBackend, 2>>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read checkpoint {}", path.display()))?;
    let tensors = SafeTensors::deserialize(&bytes)
        .with_context(|| format!("invalid checkpoint {}", path.display()))?;

    let mut out = HashMap::new();
    for (name, view) in tensors.tensors() {
        anyhow::ensure!(
            view.dtype() == Dtype::F32,
            "checkpoint tensor {} has dtype {:?}, expected F32",
            name,
            view.dtype()
        );
        let shape = view.shape();
        anyhow::ensure!(
            shape.len() == 2,
            "checkpoint tensor {} has rank {}, expected 2",
            name,
            shape.len()
        );
        // decode byte-wise; the view may sit at any alignment inside the blob
        let floats: Vec<f32> = view
            .data()
            .chunks(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or([0; 4]);
                f32::from_le_bytes(arr)
            })
            .collect();
        let flat: Tensor<CpuBackend, 1> = Tensor::from_data(floats.as_slice(), device);
        out.insert(name, flat.reshape([shape[0] as i32, shape[1] as i32]));
    }
    Ok(out)
}
