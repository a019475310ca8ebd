//! Cosine similarity over embedding matrices.

use burn::tensor::Tensor;

use crate::backend::CpuBackend;

/// Cosine similarity matrix between the rows of `embeddings`.
///
/// Given embeddings [N, D], computes [N, N] where:
/// ```text
/// sim[i,j] = dot(emb[i], emb[j]) / (||emb[i]|| * ||emb[j]||)
/// ```
///
/// The diagonal is left at 1; callers ranking candidate items against a
/// reference item rely on self-similarity staying maximal.
pub fn cosine_similarity_matrix(embeddings: &Tensor<CpuBackend, 2>) -> Tensor<CpuBackend, 2> {
    // sum_dim(1) on [N, D] returns [N, 1], which broadcasts against [N, D]
    let norms = embeddings
        .clone()
        .powf_scalar(2.0)
        .sum_dim(1)
        .sqrt()
        .clamp(1e-8, f32::MAX);

    let normalized = embeddings.clone() / norms;
    normalized.clone().matmul(normalized.transpose())
}
