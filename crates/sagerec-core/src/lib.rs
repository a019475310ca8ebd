//! # sagerec-core
//!
//! Core types for the sagerec graph-embedding recommender.
//!
//! This crate provides the data layer shared by the sampler, model, and
//! training crates:
//!
//! - [`Event`] / [`InteractionStore`]: raw interaction events, leave-latest-out
//!   train/valid/test splits, held-out negative pools, and a bincode cache
//! - [`BipartiteGraph`] / [`Csr`]: training-split user-item adjacency in CSR
//!   form, with co-occurrence counting
//! - [`evaluate_ranking`] / [`MetricAccumulator`]: HITS@K and NDCG@K for
//!   single-relevant-item candidate lists
//! - [`cosine_similarity_matrix`]: row-wise cosine similarity on CPU tensors
//!
//! ## Backend
//!
//! All tensor work runs on the CPU ndarray backend; training wraps it in
//! autodiff:
//!
//! ```rust,ignore
//! use sagerec_core::backend::{init_device, CpuBackend, TrainBackend};
//!
//! let device = init_device();
//! ```

pub mod backend;
pub mod dataset;
pub mod graph;
pub mod metrics;
pub mod similarity;

pub use backend::*;
pub use dataset::*;
pub use graph::*;
pub use metrics::*;
pub use similarity::*;
