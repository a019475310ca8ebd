//! # sagerec-train
//!
//! Training and evaluation for the sagerec two-tower recommender:
//!
//! - [`TrainConfig`] / [`Trainer`]: the epoch/iteration loop, gradient
//!   checks, per-epoch evaluation, and unconditional checkpointing
//! - [`weighted_hinge_loss`]: importance-weighted margin ranking loss
//! - [`evaluate_model`] plus [`popularity_baseline`] and [`knn_baseline`]
//! - [`PretrainStrategy`]: optional external matrix-factorization warm start

pub mod config;
pub mod evaluator;
pub mod loss;
pub mod pretrain;
pub mod trainer;

pub use config::*;
pub use evaluator::*;
pub use loss::*;
pub use pretrain::*;
pub use trainer::*;
