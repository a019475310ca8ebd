//! # sagerec-samplers
//!
//! Stochastic data plumbing for sagerec training:
//!
//! - [`RngKey`]: splittable ChaCha8 keys, so every sample is reproducible
//! - [`RandomWalkSampler`] / [`NodeFlow`]: layered item neighborhoods from
//!   item-user-item random walks
//! - [`CooccurrenceBatcher`] / [`PairBatch`]: query/positive/negative
//!   training batches weighted by shared-user counts
//! - [`ItemFrequency`]: popularity-band admission for negative candidates
//! - [`CyclicStream`] / [`PrefetchStream`]: endless iteration and threaded
//!   prefetch over any [`BatchSource`]

pub mod batch;
pub mod flow;
pub mod frequency;
pub mod rng;
pub mod stream;

pub use batch::*;
pub use flow::*;
pub use frequency::*;
pub use rng::*;
pub use stream::*;
