//! # sagerec-models
//!
//! Model layer for sagerec:
//!
//! - [`GraphEmbedder`] / [`SageLayer`]: SAGE-style tower over a base item
//!   embedding table, driven by sampled [`NodeFlow`]s
//! - [`Adam`] / [`AdamConfig`]: name-keyed Adam with L2-coupled weight decay
//! - [`save_checkpoint`] / [`load_checkpoint`]: two-tower safetensors files
//!
//! [`NodeFlow`]: sagerec_samplers::NodeFlow

pub mod adam;
pub mod checkpoint;
pub mod embedder;

pub use adam::*;
pub use checkpoint::*;
pub use embedder::*;
